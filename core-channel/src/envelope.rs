//! Response and stream envelopes
//!
//! Every call ends in exactly one [`Response`]; every stream write is one
//! [`StreamEnvelope`]. [`PluginError`] is the wire-level error value shared by
//! both.

use std::fmt;

use bridge_traits::BridgeError;

use crate::call::ArgumentError;
use crate::value::Value;

/// Stable error codes emitted by the bridge itself.
///
/// Plugins add their own codes; these are the ones the dispatcher and the
/// shared plugins rely on.
pub mod codes {
    /// Arguments missing or of the wrong type
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    /// A handler panicked before completing its result
    pub const HANDLER_PANIC: &str = "HANDLER_PANIC";
    /// A result was dropped without being completed
    pub const RESULT_DROPPED: &str = "RESULT_DROPPED";
    /// `listen` on a channel that rejects a second subscriber
    pub const ALREADY_LISTENING: &str = "ALREADY_LISTENING";
    /// `cancel` with no active subscription
    pub const NO_ACTIVE_STREAM: &str = "NO_ACTIVE_STREAM";
    /// Operation needs a foreground activity
    pub const NO_ACTIVITY: &str = "NO_ACTIVITY";
    /// Callback id not registered with the dispatcher
    pub const UNKNOWN_CALLBACK: &str = "UNKNOWN_CALLBACK";
}

/// Structured error carried back across the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginError {
    pub code: String,
    pub message: Option<String>,
    pub details: Option<Value>,
}

impl PluginError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: Some(message.into()),
            details: None,
        }
    }

    /// Error with a code only.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: None,
            details: None,
        }
    }

    /// Attach a structured payload. `Value::Null` clears it.
    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        let details = details.into();
        self.details = (!details.is_null()).then_some(details);
        self
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => f.write_str(&self.code),
        }
    }
}

impl std::error::Error for PluginError {}

impl From<ArgumentError> for PluginError {
    fn from(err: ArgumentError) -> Self {
        PluginError::new(codes::INVALID_ARGUMENT, err.to_string())
    }
}

impl From<BridgeError> for PluginError {
    fn from(err: BridgeError) -> Self {
        PluginError::new(err.kind(), err.to_string())
    }
}

/// Outcome of one method call.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(Value),
    Error(PluginError),
    NotImplemented,
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Response::NotImplemented)
    }

    /// Error code, if this is an error response.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Response::Error(err) => Some(&err.code),
            _ => None,
        }
    }
}

impl From<Result<Value, PluginError>> for Response {
    fn from(result: Result<Value, PluginError>) -> Self {
        match result {
            Ok(value) => Response::Success(value),
            Err(err) => Response::Error(err),
        }
    }
}

/// One write on an event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEnvelope {
    Event(Value),
    Error(PluginError),
    EndOfStream,
}

impl StreamEnvelope {
    /// Whether this envelope ends the subscription.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEnvelope::Event(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_details_are_none() {
        let err = PluginError::new("E", "m").with_details(Value::Null);
        assert_eq!(err.details, None);

        let err = PluginError::new("E", "m").with_details("extra");
        assert_eq!(err.details, Some(Value::from("extra")));
    }

    #[test]
    fn test_argument_error_maps_to_invalid_argument() {
        let err: PluginError = ArgumentError::Missing { key: "url".into() }.into();
        assert_eq!(err.code, codes::INVALID_ARGUMENT);
        assert_eq!(err.message.as_deref(), Some("missing required argument `url`"));
    }

    #[test]
    fn test_bridge_error_maps_to_kind() {
        let err: PluginError = BridgeError::Storage("disk full".into()).into();
        assert_eq!(err.code, "StorageError");
        assert_eq!(err.to_string(), "StorageError: Storage error: disk full");
    }

    #[test]
    fn test_terminal_envelopes() {
        assert!(!StreamEnvelope::Event(Value::Null).is_terminal());
        assert!(StreamEnvelope::EndOfStream.is_terminal());
        assert!(StreamEnvelope::Error(PluginError::code("X")).is_terminal());
    }
}
