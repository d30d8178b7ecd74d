//! Inbound method calls and typed argument access.

use std::fmt;
use thiserror::Error;

use crate::value::{FromValue, Value, ValueTypeError};

/// An argument could not be read from a call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("missing required argument `{key}`")]
    Missing { key: String },

    #[error("argument `{key}`: {source}")]
    TypeMismatch {
        key: String,
        #[source]
        source: ValueTypeError,
    },

    #[error("arguments are a {found}, not a map")]
    NotAMap { found: &'static str },

    #[error("arguments: {0}")]
    Invalid(#[from] ValueTypeError),
}

/// A single named, argument-bearing request from the application layer.
///
/// Immutable once constructed; consumed by exactly one handler.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    method: String,
    arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: impl Into<Value>) -> Self {
        Self {
            method: method.into(),
            arguments: arguments.into(),
        }
    }

    /// Call without arguments.
    pub fn bare(method: impl Into<String>) -> Self {
        Self::new(method, Value::Null)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn arguments(&self) -> &Value {
        &self.arguments
    }

    pub fn into_arguments(self) -> Value {
        self.arguments
    }

    /// Read an optional keyed argument.
    ///
    /// Absent keys, null values and null arguments all read as `None`.
    /// Non-map arguments are an error.
    pub fn argument<T: FromValue>(&self, key: &str) -> Result<Option<T>, ArgumentError> {
        let map = match &self.arguments {
            Value::Null => return Ok(None),
            Value::Map(map) => map,
            other => {
                return Err(ArgumentError::NotAMap {
                    found: other.type_name(),
                })
            }
        };

        match map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value)
                .map(Some)
                .map_err(|source| ArgumentError::TypeMismatch {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    /// Read a required keyed argument.
    pub fn required<T: FromValue>(&self, key: &str) -> Result<T, ArgumentError> {
        self.argument(key)?.ok_or_else(|| ArgumentError::Missing {
            key: key.to_string(),
        })
    }

    /// Whether a non-null value is present for `key`.
    pub fn has_argument(&self, key: &str) -> bool {
        self.arguments.get(key).is_some_and(|v| !v.is_null())
    }

    /// Convert the whole argument value (positional-style calls).
    pub fn arguments_as<T: FromValue>(&self) -> Result<T, ArgumentError> {
        Ok(T::from_value(&self.arguments)?)
    }
}

impl fmt::Display for MethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.method, self.arguments.type_name())
    }
}
