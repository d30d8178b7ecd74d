//! # Method Codec
//!
//! Wire encoding of calls, responses and stream envelopes.
//!
//! The transport owns the bytes; the dispatcher only needs a codec to turn
//! them into [`MethodCall`]s and back. [`JsonMethodCodec`] implements the
//! JSON layout used by the application layer's JSON method codec:
//!
//! | Message | Encoding |
//! |---------|----------|
//! | call | `{"method": m, "args": a}` |
//! | success | `[result]` |
//! | error | `[code, message, details]` |
//! | not implemented | empty payload |
//! | end of stream | empty payload |
//!
//! Byte sequences have no JSON form and encode as arrays of integers.

use bytes::Bytes;
use serde_json::{json, Value as Json};
use thiserror::Error;

use crate::call::MethodCall;
use crate::envelope::{PluginError, Response, StreamEnvelope};
use crate::value::Value;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Invalid method call: {0}")]
    InvalidCall(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Encodes and decodes bridge messages.
pub trait MethodCodec: Send + Sync {
    fn encode_method_call(&self, call: &MethodCall) -> Result<Bytes>;

    fn decode_method_call(&self, payload: &[u8]) -> Result<MethodCall>;

    fn encode_success_envelope(&self, result: &Value) -> Result<Bytes>;

    fn encode_error_envelope(&self, error: &PluginError) -> Result<Bytes>;

    /// Decode a reply; an empty payload is `NotImplemented`.
    fn decode_envelope(&self, payload: &[u8]) -> Result<Response>;

    fn encode_response(&self, response: &Response) -> Result<Bytes> {
        match response {
            Response::Success(value) => self.encode_success_envelope(value),
            Response::Error(error) => self.encode_error_envelope(error),
            Response::NotImplemented => Ok(Bytes::new()),
        }
    }

    fn encode_stream_envelope(&self, envelope: &StreamEnvelope) -> Result<Bytes> {
        match envelope {
            StreamEnvelope::Event(value) => self.encode_success_envelope(value),
            StreamEnvelope::Error(error) => self.encode_error_envelope(error),
            StreamEnvelope::EndOfStream => Ok(Bytes::new()),
        }
    }

    /// Decode a stream write; an empty payload is `EndOfStream`.
    fn decode_stream_envelope(&self, payload: &[u8]) -> Result<StreamEnvelope> {
        match self.decode_envelope(payload)? {
            Response::Success(value) => Ok(StreamEnvelope::Event(value)),
            Response::Error(error) => Ok(StreamEnvelope::Error(error)),
            Response::NotImplemented => Ok(StreamEnvelope::EndOfStream),
        }
    }
}

/// JSON method codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMethodCodec;

impl JsonMethodCodec {
    fn to_bytes(json: &Json) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(json)?))
    }
}

impl MethodCodec for JsonMethodCodec {
    fn encode_method_call(&self, call: &MethodCall) -> Result<Bytes> {
        let args: Json = call.arguments().clone().into();
        Self::to_bytes(&json!({ "method": call.method(), "args": args }))
    }

    fn decode_method_call(&self, payload: &[u8]) -> Result<MethodCall> {
        let json: Json = serde_json::from_slice(payload)?;
        let Json::Object(mut object) = json else {
            return Err(CodecError::InvalidCall("expected an object".to_string()));
        };

        let method = match object.remove("method") {
            Some(Json::String(method)) => method,
            Some(_) => return Err(CodecError::InvalidCall("`method` is not a string".to_string())),
            None => return Err(CodecError::InvalidCall("missing `method`".to_string())),
        };
        let args = object.remove("args").map(Value::from).unwrap_or_default();

        Ok(MethodCall::new(method, args))
    }

    fn encode_success_envelope(&self, result: &Value) -> Result<Bytes> {
        let result: Json = result.clone().into();
        Self::to_bytes(&Json::Array(vec![result]))
    }

    fn encode_error_envelope(&self, error: &PluginError) -> Result<Bytes> {
        let details: Json = error.details.clone().unwrap_or_default().into();
        Self::to_bytes(&json!([error.code, error.message, details]))
    }

    fn decode_envelope(&self, payload: &[u8]) -> Result<Response> {
        if payload.is_empty() {
            return Ok(Response::NotImplemented);
        }

        let json: Json = serde_json::from_slice(payload)?;
        let Json::Array(mut items) = json else {
            return Err(CodecError::InvalidEnvelope("expected an array".to_string()));
        };

        match items.len() {
            1 => Ok(Response::Success(Value::from(items.remove(0)))),
            3 => {
                let details = Value::from(items.pop().unwrap_or_default());
                let message = match items.pop() {
                    Some(Json::String(message)) => Some(message),
                    Some(Json::Null) | None => None,
                    Some(_) => {
                        return Err(CodecError::InvalidEnvelope(
                            "error message is not a string".to_string(),
                        ))
                    }
                };
                let code = match items.pop() {
                    Some(Json::String(code)) => code,
                    _ => {
                        return Err(CodecError::InvalidEnvelope(
                            "error code is not a string".to_string(),
                        ))
                    }
                };
                Ok(Response::Error(PluginError {
                    code,
                    message,
                    details: None,
                }
                .with_details(details)))
            }
            n => Err(CodecError::InvalidEnvelope(format!(
                "expected 1 or 3 elements, found {n}"
            ))),
        }
    }
}
