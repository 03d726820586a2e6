//! JSON-RPC envelope encoding and decoding.
//!
//! Envelopes are handled as [`serde_json::Value`] trees so that params,
//! results, and ids pass through untouched. Every outbound request carries a
//! stamp (`timestamp`, `protocol_version`, `process_hash`) inside its params;
//! decoding strips the stamp again so handlers only see caller data.
//!
//! Inbound payloads fall into three shapes:
//!
//! ```json
//! {"jsonrpc":"2.0","method":"get_status","params":{},"id":1}
//! {"jsonrpc":"2.0","result":0,"id":1}
//! {"offset_ns":-12}
//! ```
//!
//! The last is a bare payload with no envelope at all.

mod error;
mod request;
mod response;

use serde_json::{Map, Value};

pub use self::error::{EnvelopeError, ErrorCode, ErrorObject, default_message};
pub use self::request::{EnvelopeStamp, Request};
pub use self::response::{Response, ResponseOutcome};

/// Value of the `jsonrpc` member on every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Version of the stamp and announcement format.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Shape of an inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Carries `jsonrpc` and `method`.
    Request,
    /// Carries `jsonrpc` and `result` or `error`.
    Response,
    /// Anything else.
    Raw,
}

/// Classifies a parsed payload without validating it.
#[must_use]
pub fn classify(value: &Value) -> MessageKind {
    let Some(object) = value.as_object() else {
        return MessageKind::Raw;
    };
    if !object.contains_key("jsonrpc") {
        return MessageKind::Raw;
    }
    if object.contains_key("method") {
        MessageKind::Request
    } else if object.contains_key("result") || object.contains_key("error") {
        MessageKind::Response
    } else {
        MessageKind::Raw
    }
}

/// Parses a payload as JSON.
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidObject`] when the bytes are not JSON.
pub fn parse_payload(payload: &[u8]) -> Result<Value, EnvelopeError> {
    serde_json::from_slice(payload).map_err(|error| EnvelopeError::invalid_object(error.to_string()))
}

fn require_envelope<'v>(
    value: &'v Value,
    member: Option<&str>,
) -> Result<&'v Map<String, Value>, EnvelopeError> {
    let object = value
        .as_object()
        .ok_or_else(|| EnvelopeError::invalid_object("envelope is not a JSON object"))?;
    let version = object
        .get("jsonrpc")
        .ok_or_else(|| EnvelopeError::invalid_message("missing jsonrpc member"))?;
    match version.as_str() {
        Some(JSONRPC_VERSION) => {}
        Some(other) => return Err(EnvelopeError::unsupported_encoding(other)),
        None => return Err(EnvelopeError::unsupported_encoding(version.to_string())),
    }
    if let Some(name) = member
        && !object.contains_key(name)
    {
        return Err(EnvelopeError::invalid_message(format!("missing {name} member")));
    }
    Ok(object)
}
