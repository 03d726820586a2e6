//! Response envelopes.

use serde_json::{Map, Value};

use super::error::{EnvelopeError, ErrorObject};
use super::{JSONRPC_VERSION, require_envelope};

/// Outcome carried by a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// Contents of the `result` member.
    Result(Value),
    /// Contents of the `error` member.
    Error(Value),
}

impl ResponseOutcome {
    /// Outcome reporting a structured error.
    #[must_use]
    pub fn error(error: &ErrorObject) -> Self {
        Self::Error(error.encode())
    }

    /// Payload object holding the single outcome member.
    #[must_use]
    pub fn into_payload(self) -> Value {
        let mut payload = Map::new();
        match self {
            Self::Result(value) => payload.insert("result".to_owned(), value),
            Self::Error(value) => payload.insert("error".to_owned(), value),
        };
        Value::Object(payload)
    }
}

/// A decoded response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Result or error.
    pub outcome: ResponseOutcome,
    /// Correlation id echoed by the responder.
    pub id: Option<Value>,
}

impl Response {
    /// Wraps `payload` into a response envelope.
    ///
    /// `payload` must be an object holding `result` or `error`; its members
    /// are copied into the envelope alongside `jsonrpc` and `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidMessage`] when the payload has neither
    /// outcome member or when `id` is absent or `null`. No partial envelope is
    /// produced.
    pub fn encode(payload: &Value, id: Option<&Value>) -> Result<Value, EnvelopeError> {
        let members = payload
            .as_object()
            .ok_or_else(|| EnvelopeError::invalid_object("response payload is not an object"))?;
        if !members.contains_key("result") && !members.contains_key("error") {
            return Err(EnvelopeError::invalid_message(
                "response payload needs a result or error member",
            ));
        }
        let id = id
            .filter(|id| !id.is_null())
            .ok_or_else(|| EnvelopeError::invalid_message("response needs an id"))?;

        let mut envelope = Map::new();
        envelope.insert("jsonrpc".to_owned(), Value::from(JSONRPC_VERSION));
        for (key, value) in members {
            envelope.insert(key.clone(), value.clone());
        }
        envelope.insert("id".to_owned(), id.clone());
        Ok(Value::Object(envelope))
    }

    /// Decodes a response envelope. `result` wins when both members appear.
    ///
    /// # Errors
    ///
    /// Returns the same envelope errors as request decoding, plus
    /// [`EnvelopeError::InvalidMessage`] when neither outcome is present.
    pub fn decode(value: &Value) -> Result<Self, EnvelopeError> {
        let object = require_envelope(value, None)?;
        let outcome = if let Some(result) = object.get("result") {
            ResponseOutcome::Result(result.clone())
        } else if let Some(error) = object.get("error") {
            ResponseOutcome::Error(error.clone())
        } else {
            return Err(EnvelopeError::invalid_message(
                "response has neither result nor error",
            ));
        };

        Ok(Self {
            outcome,
            id: object.get("id").filter(|id| !id.is_null()).cloned(),
        })
    }

    /// Structured error when the outcome is an error object.
    #[must_use]
    pub fn error_object(&self) -> Option<ErrorObject> {
        match &self.outcome {
            ResponseOutcome::Error(value) => ErrorObject::decode(value).ok(),
            ResponseOutcome::Result(_) => None,
        }
    }
}
