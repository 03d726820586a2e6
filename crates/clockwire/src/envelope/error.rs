//! Protocol error codes, the wire error object, and codec failures.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error codes carried by error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Payload was not a JSON object.
    InvalidObject,
    /// `jsonrpc` member named a version other than `2.0`.
    UnsupportedEncoding,
    /// Payload could not be encoded.
    InvalidEncoding,
    /// Envelope members were missing or of the wrong shape.
    InvalidMessage,
    /// Handler does not know the requested method.
    UnknownCommand,
    /// Handler rejected a parameter value.
    InvalidValue,
    /// Handler failed for an application reason.
    ApplicationError,
    /// Handler failed because of the host system.
    SystemError,
    /// Message could not be delivered.
    TransportError,
}

impl ErrorCode {
    /// Every defined code, in numeric order from the JSON range downwards.
    pub const ALL: [Self; 9] = [
        Self::InvalidObject,
        Self::UnsupportedEncoding,
        Self::InvalidEncoding,
        Self::InvalidMessage,
        Self::UnknownCommand,
        Self::InvalidValue,
        Self::ApplicationError,
        Self::SystemError,
        Self::TransportError,
    ];

    /// Numeric wire value.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidObject => -32700,
            Self::UnsupportedEncoding => -32701,
            Self::InvalidEncoding => -32702,
            Self::InvalidMessage => -32600,
            Self::UnknownCommand => -32601,
            Self::InvalidValue => -32602,
            Self::ApplicationError => -32500,
            Self::SystemError => -32400,
            Self::TransportError => -32300,
        }
    }

    /// Looks up the code for a numeric wire value.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.code() == code)
    }

    /// Message used when an error object is built without one.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::InvalidObject => "Invalid JSON object",
            Self::UnsupportedEncoding => "Unsupported JSONRPC encoding",
            Self::InvalidEncoding => "Invalid JSONRPC encoding",
            Self::InvalidMessage => "Invalid JSONRPC message",
            Self::UnknownCommand => "Unknown command",
            Self::InvalidValue => "Invalid value",
            Self::ApplicationError => "General application error",
            Self::SystemError => "General system error",
            Self::TransportError => "General transport error",
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(value: ErrorCode) -> Self {
        value.code()
    }
}

/// Default message for an arbitrary numeric code.
#[must_use]
pub fn default_message(code: i32) -> &'static str {
    ErrorCode::from_code(code).map_or("Unknown error", ErrorCode::default_message)
}

/// Structured error carried under the `error` member of a response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ErrorObject {
    /// Numeric code, usually one of [`ErrorCode`].
    pub code: i32,
    /// Human-readable description.
    pub message: String,
    /// Optional detail supplied by the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Builds an error object, falling back to the code's default message.
    pub fn new(code: i32, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.unwrap_or_else(|| default_message(code).to_owned()),
            data,
        }
    }

    /// Builds an error object with the default message and no data.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        Self::new(code, None, None)
    }

    /// Attaches detail data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Encodes as `{code, message, data?}`.
    #[must_use]
    pub fn encode(&self) -> Value {
        let mut object = Map::new();
        object.insert("code".to_owned(), Value::from(self.code));
        object.insert("message".to_owned(), Value::from(self.message.clone()));
        if let Some(data) = &self.data {
            object.insert("data".to_owned(), data.clone());
        }
        Value::Object(object)
    }

    /// Decodes an error object received from a peer.
    pub fn decode(value: &Value) -> Result<Self, EnvelopeError> {
        if !value.is_object() {
            return Err(EnvelopeError::invalid_object("error member is not an object"));
        }
        Self::deserialize(value)
            .map_err(|error| EnvelopeError::invalid_message(format!("malformed error object: {error}")))
    }
}

/// Failures raised while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Payload was not valid JSON or not a JSON object.
    #[error("invalid JSON object: {message}")]
    InvalidObject { message: String },

    /// `jsonrpc` named an unsupported protocol version.
    #[error("unsupported JSONRPC version '{version}'")]
    UnsupportedEncoding { version: String },

    /// Envelope shape was wrong.
    #[error("invalid JSONRPC message: {message}")]
    InvalidMessage { message: String },

    /// Envelope could not be serialised.
    #[error("failed to serialise envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl EnvelopeError {
    /// Creates an invalid object error.
    pub fn invalid_object(message: impl Into<String>) -> Self {
        Self::InvalidObject {
            message: message.into(),
        }
    }

    /// Creates an unsupported encoding error.
    pub fn unsupported_encoding(version: impl Into<String>) -> Self {
        Self::UnsupportedEncoding {
            version: version.into(),
        }
    }

    /// Creates an invalid message error.
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    /// Protocol code reported to peers for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidObject { .. } => ErrorCode::InvalidObject,
            Self::UnsupportedEncoding { .. } => ErrorCode::UnsupportedEncoding,
            Self::InvalidMessage { .. } => ErrorCode::InvalidMessage,
            Self::Serialize(_) => ErrorCode::InvalidEncoding,
        }
    }

    /// Error object describing this failure, with the detail as `data`.
    #[must_use]
    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject::from_code(self.code().code()).with_data(Value::from(self.to_string()))
    }
}
