//! Request and notification envelopes.

use serde_json::{Map, Value};

use super::error::EnvelopeError;
use super::{JSONRPC_VERSION, PROTOCOL_VERSION, require_envelope};

const TIMESTAMP: &str = "timestamp";
const PROTOCOL: &str = "protocol_version";
const PROCESS_HASH: &str = "process_hash";

/// Fields stamped into the params of every outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeStamp {
    /// Unix time in seconds.
    pub timestamp: i64,
    /// Process-scoped identity token.
    pub process_hash: String,
}

impl EnvelopeStamp {
    /// Stamp for the current wall-clock second.
    pub fn now(process_hash: impl Into<String>) -> Self {
        Self {
            timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
            process_hash: process_hash.into(),
        }
    }
}

/// A request, or a notification when `id` is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Method name.
    pub method: String,
    /// Parameters with the stamped fields removed.
    pub params: Value,
    /// Correlation id; `None` for notifications.
    pub id: Option<Value>,
}

impl Request {
    /// Creates a notification.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            id: None,
        }
    }

    /// Attaches a correlation id, turning the notification into a request.
    #[must_use]
    pub fn with_id(mut self, id: Value) -> Self {
        self.id = Some(id);
        self
    }

    /// True when no response is expected.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Encodes the envelope, stamping object params.
    ///
    /// Stamped fields overwrite caller values of the same name. `null` params
    /// become an object holding only the stamp; array and scalar params are
    /// carried unchanged.
    #[must_use]
    pub fn encode(&self, stamp: &EnvelopeStamp) -> Value {
        let params = match &self.params {
            Value::Object(object) => Value::Object(stamped(object.clone(), stamp)),
            Value::Null => Value::Object(stamped(Map::new(), stamp)),
            other => other.clone(),
        };

        let mut envelope = Map::new();
        envelope.insert("jsonrpc".to_owned(), Value::from(JSONRPC_VERSION));
        envelope.insert("method".to_owned(), Value::from(self.method.clone()));
        envelope.insert("params".to_owned(), params);
        if let Some(id) = &self.id {
            envelope.insert("id".to_owned(), id.clone());
        }
        Value::Object(envelope)
    }

    /// Decodes a request envelope, stripping the stamped fields from params.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidObject`] for non-object input,
    /// [`EnvelopeError::UnsupportedEncoding`] for a foreign `jsonrpc` version,
    /// and [`EnvelopeError::InvalidMessage`] when `method` or `params` is
    /// missing.
    pub fn decode(value: &Value) -> Result<Self, EnvelopeError> {
        let object = require_envelope(value, Some("method"))?;
        let method = object
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| EnvelopeError::invalid_message("method is not a string"))?;
        let mut params = object
            .get("params")
            .cloned()
            .ok_or_else(|| EnvelopeError::invalid_message("missing params member"))?;
        if let Value::Object(fields) = &mut params {
            fields.remove(TIMESTAMP);
            fields.remove(PROTOCOL);
            fields.remove(PROCESS_HASH);
        }

        Ok(Self {
            method: method.to_owned(),
            params,
            id: object.get("id").filter(|id| !id.is_null()).cloned(),
        })
    }
}

fn stamped(mut params: Map<String, Value>, stamp: &EnvelopeStamp) -> Map<String, Value> {
    params.insert(TIMESTAMP.to_owned(), Value::from(stamp.timestamp));
    params.insert(PROTOCOL.to_owned(), Value::from(PROTOCOL_VERSION));
    params.insert(PROCESS_HASH.to_owned(), Value::from(stamp.process_hash.clone()));
    params
}
