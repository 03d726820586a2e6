//! Serialised outbound publishing.
//!
//! Every send goes through one mutex so that concurrent publishers, including
//! handlers running on the transport's delivery thread, never interleave
//! inside the transport client.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::envelope::{EnvelopeError, EnvelopeStamp, Request, Response};
use crate::process_hash::process_hash;
use crate::transport::{Transport, TransportError};

const PUBLISH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::publish");

/// Failures raised while publishing.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The envelope could not be built.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    /// The transport refused the message.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Health data must be a JSON object so it can carry a timestamp.
    #[error("health data for '{topic}' is not a JSON object")]
    HealthNotObject { topic: String },
}

/// Mutex-guarded wrapper around [`Transport::send`].
pub struct Publisher {
    transport: Arc<dyn Transport>,
    guard: Mutex<()>,
}

impl Publisher {
    /// Wraps `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            guard: Mutex::new(()),
        }
    }

    /// Publishes raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Transport`] when the transport rejects the send.
    pub fn publish(&self, topic: &str, retain: bool, payload: &[u8]) -> Result<(), PublishError> {
        let _serialised = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        match self.transport.send(topic, payload, retain) {
            Ok(()) => {
                debug!(target: PUBLISH_TARGET, topic, retain, bytes = payload.len(), "published");
                Ok(())
            }
            Err(error) => {
                warn!(target: PUBLISH_TARGET, topic, error = %error, "publish failed");
                Err(error.into())
            }
        }
    }

    /// Serialises `value` and publishes it.
    pub fn publish_value(&self, topic: &str, retain: bool, value: &Value) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(value).map_err(EnvelopeError::from)?;
        self.publish(topic, retain, &payload)
    }

    /// Publishes retained health data stamped with the current Unix time.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::HealthNotObject`] when `data` is not an object.
    pub fn publish_health(&self, topic: &str, data: &Value) -> Result<(), PublishError> {
        let Value::Object(fields) = data else {
            return Err(PublishError::HealthNotObject {
                topic: topic.to_owned(),
            });
        };
        let mut stamped = fields.clone();
        stamped.insert(
            "timestamp".to_owned(),
            Value::from(time::OffsetDateTime::now_utc().unix_timestamp()),
        );
        self.publish_value(topic, true, &Value::Object(stamped))
    }

    /// Publishes a JSON-RPC message.
    ///
    /// With a `method`, `data` becomes the params of a request; notifications
    /// (no `id`) are retained so late subscribers see the latest value, while
    /// requests are not. Without a `method`, `data` must be a response payload
    /// holding `result` or `error`, and is sent unretained.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Envelope`] when a response payload cannot be
    /// encoded; nothing reaches the transport in that case.
    pub fn publish_rpc(
        &self,
        topic: &str,
        method: Option<&str>,
        data: Value,
        id: Option<Value>,
    ) -> Result<(), PublishError> {
        match method {
            Some(method) => {
                let mut request = Request::new(method, data);
                request.id = id;
                let retain = request.is_notification();
                let envelope = request.encode(&EnvelopeStamp::now(process_hash()));
                self.publish_value(topic, retain, &envelope)
            }
            None => {
                let envelope = Response::encode(&data, id.as_ref())?;
                self.publish_value(topic, false, &envelope)
            }
        }
    }
}
