//! Inbound message dispatch.
//!
//! Each delivered message is routed to the first matching registration and
//! handled according to its shape:
//!
//! - an empty payload signals deletion and reaches `on_delete`;
//! - a request reaches `on_request`, and its return code is published to the
//!   registration's response topic when the request carried an id;
//! - a response reaches `on_response`, subject to the correlation policy;
//! - any other JSON value reaches `on_raw`.
//!
//! Payloads that are not JSON, or responses that fail to decode, are logged and
//! dropped. Requests that fail to decode are answered with an error response
//! when they carried an id and a response topic is bound.

use std::panic::{self, AssertUnwindSafe};

use clockwire_config::{CaptureMode, CorrelationMode};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::correlation::PendingRequests;
use crate::envelope::{
    ErrorCode, ErrorObject, MessageKind, Request, Response, ResponseOutcome, classify,
    parse_payload,
};
use crate::publisher::Publisher;
use crate::registry::{HandlerRegistry, MatchedBinding};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Routes inbound messages to registered handlers.
pub struct Dispatcher<'a> {
    registry: &'a HandlerRegistry,
    publisher: &'a Publisher,
    pending: &'a PendingRequests,
    capture: CaptureMode,
    correlation: CorrelationMode,
}

impl<'a> Dispatcher<'a> {
    /// Builds a dispatcher over the bridge's shared state.
    pub fn new(
        registry: &'a HandlerRegistry,
        publisher: &'a Publisher,
        pending: &'a PendingRequests,
        capture: CaptureMode,
        correlation: CorrelationMode,
    ) -> Self {
        Self {
            registry,
            publisher,
            pending,
            capture,
            correlation,
        }
    }

    /// Handles one delivered message.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) {
        let Some(binding) = self.registry.find_first_match(topic) else {
            debug!(target: DISPATCH_TARGET, topic, "no registration matches topic");
            return;
        };
        let capture = binding.capture.resolve(self.capture);

        if payload.is_empty() {
            let code = guarded(topic, || binding.handler.on_delete(capture));
            debug!(target: DISPATCH_TARGET, topic, code, "delete signal handled");
            return;
        }

        let value = match parse_payload(payload) {
            Ok(value) => value,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, topic, error = %error, "dropping non-JSON payload");
                return;
            }
        };

        match classify(&value) {
            MessageKind::Request => self.dispatch_request(topic, &binding, capture, &value),
            MessageKind::Response => self.dispatch_response(topic, &binding, capture, &value),
            MessageKind::Raw => {
                let code = guarded(topic, || binding.handler.on_raw(capture, &value));
                debug!(target: DISPATCH_TARGET, topic, code, "bare payload handled");
            }
        }
    }

    fn dispatch_request(
        &self,
        topic: &str,
        binding: &MatchedBinding<'_>,
        capture: &str,
        value: &Value,
    ) {
        let request = match Request::decode(value) {
            Ok(request) => request,
            Err(failure) => {
                warn!(target: DISPATCH_TARGET, topic, error = %failure, "rejecting malformed request");
                let id = value.get("id").filter(|id| !id.is_null());
                if let Some(id) = id {
                    self.respond(binding, id, ResponseOutcome::error(&failure.to_error_object()));
                }
                return;
            }
        };

        let code = guarded(topic, || {
            binding
                .handler
                .on_request(capture, &request.method, &request.params)
        });
        debug!(
            target: DISPATCH_TARGET,
            topic,
            method = %request.method,
            code,
            "request handled"
        );

        if let Some(id) = &request.id {
            let outcome = if code >= 0 {
                ResponseOutcome::Result(Value::from(code))
            } else {
                ResponseOutcome::error(&ErrorObject::from_code(code))
            };
            self.respond(binding, id, outcome);
        }
    }

    fn dispatch_response(
        &self,
        topic: &str,
        binding: &MatchedBinding<'_>,
        capture: &str,
        value: &Value,
    ) {
        let response = match Response::decode(value) {
            Ok(response) => response,
            Err(failure) => {
                warn!(target: DISPATCH_TARGET, topic, error = %failure, "dropping malformed response");
                return;
            }
        };

        if self.correlation == CorrelationMode::Strict {
            let known = response
                .id
                .as_ref()
                .is_some_and(|id| self.pending.complete(id));
            if !known {
                debug!(target: DISPATCH_TARGET, topic, id = ?response.id, "dropping uncorrelated response");
                return;
            }
        }

        guarded(topic, || {
            binding.handler.on_response(capture, &response);
        });
    }

    fn respond(&self, binding: &MatchedBinding<'_>, id: &Value, outcome: ResponseOutcome) {
        let Some(response_topic) = binding.response_topic.as_deref() else {
            debug!(target: DISPATCH_TARGET, pattern = %binding.pattern, "no response topic bound");
            return;
        };
        let envelope = match Response::encode(&outcome.into_payload(), Some(id)) {
            Ok(envelope) => envelope,
            Err(failure) => {
                warn!(target: DISPATCH_TARGET, error = %failure, "response could not be encoded");
                return;
            }
        };
        if let Err(failure) = self.publisher.publish_value(response_topic, false, &envelope) {
            warn!(
                target: DISPATCH_TARGET,
                topic = response_topic,
                error = %failure,
                "response could not be published"
            );
        }
    }
}

/// Runs a handler callback, converting a panic into an application error code.
fn guarded<T, F>(topic: &str, callback: F) -> T
where
    F: FnOnce() -> T,
    T: From<HandlerPanic>,
{
    panic::catch_unwind(AssertUnwindSafe(callback)).unwrap_or_else(|_| {
        error!(target: DISPATCH_TARGET, topic, "handler panicked");
        T::from(HandlerPanic)
    })
}

/// Marker for a panicking handler.
struct HandlerPanic;

impl From<HandlerPanic> for i32 {
    fn from(_: HandlerPanic) -> Self {
        ErrorCode::ApplicationError.code()
    }
}

impl From<HandlerPanic> for () {
    fn from(_: HandlerPanic) -> Self {}
}
