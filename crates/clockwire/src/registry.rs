//! Ordered handler registrations keyed by topic pattern.
//!
//! Registration order is dispatch order: the first pattern matching an inbound
//! topic receives the message and no other registration is consulted.
//! Re-registering a pattern replaces its handler and response topic in place,
//! keeping both its position and its request counter.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::envelope::Response;
use crate::topic::{Capture, match_topic};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Method reported for payloads that carry no envelope.
pub const RAW_METHOD: &str = "invalid RPC";

/// Method reported for empty payloads.
pub const DELETE_METHOD: &str = "delete";

/// Application callback bound to a topic pattern.
///
/// Handlers run on the transport's delivery thread with no bridge lock held,
/// so they may publish or subscribe themselves.
pub trait MessageHandler: Send + Sync {
    /// Handles a request or notification.
    ///
    /// The return value becomes the response: non-negative codes are sent as
    /// `result`, negative codes as an error object.
    fn on_request(&self, capture: &str, method: &str, params: &Value) -> i32;

    /// Handles a response to a request this process sent.
    fn on_response(&self, capture: &str, response: &Response) {
        debug!(
            target: REGISTRY_TARGET,
            capture,
            id = ?response.id,
            "response ignored by handler"
        );
    }

    /// Handles a payload that is valid JSON but not an envelope.
    fn on_raw(&self, capture: &str, payload: &Value) -> i32 {
        self.on_request(capture, RAW_METHOD, payload)
    }

    /// Handles an empty payload, which signals deletion of retained state.
    fn on_delete(&self, capture: &str) -> i32 {
        self.on_request(capture, DELETE_METHOD, &Value::Object(Map::new()))
    }
}

struct FnHandler<F>(F);

impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&str, &str, &Value) -> i32 + Send + Sync,
{
    fn on_request(&self, capture: &str, method: &str, params: &Value) -> i32 {
        (self.0)(capture, method, params)
    }
}

/// Wraps a request callback as a shareable handler.
pub fn handler_fn<F>(callback: F) -> Arc<dyn MessageHandler>
where
    F: Fn(&str, &str, &Value) -> i32 + Send + Sync + 'static,
{
    Arc::new(FnHandler(callback))
}

/// Errors raised by registry mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The configured registration limit was reached.
    #[error("handler registry is full ({capacity} registrations)")]
    ResourceExhausted { capacity: usize },
}

/// Whether an upsert created a new slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// Appended at the end of the dispatch order.
    Inserted,
    /// Replaced an existing registration in place.
    Replaced,
}

struct Registration {
    pattern: String,
    handler: Arc<dyn MessageHandler>,
    response_topic: Option<String>,
    counter: AtomicU32,
}

/// Registration selected for an inbound topic.
#[derive(Clone)]
pub struct MatchedBinding<'t> {
    /// Pattern that matched.
    pub pattern: String,
    /// Handler to invoke.
    pub handler: Arc<dyn MessageHandler>,
    /// Topic for responses, if any.
    pub response_topic: Option<String>,
    /// Capture produced by the match.
    pub capture: Capture<'t>,
}

impl fmt::Debug for MatchedBinding<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MatchedBinding")
            .field("pattern", &self.pattern)
            .field("response_topic", &self.response_topic)
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}

/// Thread-safe ordered registry.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: RwLock<Vec<Registration>>,
    capacity: Option<usize>,
}

impl HandlerRegistry {
    /// Creates a registry, optionally bounded to `capacity` registrations.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            capacity,
        }
    }

    /// Inserts or replaces the registration for `pattern`.
    ///
    /// An empty `response_topic` is treated as none.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ResourceExhausted`] when a new pattern would
    /// exceed the capacity. Replacing an existing pattern always succeeds.
    pub fn upsert(
        &self,
        pattern: &str,
        handler: Arc<dyn MessageHandler>,
        response_topic: Option<&str>,
    ) -> Result<Upsert, RegistryError> {
        let response_topic = response_topic
            .filter(|topic| !topic.is_empty())
            .map(str::to_owned);
        let mut entries = self.write();
        if let Some(existing) = entries.iter_mut().find(|entry| entry.pattern == pattern) {
            existing.handler = handler;
            existing.response_topic = response_topic;
            debug!(target: REGISTRY_TARGET, pattern, "registration replaced");
            return Ok(Upsert::Replaced);
        }

        if let Some(capacity) = self.capacity
            && entries.len() >= capacity
        {
            return Err(RegistryError::ResourceExhausted { capacity });
        }

        entries.push(Registration {
            pattern: pattern.to_owned(),
            handler,
            response_topic,
            counter: AtomicU32::new(0),
        });
        debug!(target: REGISTRY_TARGET, pattern, slot = entries.len() - 1, "registration added");
        Ok(Upsert::Inserted)
    }

    /// Removes the registration for `pattern`, returning whether one existed.
    pub fn remove(&self, pattern: &str) -> bool {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|entry| entry.pattern != pattern);
        let removed = entries.len() != before;
        if removed {
            debug!(target: REGISTRY_TARGET, pattern, "registration removed");
        }
        removed
    }

    /// First registration, in order, whose pattern matches `topic`.
    pub fn find_first_match<'t>(&self, topic: &'t str) -> Option<MatchedBinding<'t>> {
        self.read().iter().find_map(|entry| {
            match_topic(&entry.pattern, topic).map(|capture| MatchedBinding {
                pattern: entry.pattern.clone(),
                handler: Arc::clone(&entry.handler),
                response_topic: entry.response_topic.clone(),
                capture,
            })
        })
    }

    /// Registered patterns in dispatch order.
    #[must_use]
    pub fn patterns(&self) -> Vec<String> {
        self.read()
            .iter()
            .map(|entry| entry.pattern.clone())
            .collect()
    }

    /// Increments and returns the request counter of the exact `pattern`.
    ///
    /// The first id handed out for a pattern is `1`.
    pub fn next_request_id(&self, pattern: &str) -> Option<u32> {
        self.read()
            .iter()
            .find(|entry| entry.pattern == pattern)
            .map(|entry| entry.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Registration>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Registration>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
