//! Application-facing bridge tying the registry, dispatcher, publisher, and
//! connection lifecycle to one transport.
//!
//! The bridge registers itself as the transport's listener. Inbound messages
//! run through the [`Dispatcher`] on the transport's delivery thread, and
//! session losses start a single recovery worker that reconnects, re-issues
//! every subscription, and republishes the version announcement.

use std::sync::{Arc, Weak};
use std::thread;

use clockwire_config::{Config, CorrelationMode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::connection::{
    ConnectOutcome, ConnectionError, ConnectionManager, ConnectionState, Established,
};
use crate::correlation::PendingRequests;
use crate::dispatch::Dispatcher;
use crate::envelope::PROTOCOL_VERSION;
use crate::health::HealthReporter;
use crate::process_hash::process_hash;
use crate::publisher::{PublishError, Publisher};
use crate::registry::{HandlerRegistry, MessageHandler, RegistryError, Upsert};
use crate::transport::{Transport, TransportError, TransportListener};

const BRIDGE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bridge");

/// Method of the retained version announcement.
pub const VERSION_METHOD: &str = "version";

/// Failures raised by [`Bridge::subscribe`].
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// The registry refused the registration.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The broker refused the subscription; the registration was rolled back.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Correlation id handed out by [`Bridge::next_request_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestId {
    /// Name of the requesting executable.
    pub request_name: String,
    /// Per-pattern counter value.
    pub request_id: u32,
}

impl RequestId {
    /// JSON form used as an envelope `id`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "request_name": self.request_name,
            "request_id": self.request_id,
        })
    }
}

/// JSON-RPC messaging bridge over a publish/subscribe transport.
///
/// Dropping the bridge disconnects any live session and then releases the
/// transport.
pub struct Bridge {
    core: Arc<BridgeCore>,
}

struct BridgeCore {
    this: Weak<BridgeCore>,
    config: Config,
    transport: Arc<dyn Transport>,
    connection: ConnectionManager,
    registry: HandlerRegistry,
    publisher: Publisher,
    pending: PendingRequests,
    reporter: Arc<dyn HealthReporter>,
    request_name: String,
}

impl Bridge {
    /// Builds a disconnected bridge and binds it to `transport`.
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        let request_name = executable_name().unwrap_or_else(|| config.client_id().to_owned());
        let core = Arc::new_cyclic(|this| BridgeCore {
            this: this.clone(),
            connection: ConnectionManager::new(Arc::clone(&transport), config.connect_timeout()),
            registry: HandlerRegistry::new(config.max_handlers()),
            publisher: Publisher::new(Arc::clone(&transport)),
            pending: PendingRequests::new(config.request_timeout()),
            transport,
            reporter,
            request_name,
            config,
        });
        let weak = Arc::downgrade(&core);
        let listener: Weak<dyn TransportListener> = weak;
        core.transport.bind(listener);
        Self { core }
    }

    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.core.connection.state()
    }

    /// Connects to the broker and waits for the outcome.
    ///
    /// A newly established session subscribes every registration and
    /// publishes the version announcement before this returns.
    ///
    /// # Errors
    ///
    /// Propagates [`ConnectionError`] from the connection manager.
    pub fn connect(&self) -> Result<ConnectOutcome, ConnectionError> {
        self.core.connect()
    }

    /// Disconnects, waits for confirmation, and releases the transport.
    ///
    /// # Errors
    ///
    /// Propagates [`ConnectionError`] from the connection manager; the
    /// transport is not released in that case.
    pub fn disconnect(&self) -> Result<(), ConnectionError> {
        self.core.connection.disconnect()?;
        self.core.transport.release();
        self.core.reporter.disconnected();
        Ok(())
    }

    /// Registers `handler` for `pattern`, replacing any earlier registration
    /// of the same pattern in place.
    ///
    /// While connected the broker subscription is issued immediately;
    /// otherwise it is issued by the next successful connect.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError::Registry`] when the registry is full and
    /// [`SubscribeError::Transport`] when the broker subscription fails, in
    /// which case the registration is removed again.
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn MessageHandler>,
        response_topic: Option<&str>,
    ) -> Result<Upsert, SubscribeError> {
        let outcome = self.core.registry.upsert(pattern, handler, response_topic)?;
        if self.state() != ConnectionState::Connected {
            debug!(target: BRIDGE_TARGET, pattern, "broker subscription deferred until connected");
            return Ok(outcome);
        }

        if let Err(error) = self.core.transport.subscribe(pattern) {
            self.core.registry.remove(pattern);
            if let Err(cleanup) = self.core.transport.unsubscribe(pattern) {
                debug!(target: BRIDGE_TARGET, pattern, error = %cleanup, "rollback unsubscribe failed");
            }
            warn!(target: BRIDGE_TARGET, pattern, error = %error, "subscription rejected");
            return Err(error.into());
        }
        info!(target: BRIDGE_TARGET, pattern, "subscribed");
        Ok(outcome)
    }

    /// Removes the registration for `pattern` and its broker subscription.
    ///
    /// Returns whether a registration existed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the broker unsubscribe fails; the local
    /// registration is removed regardless.
    pub fn unsubscribe(&self, pattern: &str) -> Result<bool, TransportError> {
        let removed = self.core.registry.remove(pattern);
        if self.state() == ConnectionState::Connected {
            self.core.transport.unsubscribe(pattern)?;
        }
        Ok(removed)
    }

    /// Publishes raw bytes.
    ///
    /// # Errors
    ///
    /// See [`Publisher::publish`].
    pub fn publish(&self, topic: &str, retain: bool, payload: &[u8]) -> Result<(), PublishError> {
        self.core.publisher.publish(topic, retain, payload)
    }

    /// Publishes retained, timestamped health data.
    ///
    /// # Errors
    ///
    /// See [`Publisher::publish_health`].
    pub fn publish_health(&self, topic: &str, data: &Value) -> Result<(), PublishError> {
        self.core.publisher.publish_health(topic, data)
    }

    /// Publishes a JSON-RPC request, notification, or response.
    ///
    /// Under strict correlation, the id of every request sent here is tracked
    /// so the matching response can be delivered.
    ///
    /// # Errors
    ///
    /// See [`Publisher::publish_rpc`].
    pub fn publish_rpc(
        &self,
        topic: &str,
        method: Option<&str>,
        data: Value,
        id: Option<Value>,
    ) -> Result<(), PublishError> {
        let tracked = if self.core.config.correlation() == CorrelationMode::Strict && method.is_some()
        {
            id.clone()
        } else {
            None
        };
        // A response can arrive before the send returns.
        if let Some(id) = &tracked {
            self.core.pending.record(id);
        }
        let outcome = self.core.publisher.publish_rpc(topic, method, data, id);
        if outcome.is_err()
            && let Some(id) = &tracked
        {
            self.core.pending.forget(id);
        }
        outcome
    }

    /// Next correlation id for requests sent from the exact `pattern`.
    ///
    /// `None` when `pattern` is not registered; the caller should then send a
    /// notification.
    #[must_use]
    pub fn next_request_id(&self, pattern: &str) -> Option<RequestId> {
        self.core
            .registry
            .next_request_id(pattern)
            .map(|request_id| RequestId {
                request_name: self.core.request_name.clone(),
                request_id,
            })
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Err(error) = self.core.connection.disconnect() {
            warn!(target: BRIDGE_TARGET, error = %error, "disconnect on drop failed");
        }
        self.core.transport.release();
    }
}

impl BridgeCore {
    fn connect(&self) -> Result<ConnectOutcome, ConnectionError> {
        match self.connection.connect() {
            Ok(ConnectOutcome::Established) => {
                self.session_established();
                Ok(ConnectOutcome::Established)
            }
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.reporter.connection_failed(&error);
                Err(error)
            }
        }
    }

    fn session_established(&self) {
        self.reporter.connection_established(self.config.broker());
        let (restored, dropped) = self.resubscribe_all();
        self.reporter.resubscribed(restored, dropped);
        self.announce_version();
    }

    /// Issues one broker subscribe per registration, dropping rejected ones.
    fn resubscribe_all(&self) -> (usize, usize) {
        let mut restored = 0;
        let mut dropped = 0;
        for pattern in self.registry.patterns() {
            match self.transport.subscribe(&pattern) {
                Ok(()) => restored += 1,
                Err(error) => {
                    warn!(
                        target: BRIDGE_TARGET,
                        pattern = %pattern,
                        error = %error,
                        "dropping registration the broker rejected"
                    );
                    self.registry.remove(&pattern);
                    dropped += 1;
                }
            }
        }
        (restored, dropped)
    }

    fn announce_version(&self) {
        if !self.config.announce_version() {
            return;
        }
        let params = json!({
            "protocol_version": PROTOCOL_VERSION,
            "process_version": self.config.client_version(),
            "process_hash": process_hash(),
        });
        let topic = self.config.version_topic();
        if let Err(error) = self
            .publisher
            .publish_rpc(&topic, Some(VERSION_METHOD), params, None)
        {
            warn!(target: BRIDGE_TARGET, topic = %topic, error = %error, "version announcement failed");
        }
    }

    fn spawn_worker<F>(&self, name: &str, work: F) -> bool
    where
        F: FnOnce(Arc<Self>) + Send + 'static,
    {
        let Some(core) = self.this.upgrade() else {
            return false;
        };
        match thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || work(core))
        {
            Ok(_) => true,
            Err(error) => {
                warn!(target: BRIDGE_TARGET, worker = name, error = %error, "worker could not start");
                false
            }
        }
    }
}

impl TransportListener for BridgeCore {
    fn on_connected(&self) {
        if self.connection.mark_connected() == Established::Awaited
            || self.connection.is_shutting_down()
        {
            return;
        }
        // Follow-up publishes would block the event-loop thread draining them.
        self.spawn_worker("clockwire-resubscribe", |core| core.session_established());
    }

    fn on_connect_failed(&self, cause: &str) {
        self.connection.mark_connect_failed(cause);
    }

    fn on_message_arrived(&self, topic: &str, payload: &[u8]) {
        Dispatcher::new(
            &self.registry,
            &self.publisher,
            &self.pending,
            self.config.capture(),
            self.config.correlation(),
        )
        .dispatch(topic, payload);
    }

    fn on_connection_lost(&self, cause: &str) {
        if !self.connection.mark_lost(cause) {
            return;
        }
        self.reporter.connection_lost(cause);
        let started = self.spawn_worker("clockwire-recovery", |core| {
            if let Err(error) = core.connect() {
                debug!(target: BRIDGE_TARGET, error = %error, "recovery deferred to transport retries");
            }
            core.connection.finish_recovery();
        });
        if !started {
            self.connection.finish_recovery();
        }
    }

    fn on_disconnected(&self) {
        self.connection.mark_disconnected();
    }
}

fn executable_name() -> Option<String> {
    std::env::current_exe()
        .ok()?
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}
