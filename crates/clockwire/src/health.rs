//! Structured health reporting for bridge lifecycle events.

use std::sync::Arc;

use clockwire_config::{BrokerEndpoint, Config};

use crate::bootstrap::BootstrapError;
use crate::connection::ConnectionError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer of bootstrap and broker session events.
///
/// Session callbacks may run on the transport's delivery thread or on a
/// recovery worker.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked when a session with the broker is established.
    fn connection_established(&self, broker: &BrokerEndpoint);

    /// Invoked when a connection attempt fails.
    fn connection_failed(&self, error: &ConnectionError);

    /// Invoked when an established session drops.
    fn connection_lost(&self, cause: &str);

    /// Invoked after subscriptions are re-issued on a recovered session.
    fn resubscribed(&self, restored: usize, dropped: usize);

    /// Invoked after an explicit disconnect completes.
    fn disconnected(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn connection_established(&self, broker: &BrokerEndpoint) {
        (**self).connection_established(broker);
    }

    fn connection_failed(&self, error: &ConnectionError) {
        (**self).connection_failed(error);
    }

    fn connection_lost(&self, cause: &str) {
        (**self).connection_lost(cause);
    }

    fn resubscribed(&self, restored: usize, dropped: usize) {
        (**self).resubscribed(restored, dropped);
    }

    fn disconnected(&self) {
        (**self).disconnected();
    }
}

/// Reporter emitting one `tracing` event per lifecycle change, tagged with an
/// `event` field for log queries.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "bootstrapping bridge"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            broker = %config.broker(),
            client_id = %config.client_id(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "bridge bootstrapped"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "bridge bootstrap aborted"
        );
    }

    fn connection_established(&self, broker: &BrokerEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "connection_established",
            broker = %broker,
            "broker session established"
        );
    }

    fn connection_failed(&self, error: &ConnectionError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "connection_failed",
            error = %error,
            "broker connection failed"
        );
    }

    fn connection_lost(&self, cause: &str) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "connection_lost",
            cause,
            "broker session lost"
        );
    }

    fn resubscribed(&self, restored: usize, dropped: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "resubscribed",
            restored,
            dropped,
            "subscriptions restored"
        );
    }

    fn disconnected(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "disconnected",
            "broker session closed"
        );
    }
}
