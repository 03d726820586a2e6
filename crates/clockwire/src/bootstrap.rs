//! Bridge bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig as _, OrthoError};
use thiserror::Error;

use clockwire_config::Config;

use crate::bridge::Bridge;
use crate::connection::ConnectionError;
use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError};
use crate::transport::{MqttTransport, Transport};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the bridge configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to `Config::load`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a fixed configuration, for hosts that resolve their own.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Builds the transport the bridge drives.
pub trait TransportProvider {
    /// Creates a transport for `config`.
    fn provide(&self, config: &Config) -> Arc<dyn Transport>;
}

/// Provider of [`MqttTransport`] sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct MqttTransportProvider;

impl TransportProvider for MqttTransportProvider {
    fn provide(&self, config: &Config) -> Arc<dyn Transport> {
        Arc::new(MqttTransport::new(config))
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The initial broker connection failed.
    #[error("failed to connect to broker: {source}")]
    Connect {
        /// Underlying connection error.
        #[source]
        source: ConnectionError,
    },
}

/// Bootstraps a connected bridge using the supplied collaborators.
///
/// A bridge whose initial connect fails is dropped before the error is
/// returned, which releases its transport.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    provider: &dyn TransportProvider,
) -> Result<Bridge, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    if let Err(source) = telemetry::initialise(&config) {
        let error = BootstrapError::Telemetry { source };
        reporter.bootstrap_failed(&error);
        return Err(error);
    }

    let transport = provider.provide(&config);
    let bridge = Bridge::new(config.clone(), transport, Arc::clone(&reporter));
    if let Err(source) = bridge.connect() {
        drop(bridge);
        let error = BootstrapError::Connect { source };
        reporter.bootstrap_failed(&error);
        return Err(error);
    }

    reporter.bootstrap_succeeded(&config);
    Ok(bridge)
}

/// Bootstraps with the system configuration loader and the MQTT transport.
///
/// # Errors
///
/// See [`bootstrap_with`].
pub fn bootstrap(reporter: Arc<dyn HealthReporter>) -> Result<Bridge, BootstrapError> {
    bootstrap_with(&SystemConfigLoader, reporter, &MqttTransportProvider)
}
