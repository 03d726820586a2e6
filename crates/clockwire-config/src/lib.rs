//! Layered configuration for the clockwire messaging bridge.
//!
//! Values resolve from built-in defaults, then an optional configuration file,
//! then `CLOCKWIRE_*` environment variables, then command-line flags.

mod broker;
mod defaults;
mod modes;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use broker::{BrokerEndpoint, BrokerParseError};
pub use defaults::*;
pub use modes::{CaptureMode, CorrelationMode, LogFormat, LogFormatParseError};

/// Resolved bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "CLOCKWIRE")]
pub struct Config {
    /// Broker address.
    #[serde(default = "default_broker")]
    pub broker: BrokerEndpoint,
    /// MQTT client identifier and version announcement prefix.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Version of the host process, published in the version announcement.
    #[serde(default = "default_client_version")]
    pub client_version: String,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Bound on blocking connect/disconnect in milliseconds; `0` waits forever.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Pause between failed reconnect attempts in milliseconds.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    /// Lifetime of an outstanding request under strict correlation.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Maximum number of handler registrations; `0` is unbounded.
    #[serde(default)]
    pub max_handlers: usize,
    /// Publish the retained version announcement after each connect.
    #[serde(default = "default_announce_version")]
    pub announce_version: bool,
    /// Response correlation policy.
    #[serde(default = "default_correlation")]
    pub correlation: CorrelationMode,
    /// Capture reported for patterns without a `+` level.
    #[serde(default = "default_capture")]
    pub capture: CaptureMode,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Log line format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            client_id: default_client_id(),
            client_version: default_client_version(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_handlers: 0,
            announce_version: default_announce_version(),
            correlation: default_correlation(),
            capture: default_capture(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Broker address.
    #[must_use]
    pub fn broker(&self) -> &BrokerEndpoint {
        &self.broker
    }

    /// MQTT client identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Host process version string.
    #[must_use]
    pub fn client_version(&self) -> &str {
        &self.client_version
    }

    /// Topic receiving the retained version announcement.
    #[must_use]
    pub fn version_topic(&self) -> String {
        format!("{}/version", self.client_id)
    }

    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Connect/disconnect wait bound, `None` when waits are unbounded.
    #[must_use]
    pub const fn connect_timeout(&self) -> Option<Duration> {
        if self.connect_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.connect_timeout_ms))
        }
    }

    #[must_use]
    pub const fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Registration limit, `None` when unbounded.
    #[must_use]
    pub const fn max_handlers(&self) -> Option<usize> {
        if self.max_handlers == 0 {
            None
        } else {
            Some(self.max_handlers)
        }
    }

    #[must_use]
    pub const fn announce_version(&self) -> bool {
        self.announce_version
    }

    #[must_use]
    pub const fn correlation(&self) -> CorrelationMode {
        self.correlation
    }

    #[must_use]
    pub const fn capture(&self) -> CaptureMode {
        self.capture
    }

    /// Filter expression used to initialise telemetry.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format used by telemetry.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
