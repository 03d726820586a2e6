//! `tracing` subscriber installation for bridge hosts.
//!
//! Events go to stderr as JSON objects or compact lines, stamped with RFC 3339
//! UTC times and the emitting thread's name, so delivery-thread and recovery
//! work can be told apart.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

use clockwire_config::{Config, LogFormat};

/// Directive applied unless the configured filter names the MQTT client.
const MQTT_CLIENT_DIRECTIVE: &str = "rumqttc=warn";

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Proof that a subscriber is installed, with the format it was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format of the installed subscriber.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },
    /// Another global subscriber was already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls leave the installed subscriber alone and report its format,
/// even when `config` asks for another one.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install(config).map(|()| config.log_format()))
        .map(|format| TelemetryHandle { format: *format })
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    let filter = build_filter(config.log_filter())?;
    let subscriber = subscriber_for(config.log_format(), filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn build_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    let invalid = |error: &dyn std::fmt::Display| TelemetryError::Filter {
        filter: expression.to_owned(),
        message: error.to_string(),
    };
    let mut filter = EnvFilter::try_new(expression).map_err(|error| invalid(&error))?;
    if !expression.contains("rumqttc") {
        let directive = MQTT_CLIENT_DIRECTIVE
            .parse()
            .map_err(|error| invalid(&error))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

fn subscriber_for(format: LogFormat, filter: EnvFilter) -> Box<dyn Subscriber + Send + Sync> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(true)
        .with_thread_names(true)
        .with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    }
}
