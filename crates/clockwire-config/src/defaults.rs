use crate::broker::BrokerEndpoint;
use crate::modes::{CaptureMode, CorrelationMode, LogFormat};

/// Broker host used when no configuration layer supplies one.
pub const DEFAULT_BROKER_HOST: &str = "127.0.0.1";

/// Standard unencrypted MQTT port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Client identifier, also the prefix of the version announcement topic.
pub const DEFAULT_CLIENT_ID: &str = "clockwire";

/// Version reported in the announcement when the host process sets none.
pub const DEFAULT_CLIENT_VERSION: &str = "0.0.0";

/// Keep-alive interval negotiated with the broker, in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 20;

/// Upper bound on blocking connect and disconnect calls, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Pause between failed transport polls while reconnecting, in milliseconds.
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 1_000;

/// Lifetime of an outstanding request under strict correlation.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default broker endpoint.
pub fn default_broker() -> BrokerEndpoint {
    BrokerEndpoint::default()
}

/// Owned client identifier used by serde.
pub fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_owned()
}

/// Owned client version used by serde.
pub fn default_client_version() -> String {
    DEFAULT_CLIENT_VERSION.to_owned()
}

pub fn default_keep_alive_secs() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}

pub fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

pub fn default_reconnect_backoff_ms() -> u64 {
    DEFAULT_RECONNECT_BACKOFF_MS
}

pub fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

/// Version announcements are on unless disabled.
pub fn default_announce_version() -> bool {
    true
}

/// Default log filter expression.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

pub fn default_correlation() -> CorrelationMode {
    CorrelationMode::Unchecked
}

pub fn default_capture() -> CaptureMode {
    CaptureMode::WholeTopic
}
