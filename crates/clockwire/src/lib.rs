//! JSON-RPC messaging over a publish/subscribe broker.
//!
//! `clockwire` lets a timing daemon expose request handlers on MQTT topic
//! patterns and publish requests, notifications, responses, and health data
//! to its peers. Registrations are matched in order with MQTT wildcard rules
//! (`+` for one level, `#` for the remainder), and the first match receives
//! each inbound message.
//!
//! The [`Bridge`] owns the connection lifecycle. A lost session is recovered
//! in the background and every registration is subscribed again exactly once,
//! followed by a retained version announcement on `<client_id>/version`.
//!
//! Most hosts start with [`bootstrap`], which loads [`clockwire_config`]
//! configuration, installs structured telemetry, and connects over
//! [`MqttTransport`]. Tests and embedders supply their own [`Transport`]
//! through [`bootstrap_with`] or [`Bridge::new`].

mod bootstrap;
mod bridge;
mod connection;
mod correlation;
mod dispatch;
pub mod envelope;
mod health;
mod process_hash;
mod publisher;
mod registry;
mod telemetry;
pub mod topic;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, MqttTransportProvider, StaticConfigLoader, SystemConfigLoader,
    TransportProvider, bootstrap, bootstrap_with,
};
pub use bridge::{Bridge, RequestId, SubscribeError, VERSION_METHOD};
pub use connection::{ConnectOutcome, ConnectionError, ConnectionState};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process_hash::process_hash;
pub use publisher::PublishError;
pub use registry::{
    DELETE_METHOD, MessageHandler, RAW_METHOD, RegistryError, Upsert, handler_fn,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{MqttTransport, Transport, TransportError, TransportListener};

#[cfg(test)]
mod tests;
