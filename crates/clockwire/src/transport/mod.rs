//! Boundary between the bridge and a publish/subscribe transport.
//!
//! The bridge drives a [`Transport`] and receives its callbacks through a
//! [`TransportListener`]. Callbacks may arrive on the transport's own thread
//! while foreground calls are in flight.

mod errors;
mod mqtt;

use std::sync::Weak;

pub use self::errors::TransportError;
pub use self::mqtt::MqttTransport;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Outbound operations offered by a pub/sub client.
pub trait Transport: Send + Sync {
    /// Registers the receiver of transport callbacks.
    fn bind(&self, listener: Weak<dyn TransportListener>);

    /// Starts connecting; completion is reported through the listener.
    fn connect(&self, auto_reconnect: bool) -> Result<(), TransportError>;

    /// Starts disconnecting; completion is reported through the listener.
    fn disconnect(&self) -> Result<(), TransportError>;

    /// Subscribes the broker session to `pattern`.
    fn subscribe(&self, pattern: &str) -> Result<(), TransportError>;

    /// Removes the broker subscription for `pattern`.
    fn unsubscribe(&self, pattern: &str) -> Result<(), TransportError>;

    /// Publishes `payload` to `topic`.
    fn send(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportError>;

    /// Frees client resources. A later `connect` starts a fresh session.
    fn release(&self);
}

/// Callbacks raised by a [`Transport`].
pub trait TransportListener: Send + Sync {
    /// The broker accepted the session.
    fn on_connected(&self);

    /// A connection attempt failed.
    fn on_connect_failed(&self, cause: &str);

    /// A message arrived on a subscribed topic.
    fn on_message_arrived(&self, topic: &str, payload: &[u8]);

    /// An established connection dropped.
    fn on_connection_lost(&self, cause: &str);

    /// An explicit disconnect completed.
    fn on_disconnected(&self);
}
