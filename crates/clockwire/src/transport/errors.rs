//! Error types for transport operations.

use thiserror::Error;

/// Failures reported by a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No session exists, so the operation cannot be queued.
    #[error("transport is not connected")]
    NotConnected,
    /// A connection could not be started.
    #[error("failed to connect: {message}")]
    Connect { message: String },
    /// A disconnect request could not be issued.
    #[error("failed to disconnect: {message}")]
    Disconnect { message: String },
    /// The broker subscription could not be issued.
    #[error("failed to subscribe to '{pattern}': {message}")]
    Subscribe { pattern: String, message: String },
    /// The broker unsubscription could not be issued.
    #[error("failed to unsubscribe from '{pattern}': {message}")]
    Unsubscribe { pattern: String, message: String },
    /// The message could not be handed to the client.
    #[error("failed to publish to '{topic}': {message}")]
    Publish { topic: String, message: String },
}

impl TransportError {
    /// Creates a connect error.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Creates a disconnect error.
    pub fn disconnect(message: impl Into<String>) -> Self {
        Self::Disconnect {
            message: message.into(),
        }
    }

    /// Creates a subscribe error.
    pub fn subscribe(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscribe {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Creates an unsubscribe error.
    pub fn unsubscribe(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsubscribe {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Creates a publish error.
    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }
}
