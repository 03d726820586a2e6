//! Connection lifecycle tracking for the transport session.
//!
//! The manager owns the state machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Lost -> Connecting -> Connected
//!                                        \-> Disconnected (explicit shutdown)
//! ```
//!
//! Foreground `connect`/`disconnect` calls block on a condition variable until
//! the transport reports the outcome. Transport calls are never made while the
//! state lock is held, so callbacks arriving on the transport's thread cannot
//! deadlock against a waiting caller.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::transport::{Transport, TransportError};

const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; initial state and the result of an explicit disconnect.
    Disconnected,
    /// A connect is in flight.
    Connecting,
    /// The broker accepted the session.
    Connected,
    /// An established session dropped and has not been recovered yet.
    Lost,
}

impl ConnectionState {
    /// Lower-case state name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Lost => "lost",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Errors raised by blocking lifecycle calls.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The transport refused the request outright.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The transport reported a failed connection attempt.
    #[error("connection failed: {cause}")]
    Failed { cause: String },
    /// No outcome was reported within the configured bound.
    #[error("{operation} did not complete within {waited:?}")]
    Timeout {
        operation: &'static str,
        waited: Duration,
    },
}

/// Result of a successful [`ConnectionManager::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// This call established the session.
    Established,
    /// A session was already up; nothing was done.
    AlreadyConnected,
}

/// How a `Connected` report relates to in-flight calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Established {
    /// A blocked `connect` call receives the outcome and follows up.
    Awaited,
    /// The transport reconnected on its own after a loss.
    Unprompted,
}

struct Inner {
    state: ConnectionState,
    fallback: ConnectionState,
    last_failure: Option<String>,
    recovering: bool,
    shutting_down: bool,
}

/// Tracks session state and serialises blocking lifecycle calls.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    inner: Mutex<Inner>,
    changed: Condvar,
    timeout: Option<Duration>,
}

impl ConnectionManager {
    /// Creates a manager in the `Disconnected` state.
    ///
    /// `timeout` bounds each blocking wait; `None` waits indefinitely.
    pub fn new(transport: Arc<dyn Transport>, timeout: Option<Duration>) -> Self {
        Self {
            transport,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                fallback: ConnectionState::Disconnected,
                last_failure: None,
                recovering: false,
                shutting_down: false,
            }),
            changed: Condvar::new(),
            timeout,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Connects with auto-reconnect enabled and waits for the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Transport`] when the transport rejects the
    /// request, [`ConnectionError::Failed`] when the attempt is reported as
    /// failed, and [`ConnectionError::Timeout`] when no outcome arrives in time.
    pub fn connect(&self) -> Result<ConnectOutcome, ConnectionError> {
        {
            let mut inner = self.lock();
            if inner.state == ConnectionState::Connected {
                return Ok(ConnectOutcome::AlreadyConnected);
            }
            inner.fallback = if inner.state == ConnectionState::Lost {
                ConnectionState::Lost
            } else {
                ConnectionState::Disconnected
            };
            inner.state = ConnectionState::Connecting;
            inner.last_failure = None;
            inner.shutting_down = false;
        }
        debug!(target: CONNECTION_TARGET, "connecting");

        if let Err(error) = self.transport.connect(true) {
            self.settle_failed_attempt(&error.to_string());
            return Err(error.into());
        }

        let inner = self.wait_while("connect", |inner| {
            inner.state == ConnectionState::Connecting
        })?;
        if inner.state == ConnectionState::Connected {
            return Ok(ConnectOutcome::Established);
        }
        let cause = inner
            .last_failure
            .clone()
            .unwrap_or_else(|| format!("session ended in state {}", inner.state));
        Err(ConnectionError::Failed { cause })
    }

    /// Disconnects and waits for the transport to confirm.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Transport`] when the request cannot be
    /// issued and [`ConnectionError::Timeout`] when confirmation does not
    /// arrive in time.
    pub fn disconnect(&self) -> Result<(), ConnectionError> {
        {
            let mut inner = self.lock();
            if inner.state == ConnectionState::Disconnected {
                return Ok(());
            }
            inner.shutting_down = true;
        }

        match self.transport.disconnect() {
            Ok(()) => {}
            Err(TransportError::NotConnected) => {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        }

        self.wait_while("disconnect", |inner| {
            inner.state != ConnectionState::Disconnected
        })?;
        info!(target: CONNECTION_TARGET, "disconnected");
        Ok(())
    }

    /// Records a `Connected` report from the transport.
    pub fn mark_connected(&self) -> Established {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = ConnectionState::Connected;
        inner.last_failure = None;
        self.changed.notify_all();
        debug!(target: CONNECTION_TARGET, previous = %previous, "connected");
        if previous == ConnectionState::Connecting {
            Established::Awaited
        } else {
            Established::Unprompted
        }
    }

    /// Records a failed connection attempt.
    pub fn mark_connect_failed(&self, cause: &str) {
        self.settle_failed_attempt(cause);
    }

    /// Records the loss of an established session.
    ///
    /// Returns `true` when the caller should start a recovery worker; at most
    /// one recovery runs at a time and none starts during shutdown.
    pub fn mark_lost(&self, cause: &str) -> bool {
        let mut inner = self.lock();
        if inner.shutting_down {
            return false;
        }
        inner.state = ConnectionState::Lost;
        inner.last_failure = Some(cause.to_owned());
        self.changed.notify_all();
        warn!(target: CONNECTION_TARGET, cause, "connection lost");
        if inner.recovering {
            false
        } else {
            inner.recovering = true;
            true
        }
    }

    /// Records completion of an explicit disconnect.
    pub fn mark_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    /// Clears the recovery flag once a recovery worker finishes.
    pub fn finish_recovery(&self) {
        self.lock().recovering = false;
    }

    /// True while an explicit disconnect is in progress or complete.
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    fn settle_failed_attempt(&self, cause: &str) {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Connecting {
            inner.state = inner.fallback;
        }
        inner.last_failure = Some(cause.to_owned());
        self.changed.notify_all();
        debug!(target: CONNECTION_TARGET, cause, "connection attempt failed");
    }

    fn set_state(&self, state: ConnectionState) {
        let mut inner = self.lock();
        inner.state = state;
        self.changed.notify_all();
    }

    fn wait_while<F>(
        &self,
        operation: &'static str,
        mut pending: F,
    ) -> Result<MutexGuard<'_, Inner>, ConnectionError>
    where
        F: FnMut(&mut Inner) -> bool,
    {
        let guard = self.lock();
        let Some(limit) = self.timeout else {
            return Ok(self
                .changed
                .wait_while(guard, pending)
                .unwrap_or_else(PoisonError::into_inner));
        };

        let (mut inner, result) = self
            .changed
            .wait_timeout_while(guard, limit, &mut pending)
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && pending(&mut *inner) {
            if inner.state == ConnectionState::Connecting {
                inner.state = inner.fallback;
            }
            warn!(target: CONNECTION_TARGET, operation, waited = ?limit, "timed out");
            return Err(ConnectionError::Timeout {
                operation,
                waited: limit,
            });
        }
        Ok(inner)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
