//! MQTT transport built on the synchronous `rumqttc` client.
//!
//! Two threads serve each session. The event loop polls the connection and
//! reports session changes; inbound messages are queued to a delivery thread
//! so handlers can publish through the bounded client channel while the loop
//! keeps draining it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use clockwire_config::Config;
use rumqttc::{Client, ConnectReturnCode, Connection, Event, MqttOptions, Outgoing, Packet, QoS};
use tracing::{debug, info, warn};

use super::{TRANSPORT_TARGET, Transport, TransportError, TransportListener};

/// Request channel depth between the client handle and its event loop.
const CHANNEL_CAPACITY: usize = 64;

/// Smallest keep-alive interval accepted by the client.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// [`Transport`] speaking MQTT 3.1.1 at QoS 0 with a clean session.
pub struct MqttTransport {
    options: MqttOptions,
    backoff: Duration,
    listener: Mutex<Option<Weak<dyn TransportListener>>>,
    session: Mutex<Option<Session>>,
}

struct Delivery {
    topic: String,
    payload: Vec<u8>,
}

struct Session {
    client: Client,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Session {
    fn is_live(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
            && self
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Err(error) = self.client.disconnect() {
            debug!(target: TRANSPORT_TARGET, error = %error, "disconnect during stop failed");
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Released from a callback; the loop exits once the flag is seen.
            return;
        }
        if handle.join().is_err() {
            warn!(target: TRANSPORT_TARGET, "MQTT event loop panicked");
        }
    }
}

impl MqttTransport {
    /// Builds a transport for the configured broker.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let broker = config.broker();
        let mut options = MqttOptions::new(config.client_id(), broker.host(), broker.port());
        options.set_keep_alive(config.keep_alive().max(MIN_KEEP_ALIVE));
        options.set_clean_session(true);
        Self {
            options,
            backoff: config.reconnect_backoff(),
            listener: Mutex::new(None),
            session: Mutex::new(None),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn client(&self) -> Result<Client, TransportError> {
        self.lock_session()
            .as_ref()
            .filter(|session| session.is_live())
            .map(|session| session.client.clone())
            .ok_or(TransportError::NotConnected)
    }
}

impl Transport for MqttTransport {
    fn bind(&self, listener: Weak<dyn TransportListener>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn connect(&self, auto_reconnect: bool) -> Result<(), TransportError> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| TransportError::connect("no listener bound"))?;

        let stale = {
            let mut session = self.lock_session();
            if session.as_ref().is_some_and(Session::is_live) {
                // The running event loop reconnects on its own.
                return Ok(());
            }
            session.take()
        };
        if let Some(stale) = stale {
            stale.stop();
        }

        let (deliveries, inbox) = mpsc::channel();
        let delivery_listener = listener.clone();
        thread::Builder::new()
            .name("clockwire-deliver".to_owned())
            .spawn(move || deliver_messages(&inbox, &delivery_listener))
            .map_err(|error| TransportError::connect(error.to_string()))?;

        let (client, connection) = Client::new(self.options.clone(), CHANNEL_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_shutdown = Arc::clone(&shutdown);
        let backoff = self.backoff;
        let handle = thread::Builder::new()
            .name("clockwire-mqtt".to_owned())
            .spawn(move || {
                let session = EventLoop {
                    listener,
                    deliveries,
                    shutdown: loop_shutdown,
                    auto_reconnect,
                    backoff,
                };
                session.run(connection);
            })
            .map_err(|error| TransportError::connect(error.to_string()))?;

        let (host, port) = self.options.broker_address();
        info!(target: TRANSPORT_TARGET, host = %host, port, "MQTT session starting");
        let replaced = self.lock_session().replace(Session {
            client,
            shutdown,
            handle: Some(handle),
        });
        if let Some(replaced) = replaced {
            replaced.stop();
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        let client = {
            let session = self.lock_session();
            let Some(active) = session.as_ref() else {
                return Err(TransportError::NotConnected);
            };
            active.shutdown.store(true, Ordering::SeqCst);
            active.client.clone()
        };
        client
            .disconnect()
            .map_err(|error| TransportError::disconnect(error.to_string()))
    }

    fn subscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.client()?
            .subscribe(pattern, QoS::AtMostOnce)
            .map_err(|error| TransportError::subscribe(pattern, error.to_string()))
    }

    fn unsubscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.client()?
            .unsubscribe(pattern)
            .map_err(|error| TransportError::unsubscribe(pattern, error.to_string()))
    }

    fn send(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportError> {
        self.client()?
            .publish(topic, QoS::AtMostOnce, retain, payload)
            .map_err(|error| TransportError::publish(topic, error.to_string()))
    }

    fn release(&self) {
        let stale = self.lock_session().take();
        if let Some(session) = stale {
            session.stop();
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.release();
    }
}

/// State owned by the event-loop thread.
struct EventLoop {
    listener: Weak<dyn TransportListener>,
    deliveries: Sender<Delivery>,
    shutdown: Arc<AtomicBool>,
    auto_reconnect: bool,
    backoff: Duration,
}

impl EventLoop {
    fn run(self, mut connection: Connection) {
        let mut connected = false;
        for notification in connection.iter() {
            let Some(listener) = self.listener.upgrade() else {
                break;
            };
            match notification {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        connected = true;
                        listener.on_connected();
                    } else {
                        listener.on_connect_failed(&format!("broker refused session: {:?}", ack.code));
                        if !self.auto_reconnect {
                            break;
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let delivery = Delivery {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    };
                    if self.deliveries.send(delivery).is_err() {
                        warn!(target: TRANSPORT_TARGET, "delivery thread gone; message dropped");
                    }
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    listener.on_disconnected();
                    break;
                }
                Ok(_) => {}
                Err(error) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        listener.on_disconnected();
                        break;
                    }
                    let cause = error.to_string();
                    if connected {
                        connected = false;
                        listener.on_connection_lost(&cause);
                    } else {
                        listener.on_connect_failed(&cause);
                    }
                    if !self.auto_reconnect {
                        break;
                    }
                    thread::sleep(self.backoff);
                }
            }
        }
        debug!(target: TRANSPORT_TARGET, "MQTT event loop stopped");
    }
}

/// Hands queued messages to the listener in arrival order until the event
/// loop drops its sender.
fn deliver_messages(inbox: &Receiver<Delivery>, listener: &Weak<dyn TransportListener>) {
    for delivery in inbox {
        let Some(listener) = listener.upgrade() else {
            break;
        };
        listener.on_message_arrived(&delivery.topic, &delivery.payload);
    }
    debug!(target: TRANSPORT_TARGET, "MQTT delivery thread stopped");
}
