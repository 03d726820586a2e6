//! Test doubles and the scenario world for the bridge suites.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use ortho_config::{OrthoConfig as _, OrthoError};
use serde_json::{Value, json};

use clockwire_config::{BrokerEndpoint, Config};

use crate::bootstrap::{BootstrapError, ConfigLoader, TransportProvider, bootstrap_with};
use crate::bridge::{Bridge, SubscribeError};
use crate::connection::ConnectionError;
use crate::envelope::Response;
use crate::health::HealthReporter;
use crate::registry::{MessageHandler, Upsert};
use crate::transport::{Transport, TransportError, TransportListener};

/// Calls observed by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect,
    Disconnect,
    Subscribe(String),
    Unsubscribe(String),
    Send {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    Release,
}

/// In-memory transport that acknowledges connects synchronously.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    listener: Mutex<Option<Weak<dyn TransportListener>>>,
    refused_patterns: Mutex<HashSet<String>>,
    connect_failure: Mutex<Option<String>>,
    sends_refused: AtomicBool,
}

impl RecordingTransport {
    /// Makes later subscribes to `pattern` fail.
    pub fn refuse_pattern(&self, pattern: &str) {
        self.refused_patterns
            .lock()
            .expect("refused patterns mutex poisoned")
            .insert(pattern.to_owned());
    }

    /// Makes later connects report `cause` as a failure.
    pub fn fail_connects(&self, cause: &str) {
        *self
            .connect_failure
            .lock()
            .expect("connect failure mutex poisoned") = Some(cause.to_owned());
    }

    /// Makes later sends fail after being recorded.
    pub fn refuse_sends(&self) {
        self.sends_refused.store(true, Ordering::SeqCst);
    }

    /// Snapshot of recorded calls.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().expect("transport calls mutex poisoned").clone()
    }

    /// Forgets recorded calls.
    pub fn clear(&self) {
        self.calls.lock().expect("transport calls mutex poisoned").clear();
    }

    /// Patterns passed to `subscribe`, in call order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Subscribe(pattern) => Some(pattern),
                _ => None,
            })
            .collect()
    }

    /// Messages passed to `send` as `(topic, parsed payload, retain)`.
    pub fn sent(&self) -> Vec<(String, Value, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Send {
                    topic,
                    payload,
                    retain,
                } => {
                    let value = serde_json::from_slice(&payload).unwrap_or(Value::Null);
                    Some((topic, value, retain))
                }
                _ => None,
            })
            .collect()
    }

    /// Messages sent to `topic`.
    pub fn sent_to(&self, topic: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|(sent, _, _)| sent == topic)
            .map(|(_, value, _)| value)
            .collect()
    }

    /// Delivers an inbound message to the bound listener.
    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        self.listener().on_message_arrived(topic, payload);
    }

    /// Reports the loss of the current session.
    pub fn drop_session(&self, cause: &str) {
        self.listener().on_connection_lost(cause);
    }

    /// Reports a reconnect the transport performed on its own.
    pub fn reconnect_unprompted(&self) {
        self.listener().on_connected();
    }

    fn listener(&self) -> Arc<dyn TransportListener> {
        self.listener
            .lock()
            .expect("listener mutex poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
            .expect("no listener bound")
    }

    fn record(&self, call: TransportCall) {
        self.calls
            .lock()
            .expect("transport calls mutex poisoned")
            .push(call);
    }
}

impl Transport for RecordingTransport {
    fn bind(&self, listener: Weak<dyn TransportListener>) {
        *self.listener.lock().expect("listener mutex poisoned") = Some(listener);
    }

    fn connect(&self, _auto_reconnect: bool) -> Result<(), TransportError> {
        self.record(TransportCall::Connect);
        let failure = self
            .connect_failure
            .lock()
            .expect("connect failure mutex poisoned")
            .clone();
        match failure {
            Some(cause) => self.listener().on_connect_failed(&cause),
            None => self.listener().on_connected(),
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Disconnect);
        self.listener().on_disconnected();
        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.record(TransportCall::Subscribe(pattern.to_owned()));
        let refused = self
            .refused_patterns
            .lock()
            .expect("refused patterns mutex poisoned")
            .contains(pattern);
        if refused {
            return Err(TransportError::subscribe(pattern, "not authorised"));
        }
        Ok(())
    }

    fn unsubscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.record(TransportCall::Unsubscribe(pattern.to_owned()));
        Ok(())
    }

    fn send(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportError> {
        self.record(TransportCall::Send {
            topic: topic.to_owned(),
            payload: payload.to_vec(),
            retain,
        });
        if self.sends_refused.load(Ordering::SeqCst) {
            return Err(TransportError::publish(topic, "broker unavailable"));
        }
        Ok(())
    }

    fn release(&self) {
        self.record(TransportCall::Release);
    }
}

/// Provider handing out one shared [`RecordingTransport`].
#[derive(Clone, Default)]
pub struct RecordingTransportProvider {
    pub transport: Arc<RecordingTransport>,
}

impl TransportProvider for RecordingTransportProvider {
    fn provide(&self, _config: &Config) -> Arc<dyn Transport> {
        self.transport.clone()
    }
}

/// One `on_request` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerCall {
    pub capture: String,
    pub method: String,
    pub params: Value,
}

/// Handler returning a fixed code and recording what it saw.
pub struct RecordingHandler {
    code: i32,
    panics: bool,
    requests: Mutex<Vec<HandlerCall>>,
    responses: Mutex<Vec<Response>>,
}

impl RecordingHandler {
    /// Handler returning `code` from every request.
    pub fn returning(code: i32) -> Arc<Self> {
        Arc::new(Self {
            code,
            panics: false,
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
        })
    }

    /// Handler that panics on every request.
    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            code: 0,
            panics: true,
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HandlerCall> {
        self.requests
            .lock()
            .expect("handler requests mutex poisoned")
            .clone()
    }

    pub fn responses(&self) -> Vec<Response> {
        self.responses
            .lock()
            .expect("handler responses mutex poisoned")
            .clone()
    }
}

impl MessageHandler for RecordingHandler {
    fn on_request(&self, capture: &str, method: &str, params: &Value) -> i32 {
        self.requests
            .lock()
            .expect("handler requests mutex poisoned")
            .push(HandlerCall {
                capture: capture.to_owned(),
                method: method.to_owned(),
                params: params.clone(),
            });
        assert!(!self.panics, "handler failure requested by test");
        self.code
    }

    fn on_response(&self, _capture: &str, response: &Response) {
        self.responses
            .lock()
            .expect("handler responses mutex poisoned")
            .push(response.clone());
    }
}

/// Structured health events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ConnectionEstablished(String),
    ConnectionFailed(String),
    ConnectionLost(String),
    Resubscribed { restored: usize, dropped: usize },
    Disconnected,
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Number of recorded events equal to `event`.
    pub fn count(&self, event: &HealthEvent) -> usize {
        self.events()
            .iter()
            .filter(|recorded| *recorded == event)
            .count()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn connection_established(&self, broker: &BrokerEndpoint) {
        self.record(HealthEvent::ConnectionEstablished(broker.to_string()));
    }

    fn connection_failed(&self, error: &ConnectionError) {
        self.record(HealthEvent::ConnectionFailed(error.to_string()));
    }

    fn connection_lost(&self, cause: &str) {
        self.record(HealthEvent::ConnectionLost(cause.to_owned()));
    }

    fn resubscribed(&self, restored: usize, dropped: usize) {
        self.record(HealthEvent::Resubscribed { restored, dropped });
    }

    fn disconnected(&self) {
        self.record(HealthEvent::Disconnected);
    }
}

/// Loader returning a configuration tuned for in-memory transports.
pub struct TestConfigLoader {
    config: Config,
}

impl TestConfigLoader {
    pub fn new() -> Self {
        Self {
            config: test_config(),
        }
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Loader that intentionally fails by passing an unsupported broker scheme.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("clockwire"),
            OsString::from("--broker"),
            OsString::from("unix:///run/broker.sock"),
        ];
        Config::load_from_iter(args)
    }
}

/// Configuration with short waits and a fixed client id.
pub fn test_config() -> Config {
    Config {
        client_id: "ptp4l".to_owned(),
        client_version: "4.2".to_owned(),
        connect_timeout_ms: 2_000,
        ..Config::default()
    }
}

/// Builds a bridge over `transport` without connecting.
pub fn bridge_over(
    config: Config,
    transport: &Arc<RecordingTransport>,
    reporter: &Arc<RecordingHealthReporter>,
) -> Bridge {
    Bridge::new(config, transport.clone(), reporter.clone())
}

/// Encodes a request envelope as sent by a peer.
pub fn request_payload(method: &str, id: Option<Value>) -> Vec<u8> {
    let mut envelope = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": {"timestamp": 0, "protocol_version": "1.0", "process_hash": "peer"},
    });
    if let (Some(id), Some(object)) = (id, envelope.as_object_mut()) {
        object.insert("id".to_owned(), id);
    }
    serde_json::to_vec(&envelope).expect("request should serialise")
}

/// Polls `condition` until it holds or a generous deadline passes.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    pub transport: Arc<RecordingTransport>,
    pub reporter: Arc<RecordingHealthReporter>,
    config: Config,
    loader: Box<dyn ConfigLoader>,
    bridge: Option<Bridge>,
    handlers: HashMap<String, Arc<RecordingHandler>>,
    patterns: Vec<String>,
    bootstrap_error: Option<BootstrapError>,
    subscribe_result: Option<Result<Upsert, SubscribeError>>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            transport: Arc::new(RecordingTransport::default()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            config: test_config(),
            loader: Box::new(TestConfigLoader::new()),
            bridge: None,
            handlers: HashMap::new(),
            patterns: Vec::new(),
            bootstrap_error: None,
            subscribe_result: None,
        }
    }

    /// Creates the bridge without connecting.
    pub fn build_bridge(&mut self) {
        if self.bridge.is_none() {
            self.bridge = Some(bridge_over(
                self.config.clone(),
                &self.transport,
                &self.reporter,
            ));
        }
    }

    pub fn bridge(&self) -> &Bridge {
        self.bridge.as_ref().expect("bridge not built")
    }

    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
    }

    /// Runs bootstrap against the recording transport.
    pub fn bootstrap(&mut self) {
        let provider = RecordingTransportProvider {
            transport: Arc::clone(&self.transport),
        };
        match bootstrap_with(&*self.loader, self.reporter.clone(), &provider) {
            Ok(bridge) => self.bridge = Some(bridge),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// Registers a new recording handler under `name`.
    pub fn register(&mut self, name: &str, code: i32, pattern: &str, response_topic: Option<&str>) {
        self.build_bridge();
        let handler = RecordingHandler::returning(code);
        self.handlers.insert(name.to_owned(), Arc::clone(&handler));
        self.patterns.push(pattern.to_owned());
        let result = self.bridge().subscribe(pattern, handler, response_topic);
        self.subscribe_result = Some(result);
    }

    pub fn handler(&self, name: &str) -> Result<Arc<RecordingHandler>, String> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| format!("no handler named '{name}'"))
    }

    /// Patterns registered through [`TestWorld::register`].
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Builds the bridge, connects it, and forgets the connect traffic.
    pub fn connect_bridge(&mut self) -> Result<(), String> {
        self.build_bridge();
        self.bridge()
            .connect()
            .map_err(|error| format!("connect failed: {error}"))?;
        self.transport.clear();
        Ok(())
    }

    pub fn subscribe_result(&self) -> Option<&Result<Upsert, SubscribeError>> {
        self.subscribe_result.as_ref()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

pub fn world() -> std::cell::RefCell<TestWorld> {
    std::cell::RefCell::new(TestWorld::new())
}
