use super::{ConnectionError, Connector, Frame, ReconnectPolicy, Transport};
use crate::config::ClientConfig;
use advisory_core::{
    AdvisorSummary, ClientEvent, Message, ServerEvent, VoicePayload, VoiceReply,
    api::ContextTurn,
};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{Instrument, debug, error, info, info_span, warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    pub base_interval: Duration,
    pub max_reconnect_attempts: u32,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            base_interval: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
        }
    }

    pub fn with_backoff(mut self, base_interval: Duration, max_reconnect_attempts: u32) -> Self {
        self.base_interval = base_interval;
        self.max_reconnect_attempts = max_reconnect_attempts;
        self
    }
}

impl From<&ClientConfig> for ConnectionConfig {
    fn from(config: &ClientConfig) -> Self {
        ConnectionConfig::new(config.ws_url.as_str())
            .with_backoff(config.reconnect_base, config.max_reconnect_attempts)
    }
}

/// Notifications published to every subscriber, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The transport came up (`true`) or went away (`false`).
    Connection(bool),
    Message(Message),
    AdvisorUpdate(Vec<AdvisorSummary>),
    VoiceProcessing(Option<String>),
    VoiceResponse(VoiceReply),
    /// `terminal` is set exactly once, when reconnecting has been given up.
    Error { message: String, terminal: bool },
}

impl From<ServerEvent> for ConnectionEvent {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::Message(msg) => ConnectionEvent::Message(msg),
            ServerEvent::AdvisorUpdate { advisors } => ConnectionEvent::AdvisorUpdate(advisors),
            ServerEvent::Error { message } => ConnectionEvent::Error {
                message,
                terminal: false,
            },
            ServerEvent::VoiceProcessing { status } => ConnectionEvent::VoiceProcessing(status),
            ServerEvent::VoiceResponse(reply) => ConnectionEvent::VoiceResponse(reply),
        }
    }
}

#[derive(Default)]
struct State {
    /// Present exactly while a transport is live.
    outbound: Option<mpsc::UnboundedSender<String>>,
    connecting: bool,
    reconnect_attempts: u32,
    /// Set while a supervisor task owns the connection lifecycle.
    active: bool,
    generation: u64,
    supervisor: Option<JoinHandle<()>>,
}

struct Inner {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<State>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn report(&self, err: &ConnectionError) {
        self.emit(ConnectionEvent::Error {
            message: err.to_string(),
            terminal: false,
        });
    }
}

/// Owns a single persistent connection to the advisory service.
///
/// Cloning is cheap and every clone drives the same connection. All `send*`
/// calls fail fast with `false` when no transport is live; they never wait
/// for one and never panic.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                state: Mutex::new(State::default()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().outbound.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        self.inner.lock().connecting
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().reconnect_attempts
    }

    /// Starts connecting. A no-op while connected, connecting, or waiting to
    /// reconnect. Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut state = self.inner.lock();
        if state.active {
            debug!("connect() ignored: connection already active");
            return;
        }
        state.active = true;
        state.connecting = true;
        state.generation += 1;
        let generation = state.generation;
        let span = info_span!("connection", url = %self.inner.config.url, generation);
        state.supervisor = Some(tokio::spawn(
            supervise(self.inner.clone(), generation).instrument(span),
        ));
    }

    /// Closes the connection on purpose. Pending reconnects are cancelled and
    /// no new ones are scheduled.
    pub fn disconnect(&self) {
        let was_connected = {
            let mut state = self.inner.lock();
            if let Some(handle) = state.supervisor.take() {
                handle.abort();
            }
            state.generation += 1;
            state.active = false;
            state.connecting = false;
            state.reconnect_attempts = 0;
            state.outbound.take().is_some()
        };
        info!("Disconnected by client.");
        if was_connected {
            self.inner.emit(ConnectionEvent::Connection(false));
        }
    }

    /// Serializes and queues one event on the live transport.
    pub fn send(&self, event: ClientEvent) -> bool {
        let name = event.name();
        let Some(outbound) = self.inner.lock().outbound.clone() else {
            let err = ConnectionError::NotConnected(name);
            warn!(event = name, "Dropping outbound event: not connected.");
            self.inner.report(&err);
            return false;
        };
        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(e) => {
                let err = ConnectionError::Encode {
                    event: name,
                    reason: e.to_string(),
                };
                error!(error = %err, "Failed to encode outbound event.");
                self.inner.report(&err);
                return false;
            }
        };
        if outbound.send(frame).is_err() {
            let err = ConnectionError::NotConnected(name);
            warn!(event = name, "Transport closed while sending.");
            self.inner.report(&err);
            return false;
        }
        debug!(event = name, "Queued outbound event.");
        true
    }

    pub fn send_message(
        &self,
        message: impl Into<String>,
        advisor: Option<String>,
        context: Vec<ContextTurn>,
    ) -> bool {
        self.send(ClientEvent::UserMessage {
            message: message.into(),
            advisor,
            context,
        })
    }

    pub fn send_voice(&self, payload: VoicePayload) -> bool {
        self.send(ClientEvent::VoiceData(payload))
    }

    pub fn start_session(&self, advisors: Vec<String>) -> bool {
        self.send(ClientEvent::StartSession { advisors })
    }

    pub fn end_session(&self) -> bool {
        self.send(ClientEvent::EndSession)
    }

    pub fn add_advisor(&self, advisor_id: impl Into<String>) -> bool {
        self.send(ClientEvent::AddAdvisor {
            advisor_id: advisor_id.into(),
        })
    }

    pub fn remove_advisor(&self, advisor_id: impl Into<String>) -> bool {
        self.send(ClientEvent::RemoveAdvisor {
            advisor_id: advisor_id.into(),
        })
    }
}

/// Runs the connect / pump / back off cycle until the server closes the
/// connection on purpose or the reconnect ceiling is passed.
async fn supervise(inner: Arc<Inner>, generation: u64) {
    let config = &inner.config;
    let mut policy = ReconnectPolicy::new(config.base_interval, config.max_reconnect_attempts);

    loop {
        inner.lock().connecting = true;
        match inner.connector.connect(&config.url).await {
            Ok(Transport {
                outbound,
                mut inbound,
            }) => {
                policy.reset();
                {
                    let mut state = inner.lock();
                    state.connecting = false;
                    state.reconnect_attempts = 0;
                    state.outbound = Some(outbound);
                }
                info!("Connected.");
                inner.emit(ConnectionEvent::Connection(true));

                let server_initiated = pump(&inner, &mut inbound).await;
                inner.lock().outbound = None;
                inner.emit(ConnectionEvent::Connection(false));
                if server_initiated {
                    info!("Server closed the connection; not reconnecting.");
                    break;
                }
                warn!("Connection lost.");
            }
            Err(err) => {
                inner.lock().connecting = false;
                warn!(error = %err, "Connection attempt failed.");
                inner.report(&err);
            }
        }

        match policy.next_delay() {
            Some(delay) => {
                let attempt = policy.attempts();
                inner.lock().reconnect_attempts = attempt;
                info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect.");
                tokio::time::sleep(delay).await;
            }
            None => {
                let message = format!(
                    "Unable to reach the server after {} reconnect attempts.",
                    config.max_reconnect_attempts
                );
                error!("{message}");
                inner.emit(ConnectionEvent::Error {
                    message,
                    terminal: true,
                });
                break;
            }
        }
    }

    let mut state = inner.lock();
    if state.generation == generation {
        state.active = false;
        state.connecting = false;
        state.supervisor = None;
    }
}

/// Delivers inbound frames to subscribers in order. Returns whether the
/// server closed the transport deliberately.
async fn pump(inner: &Inner, inbound: &mut mpsc::UnboundedReceiver<Frame>) -> bool {
    while let Some(frame) = inbound.recv().await {
        match frame {
            Frame::Text(text) => match ServerEvent::parse(&text) {
                Ok(Some(event)) => inner.emit(event.into()),
                Ok(None) => debug!(frame = %text, "Ignoring unknown server event."),
                Err(e) => {
                    warn!(error = %e, "Dropping malformed server frame.");
                    inner.emit(ConnectionEvent::Error {
                        message: e.to_string(),
                        terminal: false,
                    });
                }
            },
            Frame::Closed { server_initiated } => return server_initiated,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::super::testing::{ScriptedConnector, connected, next_event, test_config as config};
    use super::super::transport::MockConnector;
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn send_while_disconnected_fails_fast() {
        let manager = ConnectionManager::new(config(3), Arc::new(ScriptedConnector::default()));
        let mut events = manager.subscribe();

        assert!(!manager.send_message("hello", None, vec![]));
        assert!(!manager.end_session());
        assert!(!manager.send_voice(VoicePayload {
            audio: String::new(),
            format: "wav".into(),
            sample_rate: 16000,
            duration_ms: 0,
        }));

        for expected in ["user_message", "end_session", "voice_data"] {
            match next_event(&mut events).await {
                ConnectionEvent::Error { message, terminal } => {
                    assert!(!terminal);
                    assert!(message.contains(expected), "{message}");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_then_gives_up_once() {
        let calls = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let recorded = calls.clone();
        let mut connector = MockConnector::new();
        connector.expect_connect().times(4).returning(move |url: &str| {
            recorded.lock().unwrap().push(Instant::now());
            Err(ConnectionError::Connect {
                url: url.to_string(),
                reason: "refused".into(),
            })
        });

        let manager = ConnectionManager::new(config(3), Arc::new(connector));
        let mut events = manager.subscribe();
        manager.connect();

        let mut failures = 0;
        loop {
            match next_event(&mut events).await {
                ConnectionEvent::Error {
                    terminal: false, ..
                } => failures += 1,
                ConnectionEvent::Error { terminal: true, .. } => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(failures, 4);

        let calls = calls.lock().unwrap().clone();
        let gaps: Vec<_> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            [
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );

        // Nothing else is scheduled after the terminal error.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert_eq!(manager.reconnect_attempts(), 3);
        assert!(!manager.is_connected());
        assert!(!manager.is_connecting());
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let connector = Arc::new(ScriptedConnector::default());
        let _peer = connector.push();
        let manager = ConnectionManager::new(config(3), connector.clone());
        let mut events = manager.subscribe();

        manager.connect();
        manager.connect();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connection(true));
        manager.connect();

        assert_eq!(connector.calls(), 1);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn delivers_inbound_events_in_order_and_sends_frames() {
        let (manager, mut peer, mut events) = connected().await;

        assert!(manager.add_advisor("alex"));
        let sent = peer.sent.recv().await.unwrap();
        assert_eq!(sent, r#"{"event":"add_advisor","data":{"advisor_id":"alex"}}"#);

        for i in 0..5 {
            let frame = format!(r#"{{"event":"error","data":{{"message":"e{i}"}}}}"#);
            peer.push(&frame);
        }
        peer.frames
            .send(Frame::Text(r#"{"event":"voice_processing","data":{}}"#.into()))
            .unwrap();

        for i in 0..5 {
            assert_eq!(
                next_event(&mut events).await,
                ConnectionEvent::Error {
                    message: format!("e{i}"),
                    terminal: false
                }
            );
        }
        assert_eq!(
            next_event(&mut events).await,
            ConnectionEvent::VoiceProcessing(None)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_drop_reconnects_and_resets_attempts() {
        let connector = Arc::new(ScriptedConnector::default());
        let first = connector.push();
        let _second = connector.push();
        let manager = ConnectionManager::new(config(3), connector.clone());
        let mut events = manager.subscribe();
        manager.connect();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connection(true));

        first
            .frames
            .send(Frame::Closed {
                server_initiated: false,
            })
            .unwrap();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connection(false));
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connection(true));

        assert_eq!(connector.calls(), 2);
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn server_initiated_close_does_not_reconnect() {
        let connector = Arc::new(ScriptedConnector::default());
        let peer = connector.push();
        let manager = ConnectionManager::new(config(3), connector.clone());
        let mut events = manager.subscribe();
        manager.connect();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connection(true));

        peer.frames
            .send(Frame::Closed {
                server_initiated: true,
            })
            .unwrap();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connection(false));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.calls(), 1);
        assert!(!manager.is_connected());
        assert!(!manager.send_message("anyone there?", None, vec![]));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let connector = Arc::new(ScriptedConnector::default());
        let manager = ConnectionManager::new(config(5), connector.clone());
        let mut events = manager.subscribe();
        manager.connect();
        assert!(matches!(
            next_event(&mut events).await,
            ConnectionEvent::Error { terminal: false, .. }
        ));

        manager.disconnect();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.calls(), 1);
        assert_eq!(manager.reconnect_attempts(), 0);

        // A fresh connect() is allowed after an explicit disconnect.
        let _peer = connector.push();
        manager.connect();
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connection(true));
    }

    #[tokio::test]
    async fn malformed_frames_surface_as_errors() {
        let (_manager, peer, mut events) = connected().await;

        peer.frames.send(Frame::Text("{{nope".into())).unwrap();
        peer.frames
            .send(Frame::Text(r#"{"event":"typing","data":{}}"#.into()))
            .unwrap();
        peer.frames
            .send(Frame::Text(
                r#"{"event":"advisor_update","data":{"advisors":[{"id":"mark","name":"Mark Cuban"}]}}"#.into(),
            ))
            .unwrap();

        assert!(matches!(
            next_event(&mut events).await,
            ConnectionEvent::Error { terminal: false, .. }
        ));
        match next_event(&mut events).await {
            ConnectionEvent::AdvisorUpdate(advisors) => assert_eq!(advisors[0].name, "Mark Cuban"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
