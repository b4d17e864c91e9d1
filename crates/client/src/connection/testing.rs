//! In-process transports for unit tests.

use super::{ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionManager, Connector, Frame, Transport};
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::{broadcast, mpsc};

/// The far end of a fake transport.
pub(crate) struct Peer {
    pub sent: mpsc::UnboundedReceiver<String>,
    pub frames: mpsc::UnboundedSender<Frame>,
}

impl Peer {
    pub fn push(&self, frame: &str) {
        self.frames.send(Frame::Text(frame.to_string())).unwrap();
    }

    pub fn close(&self, server_initiated: bool) {
        self.frames.send(Frame::Closed { server_initiated }).unwrap();
    }
}

pub(crate) fn transport_pair() -> (Transport, Peer) {
    let (outbound, sent) = mpsc::unbounded_channel();
    let (frames, inbound) = mpsc::unbounded_channel();
    (Transport { outbound, inbound }, Peer { sent, frames })
}

/// Hands out scripted transports; fails once the script runs dry.
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    script: Mutex<VecDeque<Transport>>,
    calls: AtomicUsize,
}

impl ScriptedConnector {
    pub fn push(&self) -> Peer {
        let (transport, peer) = transport_pair();
        self.script.lock().unwrap().push_back(transport);
        peer
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<Transport, ConnectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ConnectionError::Connect {
                url: url.to_string(),
                reason: "refused".into(),
            })
    }
}

pub(crate) fn test_config(max: u32) -> ConnectionConfig {
    ConnectionConfig::new("ws://test/ws").with_backoff(Duration::from_millis(100), max)
}

pub(crate) async fn next_event(rx: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// A manager that is already connected to a fresh peer.
pub(crate) async fn connected() -> (ConnectionManager, Peer, broadcast::Receiver<ConnectionEvent>) {
    let connector = Arc::new(ScriptedConnector::default());
    let peer = connector.push();
    let manager = ConnectionManager::new(test_config(3), connector);
    let mut events = manager.subscribe();
    manager.connect();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connection(true));
    (manager, peer, events)
}
