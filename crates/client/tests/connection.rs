//! The connection manager over a real WebSocket to the sandbox.

use advisory_client::{ConnectionConfig, ConnectionEvent, ConnectionManager, WsConnector};
use advisory_core::Sender;
use advisory_sandbox::{router::create_router, state::AppState};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::broadcast};

async fn sandbox() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(Arc::new(AppState::default()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn next(rx: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .unwrap()
}

#[tokio::test]
async fn session_round_trip_and_clean_close() {
    let url = sandbox().await;
    let manager = ConnectionManager::new(
        ConnectionConfig::new(url).with_backoff(Duration::from_millis(50), 3),
        Arc::new(WsConnector),
    );
    let mut events = manager.subscribe();
    assert!(!manager.send_message("too early", None, vec![]));
    assert!(matches!(next(&mut events).await, ConnectionEvent::Error { terminal: false, .. }));

    manager.connect();
    assert_eq!(next(&mut events).await, ConnectionEvent::Connection(true));
    assert!(manager.is_connected());

    assert!(manager.start_session(vec!["alex".into(), "mark".into()]));
    match next(&mut events).await {
        ConnectionEvent::AdvisorUpdate(advisors) => {
            let ids: Vec<_> = advisors.iter().map(|a| a.id.as_str()).collect();
            assert_eq!(ids, ["alex", "mark"]);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert!(manager.send_message("How do I price my offer?", None, vec![]));
    for expected in ["Alex Hormozi", "Mark Cuban"] {
        match next(&mut events).await {
            ConnectionEvent::Message(msg) => {
                assert_eq!(msg.sender, Sender::Advisor);
                assert_eq!(msg.advisor_name.as_deref(), Some(expected));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    assert!(manager.add_advisor("nobody"));
    assert_eq!(
        next(&mut events).await,
        ConnectionEvent::Error {
            message: "Advisor 'nobody' not found".into(),
            terminal: false
        }
    );

    // The server closes normally after end_session; no reconnect follows.
    assert!(manager.end_session());
    assert_eq!(next(&mut events).await, ConnectionEvent::Connection(false));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!manager.is_connected());
    assert_eq!(manager.reconnect_attempts(), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn unreachable_server_gives_up_once() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = ConnectionManager::new(
        ConnectionConfig::new(format!("ws://{addr}/ws")).with_backoff(Duration::from_millis(10), 2),
        Arc::new(WsConnector),
    );
    let mut events = manager.subscribe();
    manager.connect();

    let mut terminal = 0;
    loop {
        match next(&mut events).await {
            ConnectionEvent::Error { terminal: true, message } => {
                assert!(message.contains("2 reconnect attempts"), "{message}");
                terminal += 1;
                break;
            }
            ConnectionEvent::Error { terminal: false, .. } => continue,
            other => panic!("unexpected {other:?}"),
        }
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(terminal, 1);
    assert!(events.try_recv().is_err());
    assert!(!manager.is_connecting());
}
