use advisory_client::{ApiClient, ChatSession, session::APOLOGY};
use advisory_core::{Advisor, Sender, VoicePayload, api::ContextTurn};
use advisory_sandbox::{responder::Responder, router::create_router, state::AppState};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Answers every question the same way and remembers what it was asked.
#[derive(Default)]
struct Scripted {
    fail: bool,
    contexts: Mutex<Vec<usize>>,
}

#[async_trait]
impl Responder for Scripted {
    async fn reply(
        &self,
        advisor: &Advisor,
        _message: &str,
        context: &[ContextTurn],
        _document: Option<&str>,
    ) -> Result<String> {
        if self.fail {
            return Err(anyhow!("model unavailable"));
        }
        self.contexts.lock().unwrap().push(context.len());
        Ok(match advisor.id.as_str() {
            "alex" => "Charge more.".to_string(),
            "mark" => "Know your margins.".to_string(),
            _ => "Keep going.".to_string(),
        })
    }

    async fn transcribe(&self, _clip: &VoicePayload) -> Result<String> {
        Ok(String::new())
    }
}

async fn session_with(responder: Arc<Scripted>) -> ChatSession {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(Arc::new(AppState::with_responder(responder)));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let base = format!("http://{addr}").parse().unwrap();
    let mut session = ChatSession::new(Arc::new(ApiClient::new(base)));
    session.load_roster().await.unwrap();
    session
}

#[tokio::test]
async fn asking_alex_about_pricing() {
    let mut session = session_with(Arc::default()).await;
    assert!(session.select_advisor("alex"));

    let reply = session.send_chat("How do I price my offer?").await.unwrap();
    assert_eq!(reply.content, "Charge more.");

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender, Sender::User);
    assert_eq!(messages[0].content, "How do I price my offer?");
    assert_eq!(messages[1].sender, Sender::Advisor);
    assert_eq!(messages[1].advisor_name.as_deref(), Some("Alex Hormozi"));
    assert!(!messages[1].is_processing);
}

#[tokio::test]
async fn context_is_capped_at_three_exchanges() {
    let responder = Arc::new(Scripted::default());
    let mut session = session_with(responder.clone()).await;
    session.select_advisor("alex");
    for i in 0..5 {
        session.send_chat(&format!("question {i}")).await.unwrap();
    }
    assert_eq!(*responder.contexts.lock().unwrap(), [0, 1, 2, 3, 3]);
}

#[tokio::test]
async fn panel_keeps_response_order() {
    let mut session = session_with(Arc::default()).await;
    let added = session
        .send_panel("pricing", &["alex".to_string(), "mark".to_string()])
        .await
        .unwrap();
    let replies: Vec<_> = added
        .iter()
        .filter(|m| m.sender == Sender::Advisor)
        .map(|m| (m.advisor_id.clone().unwrap(), m.content.clone()))
        .collect();
    assert_eq!(
        replies,
        [
            ("alex".to_string(), "Charge more.".to_string()),
            ("mark".to_string(), "Know your margins.".to_string())
        ]
    );
    assert_eq!(session.messages().len(), 3);
}

#[tokio::test]
async fn server_failure_becomes_an_apology() {
    let mut session = session_with(Arc::new(Scripted {
        fail: true,
        ..Default::default()
    }))
    .await;
    session.select_advisor("mark");
    let reply = session.send_chat("Anyone there?").await.unwrap();
    assert_eq!(reply.content, APOLOGY);
    assert_eq!(reply.advisor_name.as_deref(), Some("Mark Cuban"));
}

#[tokio::test]
async fn unknown_panelist_becomes_an_apology() {
    let mut session = session_with(Arc::default()).await;
    let added = session
        .send_panel("pricing", &["alex".to_string(), "ghost".to_string()])
        .await
        .unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].content, APOLOGY);
    assert_eq!(session.messages().len(), 2);
}
