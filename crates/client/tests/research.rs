//! The research workflow against a recording mock of the research endpoints.

use advisory_client::{ApiClient, ResearchView, ResearchWorkflow};
use advisory_core::{AdvisorSuggestion, ResearchStatus};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::net::TcpListener;

#[derive(Default)]
struct Mock {
    calls: Vec<&'static str>,
    status: Option<&'static str>,
}

type Shared = Arc<Mutex<Mock>>;

fn entry(status: &str) -> Value {
    json!({
        "id": "r1",
        "query": "sock subscription market",
        "status": status,
        "cost_estimate": 0.002,
        "created_at": "2025-09-16T10:00:00.000000"
    })
}

async fn pending(State(mock): State<Shared>) -> Json<Value> {
    let mut mock = mock.lock().unwrap();
    mock.calls.push("pending");
    Json(match mock.status {
        None => json!({"pending": [], "completed": []}),
        Some("proposed") => json!({"pending": [entry("proposed")], "completed": []}),
        Some(status) => json!({"pending": [], "completed": [entry(status)]}),
    })
}

async fn propose(State(mock): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut mock = mock.lock().unwrap();
    assert_eq!(body["advisor_suggestions"][0]["advisor"], "mark");
    mock.calls.push("propose");
    mock.status = Some("proposed");
    Json(json!({"request_id": "r1", "status": "proposed", "cost_estimate": 0.002}))
}

async fn approve(State(mock): State<Shared>) -> Json<Value> {
    let mut mock = mock.lock().unwrap();
    mock.calls.push("approve");
    mock.status = Some("approved");
    Json(json!({"status": "approved", "request_id": "r1"}))
}

async fn execute(State(mock): State<Shared>) -> Json<Value> {
    let mut mock = mock.lock().unwrap();
    mock.calls.push("execute");
    mock.status = Some("completed");
    Json(json!({"status": "success", "request_id": "r1", "results": {"research": "brief"}}))
}

async fn deny(State(mock): State<Shared>) -> (StatusCode, Json<Value>) {
    mock.lock().unwrap().calls.push("deny");
    (
        StatusCode::NOT_FOUND,
        Json(json!({"detail": "Research request not found or not in proposed state", "status_code": 404})),
    )
}

async fn workflow() -> (Arc<ResearchWorkflow>, Shared) {
    let mock = Shared::default();
    let app = Router::new()
        .route("/api/research/pending", get(pending))
        .route("/api/research/propose", post(propose))
        .route("/api/research/approve", post(approve))
        .route("/api/research/execute", post(execute))
        .route("/api/research/deny", post(deny))
        .with_state(mock.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let base = format!("http://{addr}").parse().unwrap();
    let api = Arc::new(ApiClient::new(base));
    (Arc::new(ResearchWorkflow::new(api)), mock)
}

#[tokio::test]
async fn propose_then_approve_runs_before_the_next_poll() {
    let (workflow, mock) = workflow().await;

    let receipt = workflow
        .propose(
            "sock subscription market",
            "panel on pricing",
            &[AdvisorSuggestion {
                advisor: "mark".into(),
                suggestion: "margins".into(),
            }],
        )
        .await
        .unwrap();
    assert_eq!(receipt.cost_estimate, Some(0.002));
    assert_eq!(workflow.active_view(), ResearchView::Pending);
    let pending = workflow.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, ResearchStatus::Proposed);
    assert_eq!(pending[0].cost_estimate, Some(0.002));

    // The first tick fires at once; the next one is an hour away.
    let poll = workflow.spawn_polling(Duration::from_secs(3600));
    for _ in 0..100 {
        if mock.lock().unwrap().calls.len() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let report = workflow.approve("r1").await.unwrap();
    assert_eq!(report.status, "success");
    assert_eq!(
        mock.lock().unwrap().calls,
        ["propose", "pending", "pending", "approve", "execute", "pending"]
    );
    assert!(workflow.pending().is_empty());
    assert_eq!(workflow.completed()[0].status, ResearchStatus::Completed);
    poll.close();
}

#[tokio::test]
async fn failed_decision_still_refreshes() {
    let (workflow, mock) = workflow().await;
    let err = workflow.deny("r1").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(mock.lock().unwrap().calls, ["deny", "pending"]);
}
