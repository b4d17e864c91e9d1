//! Axum handlers for the advisory REST API.
//!
//! Each handler carries a `utoipa` path annotation so the OpenAPI document
//! stays in step with the routes.

use advisory_core::{
    Advisor, AdvisorPatch, ResearchStatus,
    api::{
        ActionReceipt, AdvisorList, AdvisorSummaryList, ChatRequest, ChatResponse, ErrorBody,
        ExecutionReport, Health, PanelEntry, PanelRequest, PanelResponse, PendingResearch,
        ProposalReceipt, ProposeResearch, ResearchAction, StatusMessage,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    advisors::RosterError,
    research::QueueError,
    state::AppState,
    timestamp,
};

/// How many earlier exchanges reach the responder.
pub const CONTEXT_WINDOW: usize = 3;

const REQUIRED_ADVISOR_FIELDS: [&str; 4] = ["id", "name", "description", "personality"];

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServerError(anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::BadRequest(detail) | ApiError::NotFound(detail) | ApiError::Conflict(detail) => {
                detail
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                // The outermost context is the client-facing message.
                err.to_string()
            }
        };
        let body = ErrorBody {
            detail,
            status_code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn roster_error(err: RosterError) -> ApiError {
    match err {
        RosterError::NotFound(_) => ApiError::NotFound(err.to_string()),
        RosterError::Duplicate(_) => ApiError::Conflict(err.to_string()),
    }
}

fn queue_error(err: QueueError) -> ApiError {
    match err {
        QueueError::NotProposed(_) => ApiError::NotFound(err.to_string()),
        QueueError::UnknownRequest(_) | QueueError::NotApproved { .. } => {
            ApiError::BadRequest(err.to_string())
        }
    }
}

/// Report service liveness.
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up", body = Health))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    let advisors = state.advisors.read().await.len();
    Json(Health {
        status: "healthy".to_string(),
        advisors,
    })
}

/// List the advisors a user can talk to.
#[utoipa::path(
    get,
    path = "/api/advisors",
    responses((status = 200, description = "Advisor summaries", body = AdvisorSummaryList))
)]
pub async fn list_advisors(State(state): State<Arc<AppState>>) -> Json<AdvisorSummaryList> {
    let advisors = state.advisors.read().await.summaries();
    Json(AdvisorSummaryList { advisors })
}

/// Ask one advisor a question.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The advisor's reply", body = ChatResponse),
        (status = 404, description = "Unknown advisor", body = ErrorBody),
        (status = 500, description = "The reply could not be generated", body = ErrorBody)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let advisor = state
        .advisors
        .read()
        .await
        .get(&payload.advisor)
        .map_err(roster_error)?
        .clone();

    let recent = &payload.context[payload.context.len().saturating_sub(CONTEXT_WINDOW)..];
    let response = state
        .responder
        .reply(&advisor, &payload.message, recent, payload.document.as_deref())
        .await
        .map_err(|e| ApiError::InternalServerError(e.context("Failed to generate response")))?;
    info!(advisor = %advisor.id, context = recent.len(), "Chat answered");

    Ok(Json(ChatResponse {
        response,
        advisor: Some(advisor.id),
        timestamp: Some(timestamp()),
    }))
}

/// Put a topic to several advisors at once.
///
/// Every requested advisor must exist. An advisor whose reply fails is left
/// out of the response rather than failing the whole panel.
#[utoipa::path(
    post,
    path = "/api/panel",
    request_body = PanelRequest,
    responses(
        (status = 200, description = "One entry per advisor, in request order", body = PanelResponse),
        (status = 404, description = "Unknown advisor", body = ErrorBody)
    )
)]
pub async fn panel(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PanelRequest>,
) -> Result<Json<PanelResponse>, ApiError> {
    let panelists = {
        let roster = state.advisors.read().await;
        let ids = if payload.advisors.is_empty() {
            roster.ids()
        } else {
            payload.advisors.clone()
        };
        ids.iter()
            .map(|id| roster.get(id).cloned())
            .collect::<Result<Vec<Advisor>, _>>()
            .map_err(roster_error)?
    };

    let mut responses = Vec::with_capacity(panelists.len());
    for advisor in panelists {
        match state
            .responder
            .reply(&advisor, &payload.topic, &[], payload.document.as_deref())
            .await
        {
            Ok(response) => responses.push(PanelEntry {
                advisor: Some(advisor.id),
                name: advisor.name,
                response,
                round: Some(1),
            }),
            Err(e) => warn!(advisor = %advisor.id, error = %e, "Panelist failed to answer"),
        }
    }
    info!(topic = %payload.topic, answered = responses.len(), "Panel answered");

    Ok(Json(PanelResponse {
        topic: Some(payload.topic),
        responses,
        timestamp: Some(timestamp()),
    }))
}

/// List every advisor with its personality prompt.
#[utoipa::path(
    get,
    path = "/api/admin/advisors",
    responses((status = 200, description = "Full advisor profiles", body = AdvisorList))
)]
pub async fn admin_list_advisors(State(state): State<Arc<AppState>>) -> Json<AdvisorList> {
    let advisors = state.advisors.read().await.list().to_vec();
    Json(AdvisorList { advisors })
}

/// Fetch one advisor profile.
#[utoipa::path(
    get,
    path = "/api/admin/advisors/{id}",
    params(("id" = String, Path, description = "Advisor id")),
    responses(
        (status = 200, description = "The advisor", body = Advisor),
        (status = 404, description = "Unknown advisor", body = ErrorBody)
    )
)]
pub async fn admin_get_advisor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Advisor>, ApiError> {
    let roster = state.advisors.read().await;
    let advisor = roster.get(&id).map_err(roster_error)?;
    Ok(Json(advisor.clone()))
}

/// Add an advisor to the roster.
#[utoipa::path(
    post,
    path = "/api/admin/advisors",
    request_body = Advisor,
    responses(
        (status = 200, description = "Advisor created", body = StatusMessage),
        (status = 400, description = "A required field is missing", body = ErrorBody),
        (status = 409, description = "The id is taken", body = ErrorBody)
    )
)]
pub async fn admin_create_advisor(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<StatusMessage>, ApiError> {
    if let Some(field) = REQUIRED_ADVISOR_FIELDS
        .iter()
        .find(|field| body.get(**field).is_none())
    {
        return Err(ApiError::BadRequest(format!(
            "Missing required field: {field}"
        )));
    }
    let advisor: Advisor =
        serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let id = advisor.id.clone();
    state
        .advisors
        .write()
        .await
        .create(advisor)
        .map_err(roster_error)?;
    info!(%id, "Advisor created");
    Ok(Json(StatusMessage {
        message: format!("Advisor '{id}' created successfully"),
    }))
}

/// Change some fields of an advisor.
#[utoipa::path(
    put,
    path = "/api/admin/advisors/{id}",
    params(("id" = String, Path, description = "Advisor id")),
    request_body = AdvisorPatch,
    responses(
        (status = 200, description = "Advisor updated", body = StatusMessage),
        (status = 404, description = "Unknown advisor", body = ErrorBody)
    )
)]
pub async fn admin_update_advisor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<AdvisorPatch>,
) -> Result<Json<StatusMessage>, ApiError> {
    state
        .advisors
        .write()
        .await
        .update(&id, patch)
        .map_err(roster_error)?;
    info!(%id, "Advisor updated");
    Ok(Json(StatusMessage {
        message: format!("Advisor '{id}' updated successfully"),
    }))
}

/// Remove an advisor from the roster.
#[utoipa::path(
    delete,
    path = "/api/admin/advisors/{id}",
    params(("id" = String, Path, description = "Advisor id")),
    responses(
        (status = 200, description = "Advisor deleted", body = StatusMessage),
        (status = 404, description = "Unknown advisor", body = ErrorBody)
    )
)]
pub async fn admin_delete_advisor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusMessage>, ApiError> {
    state
        .advisors
        .write()
        .await
        .delete(&id)
        .map_err(roster_error)?;
    info!(%id, "Advisor deleted");
    Ok(Json(StatusMessage {
        message: format!("Advisor '{id}' deleted successfully"),
    }))
}

/// Requests awaiting approval, and those already finished.
#[utoipa::path(
    get,
    path = "/api/research/pending",
    responses((status = 200, description = "The research queue", body = PendingResearch))
)]
pub async fn pending_research(State(state): State<Arc<AppState>>) -> Json<PendingResearch> {
    let queue = state.research.lock().await;
    Json(PendingResearch {
        pending: queue.pending(),
        completed: queue.completed(),
    })
}

/// Queue a research request for human approval.
#[utoipa::path(
    post,
    path = "/api/research/propose",
    request_body = ProposeResearch,
    responses((status = 200, description = "The request was queued", body = ProposalReceipt))
)]
pub async fn propose_research(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProposeResearch>,
) -> Json<ProposalReceipt> {
    let mut queue = state.research.lock().await;
    let request = queue.propose(
        &payload.query,
        &payload.context,
        payload.advisor_suggestions,
    );
    Json(ProposalReceipt {
        request_id: request.id.clone(),
        status: request.status,
        refined_query: request.refined_query.clone(),
        cost_estimate: request.cost_estimate,
    })
}

async fn decide(
    state: &AppState,
    request_id: String,
    decision: ResearchStatus,
) -> Result<Json<ActionReceipt>, ApiError> {
    state
        .research
        .lock()
        .await
        .decide(&request_id, decision)
        .map_err(queue_error)?;
    Ok(Json(ActionReceipt {
        status: decision.to_string(),
        request_id,
    }))
}

/// Approve a proposed request.
#[utoipa::path(
    post,
    path = "/api/research/approve",
    request_body = ResearchAction,
    responses(
        (status = 200, description = "Approved", body = ActionReceipt),
        (status = 404, description = "Not found or not proposed", body = ErrorBody)
    )
)]
pub async fn approve_research(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResearchAction>,
) -> Result<Json<ActionReceipt>, ApiError> {
    decide(&state, payload.request_id, ResearchStatus::Approved).await
}

/// Deny a proposed request.
#[utoipa::path(
    post,
    path = "/api/research/deny",
    request_body = ResearchAction,
    responses(
        (status = 200, description = "Denied", body = ActionReceipt),
        (status = 404, description = "Not found or not proposed", body = ErrorBody)
    )
)]
pub async fn deny_research(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResearchAction>,
) -> Result<Json<ActionReceipt>, ApiError> {
    decide(&state, payload.request_id, ResearchStatus::Denied).await
}

/// Run an approved request.
///
/// A failed run is still a 200: the report says `failed` and the request
/// moves to the completed list with the error as its result.
#[utoipa::path(
    post,
    path = "/api/research/execute",
    request_body = ResearchAction,
    responses(
        (status = 200, description = "Run report", body = ExecutionReport),
        (status = 400, description = "Unknown or not approved", body = ErrorBody)
    )
)]
pub async fn execute_research(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResearchAction>,
) -> Result<Json<ExecutionReport>, ApiError> {
    let id = payload.request_id;
    let refined = state.research.lock().await.begin(&id).map_err(queue_error)?;
    info!(%id, "Research started");

    // The queue stays unlocked while the researcher works.
    let outcome = state.researcher.research(&refined).await;
    let report = state
        .research
        .lock()
        .await
        .finish(&id, outcome)
        .map_err(queue_error)?;
    info!(%id, status = %report.status, "Research finished");
    Ok(Json(report))
}
