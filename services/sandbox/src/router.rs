//! Axum Router Configuration
//!
//! Wires the REST API, the WebSocket endpoint and the OpenAPI documentation
//! into one router.

use crate::{handlers, state::AppState, ws::ws_handler};
use advisory_core::{
    Advisor, AdvisorPatch, AdvisorSuggestion, AdvisorSummary, ResearchRequest, ResearchStatus,
    api::{
        ActionReceipt, AdvisorList, AdvisorSummaryList, ChatRequest, ChatResponse, ContextTurn,
        ErrorBody, ExecutionReport, Health, PanelEntry, PanelRequest, PanelResponse,
        PendingResearch, ProposalReceipt, ProposeResearch, ResearchAction, StatusMessage,
    },
};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::list_advisors,
        handlers::chat,
        handlers::panel,
        handlers::admin_list_advisors,
        handlers::admin_get_advisor,
        handlers::admin_create_advisor,
        handlers::admin_update_advisor,
        handlers::admin_delete_advisor,
        handlers::pending_research,
        handlers::propose_research,
        handlers::approve_research,
        handlers::deny_research,
        handlers::execute_research,
    ),
    components(
        schemas(
            Advisor, AdvisorPatch, AdvisorSummary, AdvisorList, AdvisorSummaryList,
            ChatRequest, ChatResponse, ContextTurn, PanelRequest, PanelResponse, PanelEntry,
            ResearchRequest, ResearchStatus, AdvisorSuggestion, PendingResearch, ProposeResearch,
            ProposalReceipt, ResearchAction, ActionReceipt, ExecutionReport,
            StatusMessage, Health, ErrorBody
        )
    ),
    tags(
        (name = "Advisory API", description = "Chat, panels, advisor admin and the research queue")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/advisors", get(handlers::list_advisors))
        .route("/api/chat", post(handlers::chat))
        .route("/api/panel", post(handlers::panel))
        .route(
            "/api/admin/advisors",
            get(handlers::admin_list_advisors).post(handlers::admin_create_advisor),
        )
        .route(
            "/api/admin/advisors/{id}",
            get(handlers::admin_get_advisor)
                .put(handlers::admin_update_advisor)
                .delete(handlers::admin_delete_advisor),
        )
        .route("/api/research/pending", get(handlers::pending_research))
        .route("/api/research/propose", post(handlers::propose_research))
        .route("/api/research/approve", post(handlers::approve_research))
        .route("/api/research/deny", post(handlers::deny_research))
        .route("/api/research/execute", post(handlers::execute_research))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
