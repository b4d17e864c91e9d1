//! Request and response bodies of the advisory HTTP API.

use crate::{
    advisor::{Advisor, AdvisorSummary},
    research::{AdvisorSuggestion, ResearchRequest, ResearchStatus},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One earlier exchange, sent along with a chat message for context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContextTurn {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub advisor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    #[schema(example = "How do I price my offer?")]
    pub message: String,
    #[schema(example = "alex")]
    pub advisor: String,
    #[serde(default)]
    pub context: Vec<ContextTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PanelRequest {
    #[schema(example = "pricing")]
    pub topic: String,
    /// Advisor ids. Empty means every advisor.
    #[serde(default)]
    pub advisors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PanelEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor: Option<String>,
    pub name: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PanelResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub responses: Vec<PanelEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdvisorList {
    pub advisors: Vec<Advisor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdvisorSummaryList {
    pub advisors: Vec<AdvisorSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PendingResearch {
    #[serde(default)]
    pub pending: Vec<ResearchRequest>,
    /// Requests that reached a terminal state (completed, failed or denied).
    #[serde(default)]
    pub completed: Vec<ResearchRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProposeResearch {
    pub query: String,
    pub context: String,
    #[serde(default)]
    pub advisor_suggestions: Vec<AdvisorSuggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProposalReceipt {
    pub request_id: String,
    pub status: ResearchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResearchAction {
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionReceipt {
    pub status: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecutionReport {
    /// `success` or `failed`.
    pub status: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub results: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Seconds between approval and completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusMessage {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub advisors: usize,
}

/// Error body returned by every endpoint on a non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
    pub status_code: u16,
}
