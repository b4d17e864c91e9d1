//! HTTP client for the advisory API.
//!
//! Every call is a single request/response. Non-2xx statuses surface as
//! [`ApiError::Status`]; nothing is retried here, the caller decides.

use advisory_core::{
    Advisor, AdvisorPatch, AdvisorSuggestion, AdvisorSummary,
    api::{
        ActionReceipt, AdvisorList, AdvisorSummaryList, ChatRequest, ChatResponse, ErrorBody,
        ExecutionReport, Health, PanelRequest, PanelResponse, PendingResearch, ProposalReceipt,
        ProposeResearch, ResearchAction, StatusMessage,
    },
};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid API url '{0}'")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {detail}")]
    Status { status: StatusCode, detail: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// A thin, cloneable client over the advisory HTTP endpoints.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base: Url) -> Self {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(http: Client, mut base: Url) -> Self {
        // `Url::join` drops the last segment unless the base ends with a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { http, base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|_| ApiError::InvalidUrl(format!("{}{}", self.base, path)))
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        debug!(%method, %url, "api request");
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = check(request.send().await?).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call::<(), T>(Method::GET, path, None).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.call(Method::POST, path, Some(body)).await
    }

    pub async fn health(&self) -> Result<Health, ApiError> {
        self.get("/api/health").await
    }

    #[instrument(skip(self, request), fields(advisor = %request.advisor))]
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        self.post("/api/chat", request).await
    }

    #[instrument(skip(self, request), fields(topic = %request.topic))]
    pub async fn panel(&self, request: &PanelRequest) -> Result<PanelResponse, ApiError> {
        self.post("/api/panel", request).await
    }

    /// Public advisor roster, without personality prompts.
    pub async fn list_advisors(&self) -> Result<Vec<AdvisorSummary>, ApiError> {
        let list: AdvisorSummaryList = self.get("/api/advisors").await?;
        Ok(list.advisors)
    }

    pub async fn admin_list_advisors(&self) -> Result<Vec<Advisor>, ApiError> {
        let list: AdvisorList = self.get("/api/admin/advisors").await?;
        Ok(list.advisors)
    }

    pub async fn admin_get_advisor(&self, id: &str) -> Result<Advisor, ApiError> {
        self.get(&format!("/api/admin/advisors/{id}")).await
    }

    pub async fn admin_create_advisor(&self, advisor: &Advisor) -> Result<StatusMessage, ApiError> {
        self.post("/api/admin/advisors", advisor).await
    }

    pub async fn admin_update_advisor(
        &self,
        id: &str,
        patch: &AdvisorPatch,
    ) -> Result<StatusMessage, ApiError> {
        self.call(Method::PUT, &format!("/api/admin/advisors/{id}"), Some(patch))
            .await
    }

    pub async fn admin_delete_advisor(&self, id: &str) -> Result<StatusMessage, ApiError> {
        self.call::<(), _>(Method::DELETE, &format!("/api/admin/advisors/{id}"), None)
            .await
    }

    pub async fn pending_research(&self) -> Result<PendingResearch, ApiError> {
        self.get("/api/research/pending").await
    }

    pub async fn propose_research(
        &self,
        query: &str,
        context: &str,
        advisor_suggestions: &[AdvisorSuggestion],
    ) -> Result<ProposalReceipt, ApiError> {
        let body = ProposeResearch {
            query: query.to_string(),
            context: context.to_string(),
            advisor_suggestions: advisor_suggestions.to_vec(),
        };
        self.post("/api/research/propose", &body).await
    }

    pub async fn approve_research(&self, request_id: &str) -> Result<ActionReceipt, ApiError> {
        self.post("/api/research/approve", &action(request_id)).await
    }

    pub async fn deny_research(&self, request_id: &str) -> Result<ActionReceipt, ApiError> {
        self.post("/api/research/deny", &action(request_id)).await
    }

    pub async fn execute_research(&self, request_id: &str) -> Result<ExecutionReport, ApiError> {
        self.post("/api/research/execute", &action(request_id)).await
    }
}

fn action(request_id: &str) -> ResearchAction {
    ResearchAction {
        request_id: request_id.to_string(),
    }
}

/// Turns a non-2xx response into [`ApiError::Status`], using the server's
/// `detail` when the body carries one.
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.detail)
        .unwrap_or(text);
    warn!(%status, %detail, "api call failed");
    Err(ApiError::Status { status, detail })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_under_a_prefixed_base() {
        let client = ApiClient::new(Url::parse("http://host:8000/board").unwrap());
        assert_eq!(
            client.url("/api/chat").unwrap().as_str(),
            "http://host:8000/board/api/chat"
        );
    }

    #[test]
    fn joins_paths_at_the_root() {
        let client = ApiClient::new(Url::parse("http://host:8000/").unwrap());
        assert_eq!(
            client.url("/api/research/pending").unwrap().as_str(),
            "http://host:8000/api/research/pending"
        );
    }

    #[test]
    fn status_error_display() {
        let err = ApiError::Status {
            status: StatusCode::NOT_FOUND,
            detail: "Advisor 'zed' not found".into(),
        };
        assert_eq!(err.to_string(), "server returned 404 Not Found: Advisor 'zed' not found");
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }
}
