//! Research Workflow Client.
//!
//! Keeps a local copy of the research queue, refreshed wholesale from the
//! server, and drives proposals and approval decisions. Nothing is mutated
//! optimistically: the cache only changes when a fetch succeeds.

use crate::api::{ApiClient, ApiError};
use advisory_core::{
    AdvisorSuggestion, ResearchRequest,
    api::{ActionReceipt, ExecutionReport, PendingResearch, ProposalReceipt},
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// The research endpoints the workflow depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResearchApi: Send + Sync {
    async fn pending(&self) -> Result<PendingResearch, ApiError>;
    async fn propose(
        &self,
        query: &str,
        context: &str,
        suggestions: &[AdvisorSuggestion],
    ) -> Result<ProposalReceipt, ApiError>;
    async fn approve(&self, request_id: &str) -> Result<ActionReceipt, ApiError>;
    async fn deny(&self, request_id: &str) -> Result<ActionReceipt, ApiError>;
    async fn execute(&self, request_id: &str) -> Result<ExecutionReport, ApiError>;
}

#[async_trait]
impl ResearchApi for ApiClient {
    async fn pending(&self) -> Result<PendingResearch, ApiError> {
        self.pending_research().await
    }

    async fn propose(
        &self,
        query: &str,
        context: &str,
        suggestions: &[AdvisorSuggestion],
    ) -> Result<ProposalReceipt, ApiError> {
        self.propose_research(query, context, suggestions).await
    }

    async fn approve(&self, request_id: &str) -> Result<ActionReceipt, ApiError> {
        self.approve_research(request_id).await
    }

    async fn deny(&self, request_id: &str) -> Result<ActionReceipt, ApiError> {
        self.deny_research(request_id).await
    }

    async fn execute(&self, request_id: &str) -> Result<ExecutionReport, ApiError> {
        self.execute_research(request_id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResearchView {
    #[default]
    New,
    Pending,
    Completed,
}

#[derive(Default)]
struct Cache {
    pending: Vec<ResearchRequest>,
    completed: Vec<ResearchRequest>,
    /// Last accepted copy of every request ever fetched, listed or not.
    seen: HashMap<String, ResearchRequest>,
    view: ResearchView,
}

pub struct ResearchWorkflow {
    api: Arc<dyn ResearchApi>,
    cache: Mutex<Cache>,
}

impl ResearchWorkflow {
    pub fn new(api: Arc<dyn ResearchApi>) -> Self {
        Self {
            api,
            cache: Mutex::new(Cache::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pending(&self) -> Vec<ResearchRequest> {
        self.lock().pending.clone()
    }

    pub fn completed(&self) -> Vec<ResearchRequest> {
        self.lock().completed.clone()
    }

    pub fn active_view(&self) -> ResearchView {
        self.lock().view
    }

    pub fn set_view(&self, view: ResearchView) {
        self.lock().view = view;
    }

    pub fn find(&self, id: &str) -> Option<ResearchRequest> {
        let cache = self.lock();
        cache
            .pending
            .iter()
            .chain(cache.completed.iter())
            .find(|r| r.id == id)
            .cloned()
    }

    /// Replaces both lists with the server's view of the queue.
    ///
    /// An entry whose fetched status could not have followed the last status
    /// accepted for that id (say a denied request reported as in progress) is
    /// not accepted: the last accepted copy is listed instead. This holds even
    /// when the request was missing from earlier fetches or was in flight.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let fetched = self.api.pending().await.inspect_err(|e| {
            warn!(error = %e, "Could not refresh research queue");
        })?;

        let mut guard = self.lock();
        let cache = &mut *guard;
        let mut pending = Vec::with_capacity(fetched.pending.len());
        let mut completed = Vec::with_capacity(fetched.completed.len());
        for incoming in fetched.pending.into_iter().chain(fetched.completed) {
            let regressed = cache
                .seen
                .get(&incoming.id)
                .filter(|cached| !cached.status.can_reach(incoming.status))
                .cloned();
            let entry = match regressed {
                Some(cached) => {
                    warn!(
                        id = %incoming.id,
                        cached = %cached.status,
                        fetched = %incoming.status,
                        "Ignoring impossible research status change"
                    );
                    cached
                }
                None => {
                    cache.seen.insert(incoming.id.clone(), incoming.clone());
                    incoming
                }
            };
            if entry.status.is_pending() {
                pending.push(entry);
            } else if entry.status.is_finished() {
                completed.push(entry);
            } else {
                debug!(id = %entry.id, status = %entry.status, "Research request in flight");
            }
        }
        debug!(pending = pending.len(), completed = completed.len(), "Research queue refreshed");
        cache.pending = pending;
        cache.completed = completed;
        Ok(())
    }

    /// Submits a new research request and switches to the pending list.
    #[instrument(skip(self, context, suggestions))]
    pub async fn propose(
        &self,
        query: &str,
        context: &str,
        suggestions: &[AdvisorSuggestion],
    ) -> Result<ProposalReceipt, ApiError> {
        let receipt = self
            .api
            .propose(query, context, suggestions)
            .await
            .inspect_err(|e| warn!(error = %e, "Research proposal failed"))?;
        info!(request_id = %receipt.request_id, cost = ?receipt.cost_estimate, "Research proposed");
        self.set_view(ResearchView::Pending);
        let _ = self.refresh().await;
        Ok(receipt)
    }

    /// Approves a proposed request and immediately asks the server to run it.
    /// The queue is refreshed whatever the outcome.
    #[instrument(skip(self))]
    pub async fn approve(&self, request_id: &str) -> Result<ExecutionReport, ApiError> {
        let outcome = self.approve_and_execute(request_id).await;
        if let Err(e) = &outcome {
            warn!(error = %e, "Research approval failed");
        }
        let _ = self.refresh().await;
        outcome
    }

    async fn approve_and_execute(&self, request_id: &str) -> Result<ExecutionReport, ApiError> {
        self.api.approve(request_id).await?;
        let report = self.api.execute(request_id).await?;
        info!(%request_id, status = %report.status, "Research executed");
        Ok(report)
    }

    /// Denies a proposed request. The queue is refreshed whatever the outcome.
    #[instrument(skip(self))]
    pub async fn deny(&self, request_id: &str) -> Result<ActionReceipt, ApiError> {
        let outcome = self.api.deny(request_id).await;
        match &outcome {
            Ok(_) => info!(%request_id, "Research denied"),
            Err(e) => warn!(error = %e, "Research denial failed"),
        }
        let _ = self.refresh().await;
        outcome
    }

    /// Refreshes now and then every `interval` until the handle is closed or dropped.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> PollHandle {
        let workflow = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Failures are already logged; the next tick retries.
                let _ = workflow.refresh().await;
            }
        });
        PollHandle { task }
    }
}

/// Keeps the research poll loop alive.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn close(self) {}

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
