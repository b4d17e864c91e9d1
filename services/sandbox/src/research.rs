//! The research queue: proposals wait for a human decision before they run.

use advisory_core::{AdvisorSuggestion, ResearchRequest, ResearchStatus, api::ExecutionReport};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

/// Price of a thousand research tokens, in dollars.
pub const COST_PER_1K_TOKENS: f64 = 0.008;
/// Rough tokens generated per word of query.
pub const TOKENS_PER_WORD: usize = 3;

/// Runs an approved research query.
#[async_trait]
pub trait Researcher: Send + Sync {
    async fn research(&self, refined_query: &str) -> Result<Value>;
}

/// Returns a fixed brief without calling anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct CannedResearcher;

#[async_trait]
impl Researcher for CannedResearcher {
    async fn research(&self, refined_query: &str) -> Result<Value> {
        let topic = refined_query.lines().next().unwrap_or_default();
        Ok(json!({
            "research": format!("Research brief: {topic}\n\nNo external sources were consulted."),
            "model_used": "sandbox",
            "timestamp": crate::timestamp(),
        }))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Research request not found or not in proposed state")]
    NotProposed(String),
    #[error("Request {0} not found")]
    UnknownRequest(String),
    #[error("Request {id} is not approved. Status: {status}")]
    NotApproved { id: String, status: ResearchStatus },
}

/// Folds advisor suggestions into the query that will actually be researched.
pub fn refine_query(query: &str, suggestions: &[AdvisorSuggestion]) -> String {
    let mut refined = format!("{query}\n\nSpecific areas to investigate based on advisor input:\n");
    for s in suggestions {
        refined.push_str(&format!("- {}\n", s.suggestion));
    }
    refined
}

pub fn estimate_cost(refined_query: &str) -> f64 {
    let tokens = refined_query.split_whitespace().count() * TOKENS_PER_WORD;
    tokens as f64 / 1000.0 * COST_PER_1K_TOKENS
}

/// Requests in proposal order.
#[derive(Debug, Default)]
pub struct ResearchQueue {
    requests: Vec<ResearchRequest>,
}

impl ResearchQueue {
    pub fn get(&self, id: &str) -> Option<&ResearchRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut ResearchRequest> {
        self.requests.iter_mut().find(|r| r.id == id)
    }

    pub fn propose(
        &mut self,
        query: &str,
        context: &str,
        suggestions: Vec<AdvisorSuggestion>,
    ) -> &ResearchRequest {
        let refined = refine_query(query, &suggestions);
        let request = ResearchRequest {
            id: Uuid::new_v4().to_string(),
            query: query.to_string(),
            original_context: Some(context.to_string()),
            advisor_suggestions: suggestions,
            cost_estimate: Some(estimate_cost(&refined)),
            refined_query: Some(refined),
            status: ResearchStatus::Proposed,
            created_at: Utc::now(),
            approved_at: None,
            completed_at: None,
            results: None,
        };
        info!(id = %request.id, cost = ?request.cost_estimate, "Research proposed");
        self.requests.push(request);
        &self.requests[self.requests.len() - 1]
    }

    /// Records a human decision on a proposed request.
    pub fn decide(&mut self, id: &str, decision: ResearchStatus) -> Result<(), QueueError> {
        let request = self
            .get_mut(id)
            .ok_or_else(|| QueueError::NotProposed(id.to_string()))?;
        if !request.status.is_pending() {
            return Err(QueueError::NotProposed(id.to_string()));
        }
        request
            .transition(decision, Utc::now())
            .map_err(|_| QueueError::NotProposed(id.to_string()))?;
        info!(%id, status = %decision, "Research decided");
        Ok(())
    }

    /// Moves an approved request to in progress and hands back what to research.
    pub fn begin(&mut self, id: &str) -> Result<String, QueueError> {
        let request = self
            .get_mut(id)
            .ok_or_else(|| QueueError::UnknownRequest(id.to_string()))?;
        request
            .transition(ResearchStatus::InProgress, Utc::now())
            .map_err(|e| QueueError::NotApproved {
                id: e.id,
                status: e.from,
            })?;
        Ok(request
            .refined_query
            .clone()
            .unwrap_or_else(|| request.query.clone()))
    }

    /// Records the outcome of a run started with [`ResearchQueue::begin`].
    pub fn finish(&mut self, id: &str, outcome: Result<Value>) -> Result<ExecutionReport, QueueError> {
        let request = self
            .get_mut(id)
            .ok_or_else(|| QueueError::UnknownRequest(id.to_string()))?;
        let (status, results, error) = match outcome {
            Ok(results) => (ResearchStatus::Completed, Some(results), None),
            Err(e) => {
                warn!(%id, error = %e, "Research run failed");
                (ResearchStatus::Failed, None, Some(e.to_string()))
            }
        };
        request
            .transition(status, Utc::now())
            .map_err(|e| QueueError::NotApproved {
                id: e.id,
                status: e.from,
            })?;
        request.results = match (&results, &error) {
            (Some(results), _) => Some(results.clone()),
            (None, Some(error)) => Some(json!({ "error": error })),
            _ => None,
        };
        let execution_time = match (request.approved_at, request.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        };
        Ok(ExecutionReport {
            status: if error.is_none() { "success" } else { "failed" }.to_string(),
            request_id: id.to_string(),
            results,
            error,
            execution_time,
        })
    }

    /// Requests awaiting a decision.
    pub fn pending(&self) -> Vec<ResearchRequest> {
        self.requests
            .iter()
            .filter(|r| r.status.is_pending())
            .cloned()
            .collect()
    }

    /// Requests that are done one way or another.
    pub fn completed(&self) -> Vec<ResearchRequest> {
        self.requests
            .iter()
            .filter(|r| r.status.is_finished())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn suggestion(advisor: &str, text: &str) -> AdvisorSuggestion {
        AdvisorSuggestion {
            advisor: advisor.into(),
            suggestion: text.into(),
        }
    }

    #[test]
    fn refined_query_lists_suggestions() {
        let refined = refine_query(
            "sock market size",
            &[suggestion("mark", "margins"), suggestion("seth", "niche buyers")],
        );
        assert_eq!(
            refined,
            "sock market size\n\nSpecific areas to investigate based on advisor input:\n- margins\n- niche buyers\n"
        );
    }

    #[test]
    fn cost_is_three_tokens_per_word() {
        // 10 words -> 30 tokens -> 0.03 * 0.008
        let cost = estimate_cost("one two three four five six seven eight nine ten");
        assert!((cost - 0.00024).abs() < 1e-12);
    }

    #[test]
    fn lifecycle_to_completed() {
        let mut queue = ResearchQueue::default();
        let id = queue.propose("q", "ctx", vec![]).id.clone();
        assert_eq!(queue.pending().len(), 1);

        queue.decide(&id, ResearchStatus::Approved).unwrap();
        assert!(queue.pending().is_empty());
        assert!(queue.completed().is_empty());

        let refined = queue.begin(&id).unwrap();
        assert!(refined.starts_with("q\n\n"));
        assert_eq!(queue.get(&id).unwrap().status, ResearchStatus::InProgress);

        let report = queue.finish(&id, Ok(json!({"research": "done"}))).unwrap();
        assert_eq!(report.status, "success");
        assert!(report.execution_time.unwrap() >= 0.0);
        let done = &queue.completed()[0];
        assert_eq!(done.status, ResearchStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn failed_run_is_recorded() {
        let mut queue = ResearchQueue::default();
        let id = queue.propose("q", "", vec![]).id.clone();
        queue.decide(&id, ResearchStatus::Approved).unwrap();
        queue.begin(&id).unwrap();
        let report = queue.finish(&id, Err(anyhow!("rate limited"))).unwrap();
        assert_eq!(report.status, "failed");
        assert_eq!(report.error.as_deref(), Some("rate limited"));
        assert_eq!(queue.get(&id).unwrap().results, Some(json!({"error": "rate limited"})));
    }

    #[test]
    fn decisions_only_apply_to_proposed_requests() {
        let mut queue = ResearchQueue::default();
        let id = queue.propose("q", "", vec![]).id.clone();
        queue.decide(&id, ResearchStatus::Denied).unwrap();
        assert_eq!(
            queue.decide(&id, ResearchStatus::Approved),
            Err(QueueError::NotProposed(id.clone()))
        );
        assert_eq!(queue.completed()[0].status, ResearchStatus::Denied);
        assert!(queue.decide("missing", ResearchStatus::Approved).is_err());
    }

    #[test]
    fn only_approved_requests_run() {
        let mut queue = ResearchQueue::default();
        let id = queue.propose("q", "", vec![]).id.clone();
        assert_eq!(
            queue.begin(&id),
            Err(QueueError::NotApproved {
                id: id.clone(),
                status: ResearchStatus::Proposed
            })
        );
        assert_eq!(
            queue.begin("nope"),
            Err(QueueError::UnknownRequest("nope".into()))
        );
    }
}
