//! Research requests and their approval lifecycle.
//!
//! A request is proposed, then a human approves or denies it. Approved
//! requests run and end up completed or failed. The graph only moves forward:
//!
//! ```text
//! proposed ──► approved ──► in_progress ──► completed
//!     │                          │
//!     └──► denied                └──► failed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Proposed,
    Approved,
    Denied,
    InProgress,
    Completed,
    Failed,
}

impl ResearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchStatus::Proposed => "proposed",
            ResearchStatus::Approved => "approved",
            ResearchStatus::Denied => "denied",
            ResearchStatus::InProgress => "in_progress",
            ResearchStatus::Completed => "completed",
            ResearchStatus::Failed => "failed",
        }
    }

    /// Whether `next` is a single legal step from `self`.
    pub fn can_transition_to(&self, next: ResearchStatus) -> bool {
        use ResearchStatus::*;
        matches!(
            (self, next),
            (Proposed, Approved)
                | (Proposed, Denied)
                | (Approved, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }

    /// Whether `target` can be reached from `self` through zero or more legal steps.
    pub fn can_reach(&self, target: ResearchStatus) -> bool {
        if *self == target {
            return true;
        }
        ResearchStatus::ALL
            .iter()
            .any(|&step| self.can_transition_to(step) && step.can_reach(target))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResearchStatus::Denied | ResearchStatus::Completed | ResearchStatus::Failed
        )
    }

    /// Awaiting a human decision.
    pub fn is_pending(&self) -> bool {
        *self == ResearchStatus::Proposed
    }

    /// Belongs on the "completed" list: finished one way or another.
    pub fn is_finished(&self) -> bool {
        self.is_terminal()
    }

    pub const ALL: [ResearchStatus; 6] = [
        ResearchStatus::Proposed,
        ResearchStatus::Approved,
        ResearchStatus::Denied,
        ResearchStatus::InProgress,
        ResearchStatus::Completed,
        ResearchStatus::Failed,
    ];
}

impl fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("research request {id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub id: String,
    pub from: ResearchStatus,
    pub to: ResearchStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdvisorSuggestion {
    pub advisor: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResearchRequest {
    pub id: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_context: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisor_suggestions: Vec<AdvisorSuggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_query: Option<String>,
    pub status: ResearchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<f64>,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        deserialize_with = "timestamp::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "timestamp::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub results: Option<serde_json::Value>,
}

impl ResearchRequest {
    /// Applies one step of the lifecycle, stamping `approved_at` or
    /// `completed_at` as appropriate.
    pub fn transition(
        &mut self,
        next: ResearchStatus,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        match next {
            ResearchStatus::Approved => self.approved_at = Some(at),
            ResearchStatus::Completed | ResearchStatus::Failed => self.completed_at = Some(at),
            _ => {}
        }
        self.status = next;
        Ok(())
    }
}

/// Timestamps arrive either as RFC 3339 or as naive ISO 8601 without an
/// offset, which is read as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, de::Error};

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    pub(super) fn required<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub(super) fn optional<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResearchStatus::*;

    fn request(status: ResearchStatus) -> ResearchRequest {
        ResearchRequest {
            id: "r1".into(),
            query: "pricing benchmarks".into(),
            original_context: None,
            advisor_suggestions: vec![],
            refined_query: None,
            status,
            cost_estimate: Some(0.002),
            created_at: Utc::now(),
            approved_at: None,
            completed_at: None,
            results: None,
        }
    }

    #[test]
    fn allowed_edges_are_exactly_the_lifecycle() {
        let allowed = [
            (Proposed, Approved),
            (Proposed, Denied),
            (Approved, InProgress),
            (InProgress, Completed),
            (InProgress, Failed),
        ];
        for from in ResearchStatus::ALL {
            for to in ResearchStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in ResearchStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(ResearchStatus::ALL.iter().all(|&to| !from.can_transition_to(to)));
        }
    }

    #[test]
    fn queue_lists_split_by_status() {
        let pending: Vec<_> = ResearchStatus::ALL.into_iter().filter(|s| s.is_pending()).collect();
        let finished: Vec<_> = ResearchStatus::ALL.into_iter().filter(|s| s.is_finished()).collect();
        assert_eq!(pending, [Proposed]);
        assert_eq!(finished, [Denied, Completed, Failed]);
    }

    #[test]
    fn denied_never_reaches_in_progress() {
        assert!(!Denied.can_reach(InProgress));
        assert!(Proposed.can_reach(Completed));
        assert!(Approved.can_reach(Failed));
        assert!(!Completed.can_reach(Proposed));
    }

    #[test]
    fn transition_stamps_timestamps() {
        let mut req = request(Proposed);
        let now = Utc::now();
        req.transition(Approved, now).unwrap();
        assert_eq!(req.approved_at, Some(now));
        req.transition(InProgress, now).unwrap();
        req.transition(Completed, now).unwrap();
        assert_eq!(req.completed_at, Some(now));
        assert_eq!(req.status, Completed);
    }

    #[test]
    fn illegal_transition_leaves_request_untouched() {
        let mut req = request(Denied);
        let err = req.transition(InProgress, Utc::now()).unwrap_err();
        assert_eq!(err.from, Denied);
        assert_eq!(err.to, InProgress);
        assert_eq!(req.status, Denied);
        assert_eq!(
            err.to_string(),
            "research request r1 cannot move from denied to in_progress"
        );
    }

    #[test]
    fn status_uses_snake_case_on_the_wire() {
        assert_eq!(serde_json::to_string(&InProgress).unwrap(), "\"in_progress\"");
        let parsed: ResearchStatus = serde_json::from_str("\"proposed\"").unwrap();
        assert_eq!(parsed, Proposed);
        assert!(serde_json::from_str::<ResearchStatus>("\"Proposed\"").is_err());
    }

    #[test]
    fn completed_list_entry_without_proposal_fields_parses() {
        let json = r#"{
            "id": "abc",
            "query": "q",
            "status": "completed",
            "created_at": "2025-09-16T10:00:00Z",
            "completed_at": null,
            "results": {"research": "brief"}
        }"#;
        let req: ResearchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.status, Completed);
        assert!(req.completed_at.is_none());
        assert_eq!(req.results.unwrap()["research"], "brief");
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        let json = r#"{
            "id": "abc",
            "query": "q",
            "status": "proposed",
            "created_at": "2025-09-16T10:00:00.123456",
            "cost_estimate": 0.002
        }"#;
        let req: ResearchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.created_at.to_rfc3339(), "2025-09-16T10:00:00.123456+00:00");
    }

    #[test]
    fn garbage_timestamp_is_rejected() {
        let json = r#"{"id":"a","query":"q","status":"proposed","created_at":"yesterday"}"#;
        assert!(serde_json::from_str::<ResearchRequest>(json).is_err());
    }
}
