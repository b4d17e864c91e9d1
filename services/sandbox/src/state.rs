//! Shared state behind every handler and WebSocket session.

use crate::{
    advisors::Roster,
    research::{CannedResearcher, ResearchQueue, Researcher},
    responder::{CannedResponder, Responder},
};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Created once at startup and handed to the router behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub advisors: Arc<RwLock<Roster>>,
    pub research: Arc<Mutex<ResearchQueue>>,
    pub responder: Arc<dyn Responder>,
    pub researcher: Arc<dyn Researcher>,
}

impl AppState {
    pub fn new(
        roster: Roster,
        responder: Arc<dyn Responder>,
        researcher: Arc<dyn Researcher>,
    ) -> Self {
        Self {
            advisors: Arc::new(RwLock::new(roster)),
            research: Arc::new(Mutex::new(ResearchQueue::default())),
            responder,
            researcher,
        }
    }

    pub fn with_responder(responder: Arc<dyn Responder>) -> Self {
        Self::new(Roster::seeded(), responder, Arc::new(CannedResearcher))
    }
}

impl Default for AppState {
    /// The seeded roster with canned replies and research.
    fn default() -> Self {
        Self::with_responder(Arc::new(CannedResponder))
    }
}
