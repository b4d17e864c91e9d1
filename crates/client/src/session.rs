//! Chat Session glue: the transcript a user sees and the calls that grow it.

use crate::{
    api::{ApiClient, ApiError},
    connection::ConnectionEvent,
};
use advisory_core::{
    AdvisorSummary, Message, Sender,
    advisor::display_name,
    api::{ChatRequest, ChatResponse, ContextTurn, PanelRequest, PanelResponse},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Shown in place of a reply whenever a chat or panel call fails.
pub const APOLOGY: &str = "Sorry, something went wrong. Please try again.";

/// How many previous exchanges accompany a chat request.
pub const CONTEXT_TURNS: usize = 3;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError>;
    async fn panel(&self, request: &PanelRequest) -> Result<PanelResponse, ApiError>;
    async fn advisors(&self) -> Result<Vec<AdvisorSummary>, ApiError>;
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        ApiClient::chat(self, request).await
    }

    async fn panel(&self, request: &PanelRequest) -> Result<PanelResponse, ApiError> {
        ApiClient::panel(self, request).await
    }

    async fn advisors(&self) -> Result<Vec<AdvisorSummary>, ApiError> {
        self.list_advisors().await
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no advisor selected")]
    NoAdvisorSelected,
    #[error("message is empty")]
    EmptyMessage,
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    roster: Vec<AdvisorSummary>,
    selected: Option<String>,
    document: Option<String>,
    messages: Vec<Message>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            roster: Vec::new(),
            selected: None,
            document: None,
            messages: Vec::new(),
        }
    }

    /// Replaces the roster with the server's advisor list.
    pub async fn load_roster(&mut self) -> Result<&[AdvisorSummary], ApiError> {
        self.roster = self.backend.advisors().await?;
        debug!(advisors = self.roster.len(), "Roster loaded");
        Ok(&self.roster)
    }

    pub fn set_roster(&mut self, roster: Vec<AdvisorSummary>) {
        self.roster = roster;
    }

    pub fn roster(&self) -> &[AdvisorSummary] {
        &self.roster
    }

    /// Selects who `send_chat` talks to. Returns whether the id is on the roster.
    pub fn select_advisor(&mut self, advisor_id: impl Into<String>) -> bool {
        let advisor_id = advisor_id.into();
        let known = display_name(&self.roster, &advisor_id).is_some();
        if !known {
            warn!(%advisor_id, "Selected advisor is not on the roster");
        }
        self.selected = Some(advisor_id);
        known
    }

    pub fn selected_advisor(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Attaches a document sent along with every following request.
    pub fn attach_document(&mut self, document: Option<String>) {
        self.document = document;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn name_of(&self, advisor_id: &str) -> String {
        display_name(&self.roster, advisor_id)
            .unwrap_or(advisor_id)
            .to_string()
    }

    /// The most recent user/advisor exchanges, oldest first.
    pub fn recent_context(&self) -> Vec<ContextTurn> {
        let mut turns = Vec::new();
        let mut pending_user: Option<&str> = None;
        for msg in &self.messages {
            match msg.sender {
                Sender::User => pending_user = Some(&msg.content),
                Sender::Advisor if !msg.is_processing => {
                    if let Some(user) = pending_user.take() {
                        turns.push(ContextTurn {
                            user: user.to_string(),
                            advisor: msg.content.clone(),
                        });
                    }
                }
                Sender::Advisor => {}
            }
        }
        let skip = turns.len().saturating_sub(CONTEXT_TURNS);
        turns.split_off(skip)
    }

    /// Sends `text` to the selected advisor and appends both sides of the exchange.
    ///
    /// Transport and server failures do not surface as errors: the reply
    /// placeholder is finalized with [`APOLOGY`] instead.
    #[instrument(skip(self, text))]
    pub async fn send_chat(&mut self, text: &str) -> Result<&Message, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let advisor_id = self.selected.clone().ok_or(SessionError::NoAdvisorSelected)?;
        let advisor_name = self.name_of(&advisor_id);

        let request = ChatRequest {
            message: text.to_string(),
            advisor: advisor_id.clone(),
            context: self.recent_context(),
            document: self.document.clone(),
        };
        self.messages.push(Message::user(text));
        self.messages.push(Message::placeholder(&advisor_id, &advisor_name));
        let slot = self.messages.len() - 1;

        let reply = match self.backend.chat(&request).await {
            Ok(response) => {
                info!(advisor = %advisor_id, "Advisor replied");
                response.response
            }
            Err(e) => {
                warn!(error = %e, advisor = %advisor_id, "Chat request failed");
                APOLOGY.to_string()
            }
        };
        let message = &mut self.messages[slot];
        message.finalize(reply);
        Ok(&*message)
    }

    /// Puts `topic` to several advisors at once. Appends the user's message,
    /// then one advisor message per response in the order received.
    #[instrument(skip(self))]
    pub async fn send_panel(
        &mut self,
        topic: &str,
        advisors: &[String],
    ) -> Result<&[Message], SessionError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let request = PanelRequest {
            topic: topic.to_string(),
            advisors: advisors.to_vec(),
            document: self.document.clone(),
        };
        self.messages.push(Message::user(topic));
        let first = self.messages.len();

        match self.backend.panel(&request).await {
            Ok(panel) => {
                info!(responses = panel.responses.len(), "Panel replied");
                for entry in panel.responses {
                    let advisor_id = entry
                        .advisor
                        .or_else(|| {
                            self.roster
                                .iter()
                                .find(|a| a.name == entry.name)
                                .map(|a| a.id.clone())
                        })
                        .unwrap_or_else(|| entry.name.clone());
                    self.messages
                        .push(Message::advisor(advisor_id, entry.name, entry.response));
                }
            }
            Err(e) => {
                warn!(error = %e, "Panel request failed");
                self.messages
                    .push(Message::advisor("panel", "Advisory Board", APOLOGY));
            }
        }
        Ok(&self.messages[first..])
    }

    /// Folds one connection notification into the session.
    pub fn apply_event(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Message(message) => self.messages.push(message.clone()),
            ConnectionEvent::AdvisorUpdate(advisors) => self.roster = advisors.clone(),
            ConnectionEvent::VoiceResponse(reply) => {
                if let Some(transcript) = &reply.transcript {
                    self.messages.push(Message::user(transcript.as_str()));
                }
                if let Some(response) = &reply.response {
                    let advisor_id = reply
                        .advisor_id
                        .clone()
                        .or_else(|| self.selected.clone())
                        .unwrap_or_default();
                    let advisor_name = reply
                        .advisor_name
                        .clone()
                        .unwrap_or_else(|| self.name_of(&advisor_id));
                    self.messages
                        .push(Message::advisor(advisor_id, advisor_name, response.as_str()));
                }
            }
            ConnectionEvent::Connection(_)
            | ConnectionEvent::VoiceProcessing(_)
            | ConnectionEvent::Error { .. } => {}
        }
    }
}
