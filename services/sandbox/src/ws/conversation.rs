//! Per-connection conversation state and event handling, free of any socket.

use crate::state::AppState;
use advisory_core::{
    Advisor, AdvisorSummary, ClientEvent, Message, ServerEvent, VoicePayload, VoiceReply,
    api::ContextTurn,
};
use std::sync::Arc;
use tracing::{info, warn};

/// What the session loop should do after an event.
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    pub events: Vec<ServerEvent>,
    /// Close the socket with a normal close code once `events` are sent.
    pub close: bool,
}

impl Outcome {
    fn send(events: Vec<ServerEvent>) -> Self {
        Self {
            events,
            close: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self::send(vec![ServerEvent::Error {
            message: message.into(),
        }])
    }
}

/// The advisors taking part in one WebSocket session.
pub struct Conversation {
    state: Arc<AppState>,
    participants: Vec<AdvisorSummary>,
}

impl Conversation {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            participants: Vec::new(),
        }
    }

    pub fn participants(&self) -> &[AdvisorSummary] {
        &self.participants
    }

    /// An event to send before `event` is handled, so the client knows work
    /// has started.
    pub fn acknowledge(&self, event: &ClientEvent) -> Option<ServerEvent> {
        match event {
            ClientEvent::VoiceData(_) => Some(ServerEvent::VoiceProcessing {
                status: Some("processing".to_string()),
            }),
            _ => None,
        }
    }

    pub async fn handle(&mut self, event: ClientEvent) -> Outcome {
        match event {
            ClientEvent::StartSession { advisors } => self.start(advisors).await,
            ClientEvent::AddAdvisor { advisor_id } => self.add(&advisor_id).await,
            ClientEvent::RemoveAdvisor { advisor_id } => {
                self.participants.retain(|a| a.id != advisor_id);
                info!(%advisor_id, "Advisor left the session");
                self.roster_update()
            }
            ClientEvent::UserMessage {
                message,
                advisor,
                context,
            } => self.answer(&message, advisor.as_deref(), &context).await,
            ClientEvent::VoiceData(clip) => self.voice(&clip).await,
            ClientEvent::EndSession => {
                info!("Client ended the session");
                Outcome {
                    events: Vec::new(),
                    close: true,
                }
            }
        }
    }

    fn roster_update(&self) -> Outcome {
        Outcome::send(vec![ServerEvent::AdvisorUpdate {
            advisors: self.participants.clone(),
        }])
    }

    async fn lookup(&self, id: &str) -> Result<Advisor, String> {
        self.state
            .advisors
            .read()
            .await
            .get(id)
            .cloned()
            .map_err(|e| e.to_string())
    }

    /// Replaces the participants. An empty list seats every advisor.
    async fn start(&mut self, advisors: Vec<String>) -> Outcome {
        let roster = self.state.advisors.read().await;
        if advisors.is_empty() {
            self.participants = roster.summaries();
        } else {
            let mut seated = Vec::with_capacity(advisors.len());
            for id in &advisors {
                match roster.get(id) {
                    Ok(advisor) => seated.push(advisor.summary()),
                    Err(e) => return Outcome::error(e.to_string()),
                }
            }
            self.participants = seated;
        }
        drop(roster);
        info!(count = self.participants.len(), "Session started");
        self.roster_update()
    }

    async fn add(&mut self, id: &str) -> Outcome {
        let advisor = match self.lookup(id).await {
            Ok(advisor) => advisor,
            Err(e) => return Outcome::error(e),
        };
        if !self.participants.iter().any(|a| a.id == advisor.id) {
            self.participants.push(advisor.summary());
            info!(advisor_id = %advisor.id, "Advisor joined the session");
        }
        self.roster_update()
    }

    /// Who should answer: the addressed advisor, else everyone seated.
    async fn responders(&self, addressed: Option<&str>) -> Result<Vec<Advisor>, String> {
        if let Some(id) = addressed {
            return Ok(vec![self.lookup(id).await?]);
        }
        if self.participants.is_empty() {
            return Err("No advisors in this session".to_string());
        }
        let roster = self.state.advisors.read().await;
        Ok(self
            .participants
            .iter()
            .filter_map(|p| roster.get(&p.id).ok().cloned())
            .collect())
    }

    async fn answer(
        &self,
        message: &str,
        addressed: Option<&str>,
        context: &[ContextTurn],
    ) -> Outcome {
        let advisors = match self.responders(addressed).await {
            Ok(advisors) => advisors,
            Err(e) => return Outcome::error(e),
        };
        let mut events = Vec::with_capacity(advisors.len());
        for advisor in advisors {
            match self.state.responder.reply(&advisor, message, context, None).await {
                Ok(reply) => events.push(ServerEvent::Message(Message::advisor(
                    advisor.id,
                    advisor.name,
                    reply,
                ))),
                Err(e) => {
                    warn!(advisor = %advisor.id, error = %e, "Advisor failed to answer");
                    events.push(ServerEvent::Error {
                        message: format!("{} could not answer right now", advisor.name),
                    });
                }
            }
        }
        Outcome::send(events)
    }

    /// Transcribes a clip and lets the first seated advisor answer it.
    async fn voice(&self, clip: &VoicePayload) -> Outcome {
        let transcript = match self.state.responder.transcribe(clip).await {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!(error = %e, "Transcription failed");
                return Outcome::error("Could not process the voice message");
            }
        };
        let Some(advisor) = self.responders(None).await.ok().and_then(|a| a.into_iter().next())
        else {
            return Outcome::send(vec![ServerEvent::VoiceResponse(VoiceReply {
                transcript: Some(transcript),
                ..Default::default()
            })]);
        };
        match self.state.responder.reply(&advisor, &transcript, &[], None).await {
            Ok(response) => Outcome::send(vec![ServerEvent::VoiceResponse(VoiceReply {
                transcript: Some(transcript),
                response: Some(response),
                advisor_id: Some(advisor.id),
                advisor_name: Some(advisor.name),
            })]),
            Err(e) => {
                warn!(advisor = %advisor.id, error = %e, "Voice reply failed");
                Outcome::error("Could not process the voice message")
            }
        }
    }
}
