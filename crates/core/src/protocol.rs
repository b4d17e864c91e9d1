//! Defines the WebSocket event protocol between a client and the advisory service.
//!
//! Every frame is a JSON text message of the form `{"event": <name>, "data": <payload>}`.

use crate::{advisor::AdvisorSummary, api::ContextTurn, message::Message};
use serde::{Deserialize, Serialize};

/// Events sent from the client to the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A typed chat message, optionally addressed to one advisor.
    UserMessage {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        advisor: Option<String>,
        #[serde(default)]
        context: Vec<ContextTurn>,
    },
    /// A finished voice recording.
    VoiceData(VoicePayload),
    /// Opens a conversation with the given advisors.
    StartSession {
        #[serde(default)]
        advisors: Vec<String>,
    },
    EndSession,
    AddAdvisor { advisor_id: String },
    RemoveAdvisor { advisor_id: String },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::UserMessage { .. } => "user_message",
            ClientEvent::VoiceData(_) => "voice_data",
            ClientEvent::StartSession { .. } => "start_session",
            ClientEvent::EndSession => "end_session",
            ClientEvent::AddAdvisor { .. } => "add_advisor",
            ClientEvent::RemoveAdvisor { .. } => "remove_advisor",
        }
    }
}

/// An encoded audio clip. `audio` is the base64 of the whole container (WAV).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VoicePayload {
    pub audio: String,
    pub format: String,
    pub sample_rate: u32,
    pub duration_ms: u64,
}

/// Events pushed from the server to the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new transcript entry, usually an advisor reply.
    Message(Message),
    /// The set of advisors taking part in the session changed.
    AdvisorUpdate { advisors: Vec<AdvisorSummary> },
    Error { message: String },
    /// The server received a voice clip and is working on it.
    VoiceProcessing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    /// The server finished with a voice clip.
    VoiceResponse(VoiceReply),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct VoiceReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor_name: Option<String>,
}

const SERVER_EVENT_NAMES: [&str; 5] = [
    "message",
    "advisor_update",
    "error",
    "voice_processing",
    "voice_response",
];

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not a JSON event envelope: {0}")]
    NotAnEnvelope(serde_json::Error),
    #[error("malformed '{event}' payload: {source}")]
    MalformedPayload {
        event: String,
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
}

impl ServerEvent {
    /// Parses one text frame. Returns `Ok(None)` for well-formed envelopes
    /// carrying an event this client does not know about.
    pub fn parse(frame: &str) -> Result<Option<Self>, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(frame).map_err(ProtocolError::NotAnEnvelope)?;
        if !SERVER_EVENT_NAMES.contains(&envelope.event.as_str()) {
            return Ok(None);
        }
        serde_json::from_str(frame)
            .map(Some)
            .map_err(|source| ProtocolError::MalformedPayload {
                event: envelope.event,
                source,
            })
    }
}

impl ClientEvent {
    /// Parses one text frame sent by a client.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(frame).map_err(ProtocolError::NotAnEnvelope)?;
        serde_json::from_str(frame).map_err(|source| ProtocolError::MalformedPayload {
            event: envelope.event,
            source,
        })
    }
}
