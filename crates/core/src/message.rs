//! Chat messages shown in a session transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Advisor,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Advisor => write!(f, "advisor"),
        }
    }
}

/// A single entry in a session transcript.
///
/// Messages are append-only. The one permitted mutation is turning a
/// processing placeholder into its final content with [`Message::finalize`].
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub sender: Sender,
    #[serde(alias = "text")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_processing: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Sender::User,
            content: content.into(),
            advisor_id: None,
            advisor_name: None,
            timestamp: Utc::now(),
            is_processing: false,
        }
    }

    pub fn advisor(
        advisor_id: impl Into<String>,
        advisor_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Sender::Advisor,
            content: content.into(),
            advisor_id: Some(advisor_id.into()),
            advisor_name: Some(advisor_name.into()),
            timestamp: Utc::now(),
            is_processing: false,
        }
    }

    /// An empty advisor message standing in for a reply that is still on its way.
    pub fn placeholder(advisor_id: impl Into<String>, advisor_name: impl Into<String>) -> Self {
        Self {
            is_processing: true,
            ..Self::advisor(advisor_id, advisor_name, "")
        }
    }

    /// Fills a placeholder with its final content. Returns `false` and leaves the
    /// message untouched if it was not a placeholder.
    pub fn finalize(&mut self, content: impl Into<String>) -> bool {
        if !self.is_processing {
            return false;
        }
        self.content = content.into();
        self.is_processing = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_finalizes_once() {
        let mut msg = Message::placeholder("alex", "Alex Hormozi");
        assert!(msg.is_processing);
        assert!(msg.finalize("Charge more."));
        assert_eq!(msg.content, "Charge more.");
        assert!(!msg.is_processing);

        assert!(!msg.finalize("Something else"));
        assert_eq!(msg.content, "Charge more.");
    }

    #[test]
    fn user_messages_cannot_be_finalized() {
        let mut msg = Message::user("hi");
        assert!(!msg.finalize("changed"));
        assert_eq!(msg.content, "hi");
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let msg = Message::advisor("alex", "Alex Hormozi", "Charge more.");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["sender"], "advisor");
        assert_eq!(json["advisorName"], "Alex Hormozi");
        assert_eq!(json["advisorId"], "alex");
        assert_eq!(json["isProcessing"], false);
    }

    #[test]
    fn accepts_text_alias_and_missing_optionals() {
        let json = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "sender": "advisor",
            "text": "Hello",
            "timestamp": "2024-01-15T10:30:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.content, "Hello");
        assert_eq!(msg.advisor_name, None);
        assert!(!msg.is_processing);
    }

    #[test]
    fn sender_display() {
        assert_eq!(Sender::User.to_string(), "user");
        assert_eq!(Sender::Advisor.to_string(), "advisor");
    }
}
