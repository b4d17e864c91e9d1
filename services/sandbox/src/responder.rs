//! Where advisor replies come from.
//!
//! The real service asks a language model; the sandbox answers with canned
//! lines so every response is deterministic.

use advisory_core::{Advisor, VoicePayload, api::ContextTurn};
use anyhow::Result;
use async_trait::async_trait;

/// Produces advisor replies and voice transcripts.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Answers `message` in the voice of `advisor`. `context` holds at most
    /// the last few exchanges, oldest first.
    async fn reply(
        &self,
        advisor: &Advisor,
        message: &str,
        context: &[ContextTurn],
        document: Option<&str>,
    ) -> Result<String>;

    /// Turns a voice clip into text.
    async fn transcribe(&self, clip: &VoicePayload) -> Result<String>;
}

/// Deterministic replies built from a signature line per advisor.
#[derive(Debug, Default, Clone, Copy)]
pub struct CannedResponder;

fn signature(advisor_id: &str) -> &'static str {
    match advisor_id {
        "alex" => "Make an offer so good people feel stupid saying no.",
        "tony" => "Get clear on the outcome, then take massive action.",
        "mark" => "Sales cure all. Know your numbers cold.",
        "sara" => "Test it yourself first and don't fear failing.",
        "seth" => "Find the smallest viable audience and delight them.",
        "robert" => "Buy assets, not liabilities.",
        _ => "Start with the customer and work backwards.",
    }
}

#[async_trait]
impl Responder for CannedResponder {
    async fn reply(
        &self,
        advisor: &Advisor,
        message: &str,
        context: &[ContextTurn],
        document: Option<&str>,
    ) -> Result<String> {
        let mut reply = format!("{} You asked: \"{}\".", signature(&advisor.id), message.trim());
        if !context.is_empty() {
            reply.push_str(&format!(" (Building on our last {} exchanges.)", context.len()));
        }
        if document.is_some_and(|d| !d.trim().is_empty()) {
            reply.push_str(" I read the document you shared.");
        }
        Ok(reply)
    }

    async fn transcribe(&self, clip: &VoicePayload) -> Result<String> {
        Ok(format!("[{} ms of {} audio]", clip.duration_ms, clip.format))
    }
}
