use super::{VoiceError, VoicePipeline};
use advisory_core::VoicePayload;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Down { key: String, repeat: bool },
    Up { key: String },
}

impl KeyEvent {
    pub fn down(key: impl Into<String>) -> Self {
        KeyEvent::Down {
            key: key.into(),
            repeat: false,
        }
    }

    pub fn up(key: impl Into<String>) -> Self {
        KeyEvent::Up { key: key.into() }
    }

    fn key(&self) -> &str {
        match self {
            KeyEvent::Down { key, .. } | KeyEvent::Up { key } => key,
        }
    }
}

/// Hold-to-record binding: key-down starts, key-up stops.
///
/// Auto-repeat key-downs and other keys are ignored. While the pipeline is
/// disabled key-down does nothing, but key-up still ends a recording already
/// in progress.
pub struct PushToTalk {
    key: String,
    pipeline: Arc<VoicePipeline>,
}

impl PushToTalk {
    pub fn new(key: impl Into<String>, pipeline: Arc<VoicePipeline>) -> Self {
        Self {
            key: key.into(),
            pipeline,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the clip sent on key-up, if any.
    pub async fn handle(&self, event: &KeyEvent) -> Result<Option<VoicePayload>, VoiceError> {
        if !event.key().eq_ignore_ascii_case(&self.key) {
            return Ok(None);
        }
        match event {
            KeyEvent::Down { repeat: true, .. } => Ok(None),
            KeyEvent::Down { .. } if self.pipeline.is_disabled() => Ok(None),
            KeyEvent::Down { .. } => {
                debug!(key = %self.key, "Push-to-talk pressed");
                self.pipeline.start_recording().await?;
                Ok(None)
            }
            KeyEvent::Up { .. } => {
                debug!(key = %self.key, "Push-to-talk released");
                self.pipeline.stop_recording().await
            }
        }
    }
}
