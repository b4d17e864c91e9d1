//! Shared domain model for the virtual advisory board.
//!
//! These types are used on both sides of the wire: by the client library and
//! by the sandbox service that stands in for the real backend.

pub mod advisor;
pub mod api;
pub mod message;
pub mod protocol;
pub mod research;

pub use advisor::{Advisor, AdvisorPatch, AdvisorSummary};
pub use message::{Message, Sender};
pub use protocol::{ClientEvent, ProtocolError, ServerEvent, VoicePayload, VoiceReply};
pub use research::{AdvisorSuggestion, ResearchRequest, ResearchStatus, TransitionError};
