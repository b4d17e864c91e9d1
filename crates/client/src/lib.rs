//! Client library for the virtual advisory board.
//!
//! - `connection`: the persistent WebSocket link with reconnect and backoff.
//! - `voice`: microphone capture, level metering and voice clip upload.
//! - `research`: the research approval workflow over HTTP.
//! - `session`: the chat transcript and the calls that grow it.
//! - `api`: the HTTP client every other piece builds on.

pub mod api;
pub mod config;
pub mod connection;
pub mod research;
pub mod session;
pub mod voice;

pub use api::{ApiClient, ApiError};
pub use config::{ClientConfig, ConfigError};
pub use connection::{ConnectionConfig, ConnectionEvent, ConnectionManager, WsConnector};
pub use research::{PollHandle, ResearchView, ResearchWorkflow};
pub use session::{ChatSession, SessionError};
pub use voice::{VoiceError, VoicePipeline, VoiceState};
