//! WebSocket Session Management
//!
//! - `session`: the connection lifecycle, from upgrade to close.
//! - `conversation`: what a session does with each client event.

mod conversation;
pub mod session;

pub use conversation::{Conversation, Outcome};
pub use session::ws_handler;
