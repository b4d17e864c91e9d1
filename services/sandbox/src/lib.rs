//! Advisory Sandbox Library Crate
//!
//! An in-memory stand-in for the advisory backend. It serves the same REST
//! and WebSocket contracts as the production service, answering with canned
//! responders so local development and integration tests need no network.
//! The binaries in `bin/` are thin wrappers around this library.

pub mod advisors;
pub mod config;
pub mod handlers;
pub mod research;
pub mod responder;
pub mod router;
pub mod state;
pub mod ws;

/// Naive ISO 8601 in UTC, the timestamp shape the API returns.
pub(crate) fn timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}
