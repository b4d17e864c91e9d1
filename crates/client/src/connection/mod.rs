//! Persistent WebSocket connection to the advisory service.
//!
//! - `backoff`: reconnect delay schedule.
//! - `transport`: the `Connector` seam and its `tokio-tungstenite` implementation.
//! - `manager`: the `ConnectionManager` service that owns the live transport.

mod backoff;
mod manager;
#[cfg(test)]
pub(crate) mod testing;
mod transport;

pub use backoff::{ReconnectPolicy, backoff_delay};
pub use manager::{ConnectionConfig, ConnectionEvent, ConnectionManager};
pub use transport::{Connector, Frame, Transport, WsConnector};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("cannot send '{0}': not connected")]
    NotConnected(&'static str),
    #[error("failed to encode '{event}': {reason}")]
    Encode { event: &'static str, reason: String },
}
