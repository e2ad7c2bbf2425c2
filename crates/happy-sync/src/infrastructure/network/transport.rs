//! Transport seam between [`ServerConnection`] and the wire.
//!
//! A [`Transport`] opens a long-lived, self-reconnecting event stream toward
//! one server. The connection layer never sees sockets; it consumes
//! [`TransportEvent`]s from a channel and talks back through the
//! [`TransportHandle`]. Production embedders plug in their socket stack
//! here, tests use [`MockTransport`].
//!
//! Reconnection is the transport's job: after a drop it keeps retrying with
//! a backoff that starts at [`RECONNECT_DELAY_MS`] and is capped at
//! [`RECONNECT_DELAY_MAX_MS`], for as long as the handle stays open. The
//! connection layer only reacts to the resulting event sequence.
//!
//! [`ServerConnection`]: super::ServerConnection
//! [`MockTransport`]: super::mock::MockTransport
//! [`RECONNECT_DELAY_MS`]: happy_core::protocol::constants::RECONNECT_DELAY_MS
//! [`RECONNECT_DELAY_MAX_MS`]: happy_core::protocol::constants::RECONNECT_DELAY_MAX_MS

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use happy_core::protocol::constants::{
    CLIENT_TYPE_USER, RECONNECT_DELAY_MAX_MS, RECONNECT_DELAY_MS, UPDATES_PATH,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Capacity of the transport event channel handed to the connection layer.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport has been closed and cannot carry traffic.
    #[error("transport closed")]
    Closed,

    /// The server did not acknowledge an emission.
    #[error("acknowledgement failed: {0}")]
    Ack(String),

    /// The transport failed to carry the emission.
    #[error("transport failure: {0}")]
    Failed(String),
}

/// Reconnect backoff parameters handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound the backoff grows toward.
    pub max_delay: Duration,
    /// `None` retries forever; the connection layer relies on that.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            max_delay: Duration::from_millis(RECONNECT_DELAY_MAX_MS),
            max_attempts: None,
        }
    }
}

/// Everything a transport needs to reach one server.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Base URL of the server, no trailing slash.
    pub server_url: String,
    /// Path of the event endpoint on the server.
    pub path: String,
    /// Bearer token presented during the handshake.
    pub token: String,
    /// Client type advertised to the server.
    pub client_type: String,
    /// Reconnect backoff parameters.
    pub reconnect: ReconnectPolicy,
}

impl ConnectOptions {
    /// Builds options for the standard updates endpoint of `server_url`.
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            path: UPDATES_PATH.to_string(),
            token: token.into(),
            client_type: CLIENT_TYPE_USER.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Lifecycle and traffic events produced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The transport reached the server. `recovered` is `true` when the
    /// server restored the previous session state across the reconnect.
    Connected { recovered: bool },
    /// The transport lost the server and is backing off before retrying.
    Disconnected,
    /// The transport hit an error while connecting or connected.
    ConnectError { message: String },
    /// A named server event arrived.
    Message { event: String, payload: Value },
}

/// Factory for transports, one per server connection.
pub trait Transport: Send + Sync {
    /// Opens a transport toward the server described by `options`.
    ///
    /// Returns immediately. Connection progress, failures, and traffic all
    /// arrive as [`TransportEvent`]s on the returned channel; the handle
    /// stays valid across the transport's own reconnect cycles.
    fn open(
        &self,
        options: &ConnectOptions,
    ) -> (Arc<dyn TransportHandle>, mpsc::Receiver<TransportEvent>);
}

/// Outbound side of an open transport.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Emits a named event without waiting for a response.
    async fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError>;

    /// Emits a named event and awaits the single acknowledgement the server
    /// correlates with it.
    async fn emit_with_ack(&self, event: &str, payload: Value) -> Result<Value, TransportError>;

    /// Tears the transport down, ending reconnection. Safe to call more
    /// than once.
    fn close(&self);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
