//! Network infrastructure for the sync crate.
//!
//! # Sub-modules
//!
//! - **`connection`** – The per-server [`ServerConnection`]: lifecycle state
//!   machine, status and reconnect observers, named-event dispatch,
//!   encrypted RPC, and authenticated HTTP passthrough.
//!
//! - **`transport`** – The seam the connection talks to the wire through.
//!   Real transports reconnect on their own with capped backoff; the
//!   connection layer only consumes their event stream.
//!
//! - **`reconcile`** – Coalescing background tasks for "something changed,
//!   re-fetch it" style reconciliation, one per session.
//!
//! - **`mock`** – A hand-driven transport for tests.

pub mod connection;
pub mod mock;
pub mod reconcile;
pub mod transport;

pub use connection::{
    ConnectionStatus, HttpError, HttpOptions, ObserverId, RpcError, ServerConnection,
};
