//! Constants shared between the pairing grammar and the socket layer.
//!
//! The values here are fixed by the server deployment and by links already in
//! the wild; changing any of them breaks interop with existing installs.

/// Scheme + path marker every pairing link starts with, byte for byte.
pub const PAIRING_URL_PREFIX: &str = "happy://terminal?";

/// Server-side mount point of the updates socket.
pub const UPDATES_PATH: &str = "/v1/updates";

/// Client type announced during socket authentication. A user-scoped client
/// receives events for every session owned by the account, as opposed to a
/// session-scoped daemon.
pub const CLIENT_TYPE_USER: &str = "user-scoped";

/// Event name carrying multiplexed RPC requests over the socket.
pub const RPC_CALL_EVENT: &str = "rpc-call";

/// Delay before the first transport reconnect attempt, in milliseconds.
pub const RECONNECT_DELAY_MS: u64 = 1_000;

/// Ceiling for the transport's reconnect backoff, in milliseconds.
pub const RECONNECT_DELAY_MAX_MS: u64 = 5_000;
