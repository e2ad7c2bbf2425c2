//! Credential records and vault slot addressing.
//!
//! Credentials are persisted in the platform's secure vault as the JSON
//! object `{"token":...,"secret":...}` under one of two kinds of slot:
//!
//! - the unscoped default slot, used by the account's primary server, and
//! - a per-server slot derived deterministically from the server URL, used
//!   for every additional server the account has paired against.
//!
//! The slot name partitions storage; it is NOT a security boundary. Two URLs
//! hashing to the same slot would merely share a storage bucket, and the
//! stored value is always interpreted against the URL the caller holds.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Vault slot holding the default (active-server) credentials.
pub const DEFAULT_CREDENTIAL_SLOT: &str = "auth_credentials";

/// Number of leading SHA-256 bytes kept in a per-server slot name.
const SLOT_HASH_BYTES: usize = 8;

/// A `{token, secret}` credential pair.
///
/// `secret` is the account's long-lived identity key in base64url; `token` is
/// a short-lived bearer credential scoped to exactly one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCredentials {
    pub token: String,
    pub secret: String,
}

/// Derives the vault slot name for a server URL.
///
/// The name is `auth_credentials_` followed by the first eight bytes of the
/// URL's SHA-256, lowercase hex. Deterministic for equal strings, distinct
/// for different strings with high (not cryptographic) probability.
pub fn credential_slot(server_url: &str) -> String {
    let digest = Sha256::digest(server_url.as_bytes());
    let mut slot = String::with_capacity(DEFAULT_CREDENTIAL_SLOT.len() + 1 + SLOT_HASH_BYTES * 2);
    slot.push_str(DEFAULT_CREDENTIAL_SLOT);
    slot.push('_');
    for byte in &digest[..SLOT_HASH_BYTES] {
        slot.push_str(&format!("{byte:02x}"));
    }
    slot
}
