//! Auth endpoints the pairing flow talks to.
//!
//! Pairing needs two server-side operations: exchanging the account secret
//! for a bearer token on some server ([`TokenIssuer`], used when a link
//! points at a server the account has no token for yet), and submitting
//! the double-encrypted approval that hands a terminal its credentials
//! ([`ApprovalSubmitter`]). Production embedders back these with their
//! HTTP API client; tests use [`MockAuthService`].
//!
//! [`MockAuthService`]: mock::MockAuthService

use async_trait::async_trait;
use thiserror::Error;

pub mod mock;

/// Error type for auth endpoint calls.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The server refused to issue a token for the presented secret.
    #[error("token issuance rejected: {0}")]
    Issuance(String),

    /// The server refused the approval.
    #[error("approval rejected: {0}")]
    Rejected(String),

    /// The endpoint could not be reached.
    #[error("auth endpoint unreachable: {0}")]
    Network(String),
}

/// Exchanges the account secret for a bearer token on one server.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Returns a token scoped to `server_url` for the account identified
    /// by `secret`.
    async fn issue_token(&self, secret: &[u8], server_url: &str) -> Result<String, AuthError>;
}

/// Submits the pairing approval for a scanned terminal.
#[async_trait]
pub trait ApprovalSubmitter: Send + Sync {
    /// Approves the terminal identified by `public_key` (in its encoded
    /// link form) on `server_url`, delivering both the legacy envelope and
    /// the versioned envelope.
    async fn submit_approval(
        &self,
        token: &str,
        public_key: &str,
        legacy_envelope: &[u8],
        versioned_envelope: &[u8],
        server_url: &str,
    ) -> Result<(), AuthError>;
}
