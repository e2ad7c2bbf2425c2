//! Terminal pairing approval flow.
//!
//! A terminal that wants access shows a `happy://terminal?...` link
//! carrying its ephemeral public key and, optionally, the server it lives
//! on. Approving that link means:
//!
//! 1. parse the link and decode the terminal's public key;
//! 2. resolve which server the approval targets — the link's hint, or the
//!    active server when the link has none;
//! 3. when the hint points at a server other than the active one, exchange
//!    the account secret for a token on that server, persist it, and adopt
//!    the server into the registry and connection pool;
//! 4. seal two envelopes for the terminal's public key — the legacy one
//!    carrying the bare account secret, and the versioned one carrying the
//!    version-prefixed content data key — and submit the approval.
//!
//! Only one approval runs at a time; a second call while one is in flight
//! fails fast with [`PairingError::Busy`]. Steps are not rolled back: a
//! failed approval leaves any credentials and registration adopted in
//! step 3 in place, which at worst re-pairs faster next time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use happy_core::{
    decode_key_material, parse_pairing_url, versioned_ack_plaintext, AuthCredentials,
    KeyDecodeError,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::manage_servers::ServerManager;
use crate::infrastructure::auth::{ApprovalSubmitter, AuthError, TokenIssuer};
use crate::infrastructure::encryption::{CipherError, EncryptionContext};
use crate::infrastructure::storage::catalog::CatalogError;
use crate::infrastructure::storage::registry::ServerRegistry;
use crate::infrastructure::storage::token_storage::TokenStorage;
use crate::infrastructure::storage::vault::VaultError;

/// Error type for the pairing flow.
#[derive(Debug, Error)]
pub enum PairingError {
    /// The scanned link is not a pairing link.
    #[error("the pairing link is not valid")]
    InvalidLink,

    /// Another approval is already in flight.
    #[error("another pairing approval is already in flight")]
    Busy,

    /// The link has no server hint and no active server is configured.
    #[error("no active server is configured")]
    NoActiveServer,

    /// The default credential slot is empty; the account is signed out.
    #[error("no account credentials are available")]
    NoActiveCredentials,

    /// The link's key material, or the stored secret, is not decodable.
    #[error("key material is invalid: {0}")]
    BadKey(#[from] KeyDecodeError),

    /// The target server refused to issue a token.
    #[error("token issuance failed: {0}")]
    Issuance(#[source] AuthError),

    /// Persisting the adopted credentials failed.
    #[error("storing credentials failed: {0}")]
    CredentialStore(#[from] VaultError),

    /// Registering the adopted server failed.
    #[error("registering the server failed: {0}")]
    Register(#[from] CatalogError),

    /// Sealing a pairing envelope failed.
    #[error("sealing the approval failed: {0}")]
    Cipher(#[from] CipherError),

    /// The server rejected the approval submission.
    #[error("approval submission failed: {0}")]
    Approval(#[source] AuthError),
}

impl PairingError {
    /// The message shown to the user. Deliberately binary: a bad link gets
    /// its own message, every downstream failure gets the same one.
    pub fn user_message(&self) -> &'static str {
        match self {
            PairingError::InvalidLink => "This pairing link is not valid.",
            _ => "Could not approve the terminal. Check your connection and try again.",
        }
    }
}

/// What a successful approval did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingOutcome {
    /// The server the approval was submitted to.
    pub server_url: String,
    /// Whether the flow issued a token on a server other than the active
    /// one (and adopted it) along the way.
    pub cross_server: bool,
}

/// The pairing approval use case.
pub struct PairingFlow {
    registry: Arc<ServerRegistry>,
    tokens: Arc<TokenStorage>,
    manager: Arc<ServerManager>,
    encryption: Arc<dyn EncryptionContext>,
    issuer: Arc<dyn TokenIssuer>,
    approvals: Arc<dyn ApprovalSubmitter>,
    in_flight: AtomicBool,
}

impl PairingFlow {
    /// Creates the flow over the given services.
    pub fn new(
        registry: Arc<ServerRegistry>,
        tokens: Arc<TokenStorage>,
        manager: Arc<ServerManager>,
        encryption: Arc<dyn EncryptionContext>,
        issuer: Arc<dyn TokenIssuer>,
        approvals: Arc<dyn ApprovalSubmitter>,
    ) -> Self {
        Self {
            registry,
            tokens,
            manager,
            encryption,
            issuer,
            approvals,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether an approval is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Parses and approves one pairing link.
    ///
    /// An unparseable link fails with [`PairingError::InvalidLink`] before
    /// the flow claims the in-flight slot, so it never blocks a concurrent
    /// valid approval.
    pub async fn process_pairing_url(&self, url: &str) -> Result<PairingOutcome, PairingError> {
        let request = parse_pairing_url(url).ok_or(PairingError::InvalidLink)?;
        let _guard = self.begin()?;

        let public_key = decode_key_material(&request.public_key)?;
        let credentials = self
            .tokens
            .get_credentials(None)
            .await
            .ok_or(PairingError::NoActiveCredentials)?;
        let secret = decode_key_material(&credentials.secret)?;

        let active_url = self.registry.get_active();
        let effective_url = request
            .server_url
            .clone()
            .or_else(|| active_url.clone())
            .ok_or(PairingError::NoActiveServer)?;

        let mut token = credentials.token.clone();
        let mut cross_server = false;
        if let Some(target) = request.server_url.as_deref() {
            if active_url.as_deref() != Some(target) {
                cross_server = true;
                token = self
                    .issuer
                    .issue_token(&secret, target)
                    .await
                    .map_err(PairingError::Issuance)?;
                let adopted = AuthCredentials {
                    token: token.clone(),
                    secret: credentials.secret.clone(),
                };
                self.tokens.set_credentials(&adopted, Some(target)).await?;
                if !self.manager.has_connection(target) {
                    self.registry.register(target, None)?;
                    self.manager.add_server(target, adopted);
                    info!(server = %target, "adopted server during pairing");
                }
            }
        }

        let legacy_envelope = self.encryption.encrypt_box(&secret, &public_key)?;
        let versioned_envelope = self.encryption.encrypt_box(
            &versioned_ack_plaintext(&self.encryption.content_data_key()),
            &public_key,
        )?;

        self.approvals
            .submit_approval(
                &token,
                &request.public_key,
                &legacy_envelope,
                &versioned_envelope,
                &effective_url,
            )
            .await
            .map_err(|err| {
                warn!(server = %effective_url, error = %err, "pairing approval rejected");
                PairingError::Approval(err)
            })?;

        info!(server = %effective_url, cross_server, "terminal pairing approved");
        Ok(PairingOutcome {
            server_url: effective_url,
            cross_server,
        })
    }

    fn begin(&self) -> Result<FlightGuard<'_>, PairingError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PairingError::Busy);
        }
        Ok(FlightGuard(&self.in_flight))
    }
}

/// Releases the in-flight slot on drop, success and failure alike.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
