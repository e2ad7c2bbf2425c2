//! Per-server credential persistence on top of the secure vault.
//!
//! Credentials are stored as a small JSON document per slot. The default
//! slot holds the primary account credentials; every other server gets its
//! own slot derived from a hash of its URL, so multi-server setups never
//! clobber each other.
//!
//! Reads degrade to "no credentials" when the vault is unreachable or the
//! stored document is malformed — callers treat that the same as a signed
//! out state. Writes and removals surface their errors, since silently
//! dropping a token write would strand the user mid-pairing.

use std::collections::HashMap;
use std::sync::Arc;

use happy_core::{credential_slot, AuthCredentials, DEFAULT_CREDENTIAL_SLOT};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::vault::{SecureVault, VaultError};

/// Credential store keyed by server URL, backed by a [`SecureVault`].
pub struct TokenStorage {
    vault: Arc<dyn SecureVault>,
    // One async mutex per slot so concurrent writes to the same server
    // serialize while different servers proceed in parallel.
    slot_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenStorage {
    /// Creates a store over `vault`.
    pub fn new(vault: Arc<dyn SecureVault>) -> Self {
        Self {
            vault,
            slot_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the credentials for `server_url`, or the default-slot
    /// credentials when `None`.
    ///
    /// A vault failure or an unreadable document is reported as `None`.
    pub async fn get_credentials(&self, server_url: Option<&str>) -> Option<AuthCredentials> {
        let slot = slot_for(server_url);
        let lock = self.slot_lock(&slot);
        let _g = lock.lock().await;
        match self.vault.get(&slot).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(credentials) => Some(credentials),
                Err(err) => {
                    warn!(slot = %slot, error = %err, "stored credentials unreadable, treating as absent");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(slot = %slot, error = %err, "vault read failed, treating credentials as absent");
                None
            }
        }
    }

    /// Stores `credentials` for `server_url`, or in the default slot when
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError`] when the vault rejects the write.
    pub async fn set_credentials(
        &self,
        credentials: &AuthCredentials,
        server_url: Option<&str>,
    ) -> Result<(), VaultError> {
        let slot = slot_for(server_url);
        let lock = self.slot_lock(&slot);
        let _g = lock.lock().await;
        let json = serde_json::to_string(credentials)
            .map_err(|err| VaultError::Rejected(err.to_string()))?;
        self.vault.set(&slot, &json).await?;
        debug!(slot = %slot, "stored credentials");
        Ok(())
    }

    /// Removes the credentials for `server_url`, or the default slot when
    /// `None`. Removing absent credentials is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError`] when the vault rejects the removal.
    pub async fn remove_credentials(&self, server_url: Option<&str>) -> Result<(), VaultError> {
        let slot = slot_for(server_url);
        let lock = self.slot_lock(&slot);
        let _g = lock.lock().await;
        self.vault.delete(&slot).await?;
        debug!(slot = %slot, "removed credentials");
        Ok(())
    }

    fn slot_lock(&self, slot: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.slot_locks
            .lock()
            .entry(slot.to_string())
            .or_default()
            .clone()
    }
}

fn slot_for(server_url: Option<&str>) -> String {
    match server_url {
        Some(url) => credential_slot(url),
        None => DEFAULT_CREDENTIAL_SLOT.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
