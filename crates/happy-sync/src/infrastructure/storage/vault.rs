//! Secure string storage trait for credential material.
//!
//! Tokens and secrets never go through the plain catalog; they live behind
//! [`SecureVault`], which a host application backs with its platform secret
//! store (Keychain, libsecret, DPAPI, ...). The crate itself only ships
//! [`MemoryVault`], an in-memory stand-in for tests and short-lived tools.
//!
//! Vault backends are allowed to be slow or flaky — biometric prompts,
//! locked keyrings — which is why the API is async and why every operation
//! returns a `Result` instead of assuming the store is reachable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Error type for vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The backing store could not be reached (locked keyring, missing
    /// daemon, revoked entitlement).
    #[error("vault unavailable: {0}")]
    Unavailable(String),

    /// The backing store refused the operation.
    #[error("vault rejected the operation: {0}")]
    Rejected(String),
}

/// Async secure string store keyed by opaque slot names.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecureVault: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, VaultError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), VaultError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), VaultError>;
}

/// In-memory [`SecureVault`] for tests and ephemeral embedders.
#[derive(Default)]
pub struct MemoryVault {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryVault {
    /// Creates an empty vault.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SecureVault for MemoryVault {
    async fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
