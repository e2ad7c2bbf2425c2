//! Encryption seams the host application plugs its key material into.
//!
//! The sync crate never sees raw key policy. It asks the
//! [`EncryptionContext`] for an [`EntityCipher`] when it needs to seal RPC
//! traffic for one session or machine, for the anonymous-box primitive when
//! it builds pairing envelopes, and for the account's content data key when
//! a pairing acknowledgement must carry it.
//!
//! Entity ciphers are async: real implementations may have to fetch or
//! unwrap the entity's key before the first use.

use std::sync::Arc;

use async_trait::async_trait;
use happy_core::EntityKind;
use thiserror::Error;

pub mod mock;

/// Error type for cipher operations.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Sealing failed.
    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// Unsealing failed (wrong key, truncated or tampered ciphertext).
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// The host application's key material, as seen by the sync crate.
pub trait EncryptionContext: Send + Sync {
    /// Returns the cipher for one entity, or `None` when no key has been
    /// discovered for it yet.
    fn entity_cipher(&self, kind: EntityKind, entity_id: &str) -> Option<Arc<dyn EntityCipher>>;

    /// Seals `plain` so only the holder of the secret key matching
    /// `recipient_public_key` can open it. Used for pairing envelopes.
    fn encrypt_box(
        &self,
        plain: &[u8],
        recipient_public_key: &[u8],
    ) -> Result<Vec<u8>, CipherError>;

    /// The account's current content data key.
    fn content_data_key(&self) -> Vec<u8>;
}

/// Symmetric cipher scoped to exactly one entity.
#[async_trait]
pub trait EntityCipher: Send + Sync {
    /// Seals `plain` under the entity's key.
    async fn encrypt_raw(&self, plain: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Opens `ciphertext` sealed under the entity's key.
    async fn decrypt_raw(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}
