//! Mock encryption context for unit and integration testing.
//!
//! The mock keeps every operation reversible and assertable:
//!
//! - entity ciphers XOR each byte with a per-entity key, so "encrypted"
//!   payloads are easy to build by hand on the test's side of the wire;
//! - [`encrypt_box`](super::EncryptionContext::encrypt_box) concatenates
//!   the recipient public key and the plaintext, so tests can check both
//!   which key an envelope targeted and what it carried.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use happy_core::EntityKind;
use parking_lot::Mutex;

use super::{CipherError, EncryptionContext, EntityCipher};

/// A mock [`EncryptionContext`] with hand-registered entity ciphers.
pub struct MockEncryption {
    content_key: Vec<u8>,
    ciphers: Mutex<HashMap<(EntityKind, String), Arc<XorCipher>>>,
}

impl MockEncryption {
    /// Creates a context holding `content_key` and no entity ciphers.
    pub fn new(content_key: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            content_key,
            ciphers: Mutex::new(HashMap::new()),
        })
    }

    /// Registers an entity whose cipher XORs every byte with `key`.
    pub fn add_entity(&self, kind: EntityKind, entity_id: &str, key: u8) {
        self.ciphers
            .lock()
            .insert((kind, entity_id.to_string()), Arc::new(XorCipher { key }));
    }

    /// XORs `bytes` with the key registered for an entity. Lets tests build
    /// the server side of an encrypted exchange.
    ///
    /// Panics when the entity was never registered.
    pub fn xor_for(&self, kind: EntityKind, entity_id: &str, bytes: &[u8]) -> Vec<u8> {
        let ciphers = self.ciphers.lock();
        let cipher = ciphers
            .get(&(kind, entity_id.to_string()))
            .expect("entity not registered with MockEncryption");
        cipher.apply(bytes)
    }
}

impl EncryptionContext for MockEncryption {
    fn entity_cipher(&self, kind: EntityKind, entity_id: &str) -> Option<Arc<dyn EntityCipher>> {
        self.ciphers
            .lock()
            .get(&(kind, entity_id.to_string()))
            .cloned()
            .map(|cipher| cipher as Arc<dyn EntityCipher>)
    }

    fn encrypt_box(
        &self,
        plain: &[u8],
        recipient_public_key: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        let mut sealed = recipient_public_key.to_vec();
        sealed.extend_from_slice(plain);
        Ok(sealed)
    }

    fn content_data_key(&self) -> Vec<u8> {
        self.content_key.clone()
    }
}

/// Entity cipher that XORs with a single byte. Encryption and decryption
/// are the same operation.
pub struct XorCipher {
    key: u8,
}

impl XorCipher {
    fn apply(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.iter().map(|b| b ^ self.key).collect()
    }
}

#[async_trait]
impl EntityCipher for XorCipher {
    async fn encrypt_raw(&self, plain: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(self.apply(plain))
    }

    async fn decrypt_raw(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(self.apply(ciphertext))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
