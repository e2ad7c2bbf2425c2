//! Acknowledgement envelope layout for the pairing handshake.
//!
//! The phone answers a scanned public key with two box-encrypted envelopes so
//! both old and new terminal builds can complete the handshake:
//!
//! - **Legacy envelope** — the plaintext is the account's long-lived secret,
//!   nothing else. Old terminals derive everything from it.
//! - **Versioned envelope** — the plaintext is a single version byte followed
//!   by version-specific content. Version 0 carries the raw bytes of the
//!   current content data key. Future versions can change the content without
//!   breaking old scanners, which ignore envelopes they cannot read.
//!
//! Box encryption itself is a collaborator concern; this module only fixes
//! the plaintext layout and the transport encoding of scanned key material.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use thiserror::Error;

/// Version byte of the current versioned acknowledgement envelope.
pub const ACK_VERSION_V0: u8 = 0;

/// Errors raised while decoding scanned key material.
#[derive(Debug, Error, PartialEq)]
pub enum KeyDecodeError {
    /// The link carried no key bytes at all.
    #[error("key material is empty")]
    Empty,

    /// The text is not valid base64url.
    #[error("key material is not valid base64url: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
}

/// Builds the plaintext of the versioned acknowledgement envelope:
/// the version byte 0 followed by the raw content data key.
pub fn versioned_ack_plaintext(content_data_key: &[u8]) -> Vec<u8> {
    let mut plaintext = Vec::with_capacity(1 + content_data_key.len());
    plaintext.push(ACK_VERSION_V0);
    plaintext.extend_from_slice(content_data_key);
    plaintext
}

/// Decodes base64url key material (a scanned public key or a stored secret)
/// into raw bytes. Accepts both padded and unpadded spellings since links in
/// the wild carry either.
pub fn decode_key_material(text: &str) -> Result<Vec<u8>, KeyDecodeError> {
    if text.is_empty() {
        return Err(KeyDecodeError::Empty);
    }
    let bytes = if text.ends_with('=') {
        URL_SAFE.decode(text)?
    } else {
        URL_SAFE_NO_PAD.decode(text)?
    };
    Ok(bytes)
}
