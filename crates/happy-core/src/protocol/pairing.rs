//! Pairing-link grammar.
//!
//! A terminal shows a one-time link (usually as a QR code) that the phone
//! scans to pair the terminal into the account. Two spellings exist in the
//! wild and both must keep parsing forever:
//!
//! - New: `happy://terminal?key=<base64url>&server=<percent-encoded-url>`
//!   (`server` is optional)
//! - Legacy: `happy://terminal?<base64url>` — everything after the `?` is the
//!   public key, no server hint
//!
//! The remainder is treated as the new format exactly when it begins with
//! `key=`; anything else is a legacy key taken verbatim. Malformed input
//! yields `None` rather than an error so callers can branch without error
//! handling.

use url::form_urlencoded;

use crate::protocol::constants::PAIRING_URL_PREFIX;

/// A parsed pairing link. Ephemeral: consumed once per pairing attempt and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRequest {
    /// The scanned public key, still in its base64url transport encoding.
    /// Decoding to raw bytes is the handshake's first step, not the parser's.
    pub public_key: String,
    /// Optional server hint naming the server the terminal is attached to.
    /// Absent on legacy links and on links from the default deployment.
    pub server_url: Option<String>,
}

/// Parses a pairing link in either supported spelling.
///
/// Returns `None` when the input does not start with the exact
/// `happy://terminal?` prefix, or when the new format carries a missing or
/// empty `key` parameter. A legacy remainder is returned verbatim, even when
/// empty, matching the links produced by old terminal builds.
pub fn parse_pairing_url(url: &str) -> Option<PairingRequest> {
    let tail = url.strip_prefix(PAIRING_URL_PREFIX)?;

    // New format: the remainder is a query string beginning with `key=`.
    if tail.starts_with("key=") {
        let mut key: Option<String> = None;
        let mut server: Option<String> = None;
        for (name, value) in form_urlencoded::parse(tail.as_bytes()) {
            match name.as_ref() {
                "key" if key.is_none() => key = Some(value.into_owned()),
                "server" if server.is_none() => server = Some(value.into_owned()),
                _ => {}
            }
        }
        let key = key.filter(|k| !k.is_empty())?;
        return Some(PairingRequest {
            public_key: key,
            server_url: server.filter(|s| !s.is_empty()),
        });
    }

    // Legacy format: the whole remainder is the public key.
    Some(PairingRequest {
        public_key: tail.to_string(),
        server_url: None,
    })
}
