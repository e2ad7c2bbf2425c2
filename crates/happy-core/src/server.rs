//! Server catalog entities and URL helpers.
//!
//! A `ServerEntry` is one remembered server relationship. Entries are
//! persisted as a JSON array in the catalog store, so the serde field names
//! here must stay camelCase to keep reading catalogs written by earlier
//! releases.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// One remembered server. `url` is the unique key; re-registering an existing
/// url updates the entry in place without changing its catalog position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
    /// Canonical absolute URL, exactly as registered.
    pub url: String,
    /// Optional user-facing name. Overwritten on re-registration only when a
    /// non-empty label is supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Unix timestamp in milliseconds of the first registration.
    pub added_at: u64,
    /// Unix timestamp in milliseconds of the most recent registration.
    /// Monotonically non-decreasing.
    pub last_used_at: u64,
}

/// Errors from [`validate_server_url`].
#[derive(Debug, Error, PartialEq)]
pub enum ServerUrlError {
    /// The input was empty after trimming.
    #[error("server URL is empty")]
    Empty,

    /// The input is not a parseable absolute URL.
    #[error("server URL is not a valid absolute URL")]
    Invalid,

    /// The URL uses a scheme other than http/https.
    #[error("server URL must use http or https, got {0}")]
    UnsupportedScheme(String),

    /// The URL has no host component.
    #[error("server URL has no host")]
    MissingHost,
}

/// Best-effort hostname extraction for display purposes.
///
/// Returns the host of an absolute URL, or the input string unchanged when it
/// cannot be parsed as a URL (or parses without a host). Never fails: labels
/// fall back to whatever the user typed.
pub fn hostname_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Validates a user-supplied server URL and returns its normalized form
/// (trimmed, trailing slashes stripped).
///
/// Only the shape is checked; whether the host actually answers is the
/// caller's concern. Registration itself stores whatever it is given, so
/// embedders should validate before registering.
///
/// # Errors
///
/// Returns a [`ServerUrlError`] describing the first problem found.
pub fn validate_server_url(input: &str) -> Result<String, ServerUrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ServerUrlError::Empty);
    }
    let parsed = Url::parse(trimmed).map_err(|_| ServerUrlError::Invalid)?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(ServerUrlError::UnsupportedScheme(other.to_string())),
    }
    if parsed.host_str().is_none() {
        return Err(ServerUrlError::MissingHost);
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}
