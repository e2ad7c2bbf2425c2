//! Registered-server catalog and active-server pointer.
//!
//! The registry remembers every server the user has ever paired with and
//! which one is currently active. Entries are stored as a JSON array under
//! a single catalog key, the active pointer as a bare URL string under a
//! second key, so any [`CatalogStore`] can back it without schema support.
//!
//! Reads degrade: a missing, unreadable, or malformed catalog behaves like
//! an empty registry so the rest of the app keeps working. Writes surface
//! their errors, because losing a registration silently would strand the
//! user's credentials.
//!
//! Removing a server deliberately leaves its vault credentials in place.
//! Re-adding the same server later picks them back up without another
//! pairing ceremony.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use happy_core::{hostname_of, ServerEntry};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::catalog::{CatalogError, CatalogStore};

/// Catalog key holding the JSON array of [`ServerEntry`] records.
pub const SERVERS_KEY: &str = "registered-servers";

/// Catalog key holding the active server URL.
pub const ACTIVE_SERVER_KEY: &str = "active-server-url";

/// Multi-server registry over a [`CatalogStore`].
pub struct ServerRegistry {
    store: Arc<dyn CatalogStore>,
    // One guard across entries and the active pointer, so removal updates
    // both without another writer interleaving.
    guard: Mutex<()>,
}

impl ServerRegistry {
    /// Creates a registry over `store`.
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    /// Returns every registered server, oldest registration first.
    pub fn list(&self) -> Vec<ServerEntry> {
        let _g = self.guard.lock();
        self.read_entries()
    }

    /// Registers `url`, or refreshes its `last_used_at` when already present.
    ///
    /// A `label` is stored as given on a new entry; on an existing entry it
    /// only overwrites when non-empty, so a labelless re-registration never
    /// erases a name the user chose.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the updated list cannot be persisted.
    pub fn register(&self, url: &str, label: Option<&str>) -> Result<(), CatalogError> {
        let _g = self.guard.lock();
        let mut entries = self.read_entries();
        let now = now_ms();
        match entries.iter_mut().find(|e| e.url == url) {
            Some(entry) => {
                entry.last_used_at = entry.last_used_at.max(now);
                if let Some(label) = label.filter(|l| !l.is_empty()) {
                    entry.label = Some(label.to_string());
                }
                debug!(server = %url, "refreshed existing server registration");
            }
            None => {
                entries.push(ServerEntry {
                    url: url.to_string(),
                    label: label.map(str::to_string),
                    added_at: now,
                    last_used_at: now,
                });
                debug!(server = %url, "registered new server");
            }
        }
        self.write_entries(&entries)
    }

    /// Renames the entry for `url`. An empty `label` clears the name so
    /// displays fall back to the hostname. Does nothing when `url` is not
    /// registered, and never touches the usage timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the updated list cannot be persisted.
    pub fn update_label(&self, url: &str, label: &str) -> Result<(), CatalogError> {
        let _g = self.guard.lock();
        let mut entries = self.read_entries();
        match entries.iter_mut().find(|e| e.url == url) {
            Some(entry) => {
                entry.label = if label.is_empty() {
                    None
                } else {
                    Some(label.to_string())
                };
            }
            None => {
                debug!(server = %url, "label update for unregistered server ignored");
                return Ok(());
            }
        }
        self.write_entries(&entries)
    }

    /// Removes `url` from the registry and clears the active pointer when it
    /// was pointing there.
    ///
    /// Vault credentials for the server are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the catalog cannot be updated.
    pub fn remove(&self, url: &str) -> Result<(), CatalogError> {
        let _g = self.guard.lock();
        let mut entries = self.read_entries();
        entries.retain(|e| e.url != url);
        self.write_entries(&entries)?;
        if self.read_active().as_deref() == Some(url) {
            self.store.delete(ACTIVE_SERVER_KEY)?;
            debug!(server = %url, "cleared active server pointer");
        }
        Ok(())
    }

    /// Points the active-server pointer at `url`.
    ///
    /// The pointer is independent of the entry list; pointing it at an
    /// unregistered URL is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the pointer cannot be persisted.
    pub fn set_active(&self, url: &str) -> Result<(), CatalogError> {
        let _g = self.guard.lock();
        self.store.set(ACTIVE_SERVER_KEY, url)
    }

    /// Returns the active server URL, or `None` when unset or unreadable.
    pub fn get_active(&self) -> Option<String> {
        let _g = self.guard.lock();
        self.read_active()
    }

    /// Display-friendly hostname for `url`; falls back to the raw string
    /// when it does not parse as a URL.
    pub fn hostname(&self, url: &str) -> String {
        hostname_of(url)
    }

    fn read_entries(&self) -> Vec<ServerEntry> {
        match self.store.get_string(SERVERS_KEY) {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(error = %err, "server list unreadable, treating as empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "catalog read failed, treating server list as empty");
                Vec::new()
            }
        }
    }

    fn read_active(&self) -> Option<String> {
        match self.store.get_string(ACTIVE_SERVER_KEY) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "catalog read failed, treating active server as unset");
                None
            }
        }
    }

    fn write_entries(&self, entries: &[ServerEntry]) -> Result<(), CatalogError> {
        let json = serde_json::to_string(entries)?;
        self.store.set(SERVERS_KEY, &json)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
