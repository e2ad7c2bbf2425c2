//! Key-value catalog storage for non-secret sync state.
//!
//! The registry persists its server list and active-server pointer through
//! the [`CatalogStore`] trait. Two implementations ship with the crate:
//!
//! - [`FileCatalogStore`] – a TOML file at the platform-appropriate location:
//!   - Windows:  `%APPDATA%\Happy\catalog.toml`
//!   - Linux:    `~/.config/happy/catalog.toml`
//!   - macOS:    `~/Library/Application Support/Happy/catalog.toml`
//! - [`MemoryCatalogStore`] – a plain in-memory map for tests.
//!
//! Values are opaque strings; callers layer their own encoding (the registry
//! stores JSON) on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

/// Error type for catalog store operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing catalog at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog file content could not be parsed.
    #[error("failed to parse catalog TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The catalog could not be serialized to TOML.
    #[error("failed to serialize catalog: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value could not be encoded for storage.
    #[error("failed to encode catalog value: {0}")]
    Encode(#[from] serde_json::Error),

    /// The backing store refused the operation.
    #[error("catalog store rejected the operation: {0}")]
    Rejected(String),
}

/// Plain string key-value store used for non-secret sync state.
///
/// Implementations must be safe to share across threads; the registry
/// serializes its own read-modify-write cycles on top.
#[cfg_attr(test, mockall::automock)]
pub trait CatalogStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent.
    fn get_string(&self, key: &str) -> Result<Option<String>, CatalogError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), CatalogError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), CatalogError>;
}

// ── In-memory store ───────────────────────────────────────────────────────────

/// In-memory [`CatalogStore`] for tests and ephemeral embedders.
#[derive(Default)]
pub struct MemoryCatalogStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryCatalogStore {
    /// Creates an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, CatalogError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CatalogError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CatalogError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ── File-backed store ─────────────────────────────────────────────────────────

/// TOML-file-backed [`CatalogStore`].
///
/// The whole catalog is held in memory and written through on every
/// mutation, so reads never touch the disk after construction.
pub struct FileCatalogStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileCatalogStore {
    /// Opens the catalog at `path`, loading any existing content.
    ///
    /// A missing file yields an empty catalog. A file that exists but does
    /// not parse is abandoned: the store starts empty and the next write
    /// replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Io`] for file-system errors other than
    /// "not found".
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<BTreeMap<String, String>>(&content) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "catalog file unreadable, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(CatalogError::Io { path, source: e }),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Opens the catalog at the platform default location.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NoPlatformConfigDir`] when the platform config
    /// base directory cannot be determined from the environment, and
    /// [`CatalogError::Io`] for file-system failures.
    pub fn open_default() -> Result<Self, CatalogError> {
        Self::open(catalog_file_path()?)
    }

    /// The file this store reads from and writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), CatalogError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| CatalogError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(entries)?;
        std::fs::write(&self.path, content).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

impl CatalogStore for FileCatalogStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, CatalogError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CatalogError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn delete(&self, key: &str) -> Result<(), CatalogError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&entries)
    }
}

/// Determines the platform-appropriate directory for the catalog file.
///
/// # Errors
///
/// Returns [`CatalogError::NoPlatformConfigDir`] when the platform config
/// base directory cannot be determined from the environment.
pub fn catalog_dir() -> Result<PathBuf, CatalogError> {
    platform_config_dir().ok_or(CatalogError::NoPlatformConfigDir)
}

/// Resolves the full path to the catalog file.
///
/// # Errors
///
/// Returns [`CatalogError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn catalog_file_path() -> Result<PathBuf, CatalogError> {
    Ok(catalog_dir()?.join("catalog.toml"))
}

/// Resolves the platform config base directory without the `Happy` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Happy"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("happy"))
    }

    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/Happy
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Happy")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
