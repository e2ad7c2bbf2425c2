//! Connection-pool management across registered servers.
//!
//! A [`ServerManager`] keeps at most one live [`ServerConnection`] per
//! server URL and keeps that pool consistent with the [`ServerRegistry`]:
//! adding a server opens its connection, removing one disposes the
//! connection and drops the registry entry. Vault credentials deliberately
//! survive removal, so a removed server can be re-added without pairing
//! again.

use std::collections::HashMap;
use std::sync::Arc;

use happy_core::AuthCredentials;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

use crate::infrastructure::encryption::EncryptionContext;
use crate::infrastructure::network::transport::Transport;
use crate::infrastructure::network::ServerConnection;
use crate::infrastructure::storage::catalog::CatalogError;
use crate::infrastructure::storage::registry::ServerRegistry;
use crate::infrastructure::storage::token_storage::TokenStorage;

/// Error type for pool-level operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// No active server is configured in the registry.
    #[error("no active server is configured")]
    NoActiveServer,

    /// Neither a per-server nor a default credential exists for the server.
    #[error("no credentials stored for {server_url}")]
    NoCredentials { server_url: String },
}

/// Owns the live connections, one per server URL.
pub struct ServerManager {
    transport: Arc<dyn Transport>,
    encryption: Arc<dyn EncryptionContext>,
    registry: Arc<ServerRegistry>,
    connections: Mutex<HashMap<String, ServerConnection>>,
}

impl ServerManager {
    /// Creates an empty pool over the given services.
    pub fn new(
        transport: Arc<dyn Transport>,
        encryption: Arc<dyn EncryptionContext>,
        registry: Arc<ServerRegistry>,
    ) -> Self {
        Self {
            transport,
            encryption,
            registry,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// The registry this pool is kept consistent with.
    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Whether a live connection exists for `server_url`.
    pub fn has_connection(&self, server_url: &str) -> bool {
        self.connections.lock().contains_key(server_url)
    }

    /// Returns the live connection for `server_url`, if any.
    pub fn connection(&self, server_url: &str) -> Option<ServerConnection> {
        self.connections.lock().get(server_url).cloned()
    }

    /// Opens a connection for `server_url` with `credentials` and adds it
    /// to the pool. When a connection for that URL already exists it is
    /// returned unchanged and `credentials` is ignored.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add_server(&self, server_url: &str, credentials: AuthCredentials) -> ServerConnection {
        let mut connections = self.connections.lock();
        if let Some(existing) = connections.get(server_url) {
            return existing.clone();
        }
        let connection = ServerConnection::new(
            server_url,
            credentials,
            Arc::clone(&self.encryption),
            Arc::clone(&self.transport),
        );
        connection.connect();
        connections.insert(server_url.to_string(), connection.clone());
        info!(server = %server_url, "server added to connection pool");
        connection
    }

    /// Disposes the live connection for `server_url` (if any) and removes
    /// the server from the registry. Stored credentials are kept.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the registry update fails; the
    /// connection is disposed regardless.
    pub fn remove_server(&self, server_url: &str) -> Result<(), CatalogError> {
        if let Some(connection) = self.connections.lock().remove(server_url) {
            connection.disconnect();
            info!(server = %server_url, "server removed from connection pool");
        }
        self.registry.remove(server_url)
    }

    /// Ensures a live connection for the registry's active server,
    /// resolving credentials from `tokens`: the server's own slot first,
    /// the default slot as fallback.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NoActiveServer`] when no active server is
    /// set and [`ManagerError::NoCredentials`] when neither slot holds
    /// credentials.
    pub async fn connect_active(
        &self,
        tokens: &TokenStorage,
    ) -> Result<ServerConnection, ManagerError> {
        let server_url = self
            .registry
            .get_active()
            .ok_or(ManagerError::NoActiveServer)?;
        if let Some(existing) = self.connection(&server_url) {
            return Ok(existing);
        }
        let credentials = match tokens.get_credentials(Some(&server_url)).await {
            Some(credentials) => credentials,
            None => tokens
                .get_credentials(None)
                .await
                .ok_or_else(|| ManagerError::NoCredentials {
                    server_url: server_url.clone(),
                })?,
        };
        Ok(self.add_server(&server_url, credentials))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
