//! happy-sync library entry point.
//!
//! Everything an embedder needs to talk to Happy servers lives here: the
//! socket-style [`ServerConnection`] with its reconnecting transport, the
//! persistent [`ServerRegistry`] and [`TokenStorage`], and the
//! [`PairingFlow`] that approves terminal pairing links end to end.
//!
//! The crate is split the same way as the rest of the workspace:
//!
//! * [`infrastructure`] — transports, stores, and cipher seams, each trait
//!   next to an always-compiled mock implementation for tests.
//! * [`application`] — the use cases (`ServerManager`, `PairingFlow`)
//!   composed out of the infrastructure services.

pub mod application;
pub mod infrastructure;

pub use application::manage_servers::{ManagerError, ServerManager};
pub use application::pair_terminal::{PairingError, PairingFlow, PairingOutcome};
pub use infrastructure::auth::{ApprovalSubmitter, AuthError, TokenIssuer};
pub use infrastructure::encryption::{CipherError, EncryptionContext, EntityCipher};
pub use infrastructure::network::reconcile::ReconcileTask;
pub use infrastructure::network::transport::{
    ConnectOptions, ReconnectPolicy, Transport, TransportError, TransportEvent, TransportHandle,
};
pub use infrastructure::network::{
    ConnectionStatus, HttpError, HttpOptions, ObserverId, RpcError, ServerConnection,
};
pub use infrastructure::storage::catalog::{
    CatalogError, CatalogStore, FileCatalogStore, MemoryCatalogStore,
};
pub use infrastructure::storage::registry::ServerRegistry;
pub use infrastructure::storage::token_storage::TokenStorage;
pub use infrastructure::storage::vault::{MemoryVault, SecureVault, VaultError};
