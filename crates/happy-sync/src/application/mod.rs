//! Application layer use cases for the sync crate.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure business rules, here mostly in `happy-core`) and the infrastructure
//! (network transports, key-value stores, platform vaults).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** the infrastructure services to fulfil a user goal
//!   (e.g., "approve this pairing link, issuing a cross-server token if it
//!   points somewhere else").
//! - **Depend on the trait seams** (`Transport`, `SecureVault`,
//!   `EncryptionContext`, ...) so tests can swap real implementations for
//!   the mocks that live next to each trait.
//!
//! # Sub-modules
//!
//! - **`manage_servers`** – Owns the pool of live [`ServerConnection`]s, one
//!   per registered server, and keeps it consistent with the registry.
//!
//! - **`pair_terminal`** – The pairing approval flow: parse the scanned
//!   link, resolve the target server, issue a token when the link crosses
//!   servers, and submit the double-encrypted approval.
//!
//! [`ServerConnection`]: crate::infrastructure::network::ServerConnection

pub mod manage_servers;
pub mod pair_terminal;
