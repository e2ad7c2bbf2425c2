//! Persistent storage infrastructure for the sync crate.
//!
//! # Sub-modules
//!
//! - **`catalog`** – The plain key-value catalog behind the server registry.
//!   Ships a TOML-file-backed store and an in-memory store for tests.
//!
//! - **`registry`** – The multi-server catalog: registered server entries
//!   plus the active-server pointer, stored as JSON strings in the catalog.
//!
//! - **`vault`** – The secure string store trait. Real implementations wrap
//!   a platform keychain; the crate only ships the seam and an in-memory
//!   stand-in.
//!
//! - **`token_storage`** – Per-server credential persistence on top of the
//!   vault, with slot derivation and per-slot write serialization.

pub mod catalog;
pub mod registry;
pub mod token_storage;
pub mod vault;
