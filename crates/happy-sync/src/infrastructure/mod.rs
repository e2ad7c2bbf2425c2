//! Infrastructure layer for the sync crate.
//!
//! Contains the outward-facing adapters: the reconnecting server transport,
//! persistent catalog and vault storage, and the cipher seams the host
//! application plugs its key material into. Every service is fronted by a
//! trait with an always-compiled mock sibling, so the use cases in
//! `application` can be exercised without a server or a platform keychain.

pub mod auth;
pub mod encryption;
pub mod network;
pub mod storage;
