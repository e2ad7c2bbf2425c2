//! # happy-core
//!
//! Shared library for the Happy multi-server sync layer containing the
//! pairing-link grammar, acknowledgement envelope layout, server catalog
//! entities, and credential-slot addressing.
//!
//! This crate is used by the sync/connection layer and by embedders that only
//! need to inspect pairing links or catalog entries. It has zero dependencies
//! on an async runtime, sockets, or platform storage.
//!
//! # Architecture overview (for beginners)
//!
//! Happy is a mobile client that talks to one or more independent backend
//! servers at the same time. A phone can "pair" a new device (a terminal) into
//! its identity by scanning a one-time link, and it remembers every server it
//! has ever paired against so sessions on all of them stay reachable.
//!
//! This crate (`happy-core`) is the pure foundation. It defines:
//!
//! - **`protocol`** – The pairing-link grammar (`happy://terminal?...` in its
//!   current and legacy spellings), the encrypted acknowledgement envelope
//!   layout, and the constants shared with the socket layer.
//!
//! - **`server`** – The catalog entry for a remembered server plus hostname
//!   and URL-validation helpers.
//!
//! - **`credentials`** – The `{token, secret}` pair persisted in the platform
//!   vault and the deterministic slot names it is filed under.
//!
//! - **`entity`** – The kinds of logical entities (sessions, machines,
//!   artifacts) whose traffic is encrypted under independent data keys.

pub mod credentials;
pub mod entity;
pub mod protocol;
pub mod server;

pub use credentials::{credential_slot, AuthCredentials, DEFAULT_CREDENTIAL_SLOT};
pub use entity::{composite_method, EntityKind};
pub use protocol::envelope::{decode_key_material, versioned_ack_plaintext, KeyDecodeError};
pub use protocol::pairing::{parse_pairing_url, PairingRequest};
pub use server::{hostname_of, validate_server_url, ServerEntry, ServerUrlError};
