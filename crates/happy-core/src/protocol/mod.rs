//! Protocol module containing the pairing-link grammar, the acknowledgement
//! envelope layout, and constants shared with the socket layer.

pub mod constants;
pub mod envelope;
pub mod pairing;

pub use envelope::{decode_key_material, versioned_ack_plaintext, KeyDecodeError};
pub use pairing::{parse_pairing_url, PairingRequest};
