//! SHA-256 digests.
//!
//! The ledger speaks exactly one digest dialect: SHA-256 rendered as
//! 64 lowercase hex characters. Structured values are rendered to their
//! canonical JSON form by the caller before hashing; this module only
//! ever sees bytes.

use sha2::{Digest, Sha256};

/// SHA-256 of the input, as a fixed-size array.
pub fn sha256_raw(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 of the input, as 64 lowercase hex characters.
///
/// This is the rendering stored in every `hash`, `previous_hash`, and
/// `merkle_root` field.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_raw(data))
}
