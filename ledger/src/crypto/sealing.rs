//! AES-256-GCM sealing for private keys at rest.
//!
//! Private keys never touch the database in plaintext. Each key is sealed
//! under a key derived from the host's shared secret and the owning user:
//!
//! ```text
//! sealing_key = SHA-256(secret || ":" || user_id)
//! ```
//!
//! ## Wire format
//!
//! Sealed output is three hex fields joined by `:`:
//!
//! ```text
//! iv_hex ":" tag_hex ":" ciphertext_hex
//! ```
//!
//! The IV is 12 random bytes per seal, the tag is the 16-byte GCM
//! authentication tag. A tag mismatch on open surfaces as
//! [`SealingError::DecryptFailed`] — a different condition from "no such
//! user", and callers keep the two distinct.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH};
use crate::crypto::hash::sha256_raw;

/// Errors from sealing and opening.
///
/// Kept vague about *why* decryption failed. Wrong key and corrupted
/// ciphertext are indistinguishable on purpose.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealingError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed: wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("malformed sealed value: expected iv:tag:ciphertext hex fields")]
    MalformedSealed,
}

/// Derive the per-user sealing key from the host secret.
pub fn derive_sealing_key(secret: &str, user_id: i64) -> [u8; AES_KEY_LENGTH] {
    sha256_raw(format!("{secret}:{user_id}").as_bytes())
}

/// Seal plaintext under the given key, producing the `iv:tag:ct` encoding.
pub fn seal(key: &[u8; AES_KEY_LENGTH], plaintext: &[u8]) -> Result<String, SealingError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SealingError::EncryptFailed)?;

    let mut iv = [0u8; AES_NONCE_LENGTH];
    OsRng.fill_bytes(&mut iv);

    // aes-gcm appends the 16-byte tag to the ciphertext; the wire format
    // wants it as its own field, so split it back off.
    let sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| SealingError::EncryptFailed)?;
    let split = sealed.len() - AES_TAG_LENGTH;
    let (ciphertext, tag) = sealed.split_at(split);

    Ok(format!(
        "{}:{}:{}",
        hex::encode(iv),
        hex::encode(tag),
        hex::encode(ciphertext)
    ))
}

/// Open a sealed `iv:tag:ct` value, returning the plaintext.
///
/// # Errors
///
/// [`SealingError::MalformedSealed`] when the encoding is not three hex
/// fields of the right widths; [`SealingError::DecryptFailed`] when the
/// key is wrong or the ciphertext/tag fail authentication.
pub fn open_sealed(key: &[u8; AES_KEY_LENGTH], sealed: &str) -> Result<Vec<u8>, SealingError> {
    let mut parts = sealed.split(':');
    let (Some(iv_hex), Some(tag_hex), Some(ct_hex), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SealingError::MalformedSealed);
    };

    let iv = hex::decode(iv_hex).map_err(|_| SealingError::MalformedSealed)?;
    let tag = hex::decode(tag_hex).map_err(|_| SealingError::MalformedSealed)?;
    let ciphertext = hex::decode(ct_hex).map_err(|_| SealingError::MalformedSealed)?;
    if iv.len() != AES_NONCE_LENGTH || tag.len() != AES_TAG_LENGTH {
        return Err(SealingError::MalformedSealed);
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SealingError::DecryptFailed)?;
    let mut combined = ciphertext;
    combined.extend_from_slice(&tag);

    cipher
        .decrypt(Nonce::from_slice(&iv), combined.as_slice())
        .map_err(|_| SealingError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; AES_KEY_LENGTH] {
        derive_sealing_key("unit-test-secret", 7)
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = test_key();
        let sealed = seal(&key, b"a very private scalar").unwrap();
        let opened = open_sealed(&key, &sealed).unwrap();
        assert_eq!(opened, b"a very private scalar");
    }

    #[test]
    fn sealed_encoding_shape() {
        let key = test_key();
        let sealed = seal(&key, b"payload").unwrap();
        let parts: Vec<&str> = sealed.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), AES_NONCE_LENGTH * 2);
        assert_eq!(parts[1].len(), AES_TAG_LENGTH * 2);
        assert_eq!(parts[2].len(), b"payload".len() * 2);
    }

    #[test]
    fn derived_keys_differ_per_user() {
        let a = derive_sealing_key("secret", 1);
        let b = derive_sealing_key("secret", 2);
        assert_ne!(a, b);
    }

    #[test]
    fn derived_keys_differ_per_secret() {
        let a = derive_sealing_key("secret-a", 1);
        let b = derive_sealing_key("secret-b", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn derivation_is_stable() {
        // Changing this construction re-keys every stored private key.
        assert_eq!(
            derive_sealing_key("secret", 1),
            crate::crypto::hash::sha256_raw(b"secret:1")
        );
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let sealed = seal(&test_key(), b"secret").unwrap();
        let wrong = derive_sealing_key("unit-test-secret", 8);
        assert_eq!(open_sealed(&wrong, &sealed), Err(SealingError::DecryptFailed));
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let key = test_key();
        let sealed = seal(&key, b"secret").unwrap();
        let mut parts: Vec<String> = sealed.split(':').map(String::from).collect();
        // Flip the first ciphertext nibble.
        let flipped = if parts[2].starts_with('0') { "1" } else { "0" };
        parts[2].replace_range(0..1, flipped);
        let tampered = parts.join(":");
        assert_eq!(open_sealed(&key, &tampered), Err(SealingError::DecryptFailed));
    }

    #[test]
    fn tampered_tag_fails_to_open() {
        let key = test_key();
        let sealed = seal(&key, b"secret").unwrap();
        let mut parts: Vec<String> = sealed.split(':').map(String::from).collect();
        let flipped = if parts[1].starts_with('0') { "1" } else { "0" };
        parts[1].replace_range(0..1, flipped);
        assert_eq!(
            open_sealed(&key, &parts.join(":")),
            Err(SealingError::DecryptFailed)
        );
    }

    #[test]
    fn malformed_encodings_are_distinct_from_decrypt_failure() {
        let key = test_key();
        for bad in [
            "",
            "only-one-field",
            "aa:bb",
            "aa:bb:cc:dd",
            "zz:bb:cc",
            "aabb:ccdd:eeff", // hex, but wrong field widths
        ] {
            assert_eq!(open_sealed(&key, bad), Err(SealingError::MalformedSealed));
        }
    }

    #[test]
    fn iv_is_fresh_per_seal() {
        let key = test_key();
        let a = seal(&key, b"same plaintext").unwrap();
        let b = seal(&key, b"same plaintext").unwrap();
        let iv_a = a.split(':').next().unwrap();
        let iv_b = b.split(':').next().unwrap();
        assert_ne!(iv_a, iv_b);
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = test_key();
        let sealed = seal(&key, b"").unwrap();
        assert_eq!(open_sealed(&key, &sealed).unwrap(), Vec::<u8>::new());
    }
}
