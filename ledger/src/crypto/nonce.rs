//! Replay nonces.
//!
//! Every transaction carries 32 bytes of OS randomness, hex-encoded.
//! The nonce makes otherwise-identical event payloads hash differently,
//! which is what lets the replay set treat `tx.hash` as a one-time token.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::config::TX_NONCE_BYTES;

/// 32 cryptographically random bytes as 64 lowercase hex characters.
pub fn random_nonce_hex() -> String {
    let mut bytes = [0u8; TX_NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_64_hex_chars() {
        let nonce = random_nonce_hex();
        assert_eq!(nonce.len(), 64);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(nonce, nonce.to_lowercase());
    }

    #[test]
    fn nonces_do_not_repeat() {
        // 256 bits of OsRng output colliding would mean the RNG is broken.
        let a = random_nonce_hex();
        let b = random_nonce_hex();
        assert_ne!(a, b);
    }
}
