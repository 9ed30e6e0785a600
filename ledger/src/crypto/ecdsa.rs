//! ECDSA signatures on secp256k1.
//!
//! Actor and validator signatures use ECDSA over the secp256k1 curve with
//! RFC 6979 deterministic nonces (no RNG at signing time). The message is
//! hashed with SHA-256 before the curve operation, which is the default
//! digest `k256` wires up for this curve.
//!
//! ## Encodings
//!
//! - Public keys: SEC1 compressed points, 33 bytes, hex — 66 characters.
//! - Signatures: ASN.1 DER, hex. DER length varies (70–72 bytes), so
//!   callers must not assume a fixed signature width.
//!
//! Private key material never appears in `Debug` output or logs.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

/// Errors from key handling and signature verification.
///
/// Deliberately coarse: the difference between "corrupt DER" and "wrong
/// key" is not something we explain to callers in detail.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid private key material")]
    InvalidPrivateKey,

    #[error("invalid public key: not a valid secp256k1 point encoding")]
    InvalidPublicKey,

    #[error("malformed signature encoding")]
    MalformedSignature,
}

/// A secp256k1 keypair held in memory for signing.
///
/// Created fresh by the key store on `generate`, or rebuilt from sealed
/// key material on demand. The private scalar is dropped as soon as the
/// keypair goes out of scope; nothing here persists it.
pub struct ActorKeypair {
    signing_key: SigningKey,
}

impl ActorKeypair {
    /// Generate a fresh keypair from OS randomness.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Rebuild a keypair from a hex-encoded 32-byte private scalar.
    pub fn from_private_hex(private_hex: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(private_hex).map_err(|_| SignatureError::InvalidPrivateKey)?;
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|_| SignatureError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Hex-encoded private scalar. Handed out exactly once per
    /// generation by the key store; handle accordingly.
    pub fn private_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Hex-encoded SEC1 compressed public key (66 characters).
    pub fn public_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_sec1_bytes())
    }

    /// Sign a message: SHA-256 prehash, then ECDSA. Returns the DER
    /// signature as hex.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(message);
        hex::encode(signature.to_der().as_bytes())
    }
}

impl fmt::Debug for ActorKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The private scalar stays out of Debug output, full stop.
        write!(f, "ActorKeypair(pub={})", self.public_hex())
    }
}

/// Verify a hex DER signature against a hex SEC1 public key.
///
/// Returns `false` for any failure: undecodable key, undecodable
/// signature, or a signature that does not verify. Callers that need to
/// distinguish malformed inputs use [`decode_public_key`] first.
pub fn verify_hex(public_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(verifying_key) = decode_public_key(public_hex) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(&sig_bytes) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}

/// Decode a hex SEC1 public key, validating the point encoding.
pub fn decode_public_key(public_hex: &str) -> Result<VerifyingKey, SignatureError> {
    let bytes = hex::decode(public_hex).map_err(|_| SignatureError::InvalidPublicKey)?;
    VerifyingKey::from_sec1_bytes(&bytes).map_err(|_| SignatureError::InvalidPublicKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let kp = ActorKeypair::generate();
        let sig = kp.sign_hex(b"BATCH001 harvested");
        assert!(verify_hex(&kp.public_hex(), b"BATCH001 harvested", &sig));
    }

    #[test]
    fn wrong_message_fails() {
        let kp = ActorKeypair::generate();
        let sig = kp.sign_hex(b"original message");
        assert!(!verify_hex(&kp.public_hex(), b"tampered message", &sig));
    }

    #[test]
    fn wrong_key_fails() {
        let kp = ActorKeypair::generate();
        let other = ActorKeypair::generate();
        let sig = kp.sign_hex(b"message");
        assert!(!verify_hex(&other.public_hex(), b"message", &sig));
    }

    #[test]
    fn signing_is_deterministic() {
        // RFC 6979: same key + same message = same signature.
        let kp = ActorKeypair::generate();
        assert_eq!(kp.sign_hex(b"stable"), kp.sign_hex(b"stable"));
    }

    #[test]
    fn public_key_is_compressed_sec1() {
        let kp = ActorKeypair::generate();
        let public_hex = kp.public_hex();
        assert_eq!(public_hex.len(), 66);
        assert!(public_hex.starts_with("02") || public_hex.starts_with("03"));
    }

    #[test]
    fn private_hex_roundtrip() {
        let kp = ActorKeypair::generate();
        let restored = ActorKeypair::from_private_hex(&kp.private_hex()).unwrap();
        assert_eq!(kp.public_hex(), restored.public_hex());
    }

    #[test]
    fn rejects_bad_private_material() {
        assert!(ActorKeypair::from_private_hex("not hex").is_err());
        assert!(ActorKeypair::from_private_hex("deadbeef").is_err());
        // All-zero scalar is outside the valid range.
        let zeros = "00".repeat(32);
        assert!(ActorKeypair::from_private_hex(&zeros).is_err());
    }

    #[test]
    fn rejects_bad_public_material() {
        assert!(decode_public_key("zz").is_err());
        assert!(decode_public_key(&"04".repeat(33)).is_err());
        // Valid hex, invalid point.
        assert!(decode_public_key(&format!("02{}", "ff".repeat(32))).is_err());
    }

    #[test]
    fn verify_tolerates_garbage_without_panicking() {
        let kp = ActorKeypair::generate();
        assert!(!verify_hex(&kp.public_hex(), b"msg", "not-a-signature"));
        assert!(!verify_hex("junk-key", b"msg", "deadbeef"));
    }

    #[test]
    fn debug_does_not_leak_private_scalar() {
        let kp = ActorKeypair::generate();
        let rendered = format!("{:?}", kp);
        assert!(!rendered.contains(&kp.private_hex()));
        assert!(rendered.contains(&kp.public_hex()));
    }
}
