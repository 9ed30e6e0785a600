//! # Cryptographic Primitives
//!
//! Every hash, signature, and sealed secret in the ledger flows through
//! this module. The choices are boring on purpose:
//!
//! - **SHA-256** for all digests — transaction hashes, block hashes,
//!   Merkle folding, key derivation. One hash function, one wire format.
//! - **ECDSA over secp256k1** for actor and validator signatures,
//!   DER-encoded and hex-rendered.
//! - **AES-256-GCM** for sealing private keys at rest.
//! - **OS randomness** for replay nonces and GCM IVs.
//!
//! Everything here is a thin, typed wrapper around audited
//! implementations (`sha2`, `k256`, `aes-gcm`). There is no hand-rolled
//! cryptography anywhere in this crate.

pub mod ecdsa;
pub mod hash;
pub mod nonce;
pub mod sealing;

pub use ecdsa::{ActorKeypair, SignatureError};
pub use hash::{sha256_hex, sha256_raw};
pub use nonce::random_nonce_hex;
pub use sealing::{derive_sealing_key, open_sealed, seal, SealingError};
