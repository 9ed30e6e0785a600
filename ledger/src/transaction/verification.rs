//! Transaction verification: structural checks and cryptographic validation.
//!
//! Every transaction entering the pending pool must pass
//! [`verify_transaction`]. The checks run cheapest-first (field presence
//! before hashing, hashing before signature verification) so clearly
//! invalid submissions fail fast.

use chrono::Utc;
use thiserror::Error;
use tracing::warn;

use super::builder::Transaction;
use crate::config::{HASH_HEX_LENGTH, MAX_FUTURE_DRIFT, STALE_WARN_AGE};
use crate::crypto::ecdsa::verify_hex;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from transaction verification. Each variant names the first
/// rule the transaction broke.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// A required field is empty or out of range.
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    /// The nonce is not 64 lowercase hex characters.
    #[error("malformed nonce: expected 64 lowercase hex chars")]
    MalformedNonce,

    /// The timestamp is further in the future than the allowed drift.
    #[error("timestamp is {ahead_secs}s in the future (max {max_secs}s)")]
    TimestampInFuture { ahead_secs: i64, max_secs: u64 },

    /// The stored hash does not match the canonical payload.
    #[error("hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },

    /// The transaction is not signed.
    #[error("transaction is unsigned")]
    MissingSignature,

    /// The transaction carries a signature but no public key.
    #[error("signature present but actor public key missing")]
    MissingPublicKey,

    /// The ECDSA signature does not verify against the actor's key.
    #[error("signature does not verify for actor {actor_user_id}")]
    InvalidSignature { actor_user_id: i64 },
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verifies a signed transaction.
///
/// The checks, in order:
///
/// 1. **Required fields** — non-empty `batch_no` and `actor_role`,
///    positive `actor_user_id`.
/// 2. **Nonce shape** — 64 lowercase hex characters.
/// 3. **Timestamp** — at most 60 s in the future. A timestamp older than
///    24 h logs a warning but passes; field data is often backfilled.
/// 4. **Hash integrity** — `hash` equals the SHA-256 of the canonical
///    payload.
/// 5. **Signature present**, **public key present**.
/// 6. **Signature valid** — ECDSA over the canonical payload.
///
/// # Errors
///
/// Returns the first failing check as a [`TransactionError`].
pub fn verify_transaction(tx: &Transaction) -> Result<(), TransactionError> {
    // 1. Required fields.
    if tx.batch_no.trim().is_empty() {
        return Err(TransactionError::MissingField { field: "batch_no" });
    }
    if tx.actor_role.trim().is_empty() {
        return Err(TransactionError::MissingField { field: "actor_role" });
    }
    if tx.actor_user_id <= 0 {
        return Err(TransactionError::MissingField {
            field: "actor_user_id",
        });
    }

    // 2. Nonce shape.
    if tx.nonce.len() != HASH_HEX_LENGTH
        || !tx.nonce.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return Err(TransactionError::MalformedNonce);
    }

    // 3. Timestamp drift.
    let now = Utc::now();
    let ahead = tx.timestamp.signed_duration_since(now);
    if ahead.num_seconds() > MAX_FUTURE_DRIFT.as_secs() as i64 {
        return Err(TransactionError::TimestampInFuture {
            ahead_secs: ahead.num_seconds(),
            max_secs: MAX_FUTURE_DRIFT.as_secs(),
        });
    }
    let age = now.signed_duration_since(tx.timestamp);
    if age.num_seconds() > STALE_WARN_AGE.as_secs() as i64 {
        warn!(
            batch_no = %tx.batch_no,
            age_hours = age.num_hours(),
            "admitting transaction with a stale timestamp"
        );
    }

    // 4. Hash integrity.
    let computed = tx.compute_hash();
    if tx.hash != computed {
        return Err(TransactionError::HashMismatch {
            stored: tx.hash.clone(),
            computed,
        });
    }

    // 5. Signature and key presence.
    let signature = tx
        .actor_signature
        .as_ref()
        .ok_or(TransactionError::MissingSignature)?;
    let public_key = tx
        .actor_public_key
        .as_ref()
        .ok_or(TransactionError::MissingPublicKey)?;

    // 6. ECDSA verification over the canonical payload.
    if !verify_hex(public_key, tx.canonical_payload().as_bytes(), signature) {
        return Err(TransactionError::InvalidSignature {
            actor_user_id: tx.actor_user_id,
        });
    }

    Ok(())
}
