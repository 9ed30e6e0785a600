//! Transaction construction via the builder pattern.
//!
//! The [`TransactionBuilder`] enforces a disciplined construction flow:
//! set the required fields, call `.build()`, and get back an unsigned
//! [`Transaction`] whose `hash` is already derived from its canonical
//! form. Signing happens separately in [`super::signing`]; construction
//! stays testable without key material.
//!
//! ## Canonical form
//!
//! Hashing and signing both consume the same canonical JSON rendering of
//! the payload, produced by [`Transaction::canonical_payload`]:
//!
//! - Field order is fixed (a serialize-only struct with the fields in
//!   wire order; serde emits struct fields in declaration order).
//! - `actor_signature` and `hash` are excluded from their own inputs.
//! - Timestamps render as ISO-8601 UTC with millisecond precision.
//! - Absent optionals render as JSON `null`.
//! - The opaque `transaction_data` object and `document_hashes` map
//!   render with lexicographically sorted keys.
//!
//! The output is byte-identical across hosts for identical inputs. This
//! is the ledger's ABI: any change here strands every hash and signature
//! already on the chain.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::TransactionType;
use crate::crypto::hash::sha256_hex;
use crate::crypto::nonce::random_nonce_hex;
use crate::time::{self, serde_canonical};

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A signed supply-chain event, immutable once hashed.
///
/// The `hash` field is the SHA-256 of the canonical payload and doubles
/// as the replay token: the engine refuses to admit the same hash twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Which supply-chain event this records.
    pub transaction_type: TransactionType,

    /// Opaque identifier of the physical batch.
    pub batch_no: String,

    /// The submitting actor's user id.
    pub actor_user_id: i64,

    /// The actor's role tag (free-form: "farmer", "processor", …).
    pub actor_role: String,

    /// Hex SEC1 compressed secp256k1 public key. Set during signing.
    pub actor_public_key: Option<String>,

    /// Hex DER ECDSA signature over the canonical payload. `None` for
    /// unsigned transactions fresh from the builder.
    pub actor_signature: Option<String>,

    /// Opaque structured event payload. Always a JSON object.
    pub transaction_data: Value,

    /// Custody source entity, when the event transfers custody.
    pub from_entity_id: Option<i64>,

    /// Custody destination entity.
    pub to_entity_id: Option<i64>,

    /// References to supporting documents, keyed by document kind.
    pub document_hashes: Option<BTreeMap<String, String>>,

    /// Event instant, canonical millisecond precision.
    #[serde(with = "serde_canonical")]
    pub timestamp: DateTime<Utc>,

    /// 256-bit random hex replay nonce.
    pub nonce: String,

    /// SHA-256 hex of the canonical payload.
    pub hash: String,
}

/// Serialize-only view of the canonical payload. Field declaration order
/// here IS the wire order; do not reorder.
#[derive(Serialize)]
struct CanonicalPayload<'a> {
    transaction_type: TransactionType,
    batch_no: &'a str,
    actor_user_id: i64,
    actor_role: &'a str,
    actor_public_key: Option<&'a str>,
    transaction_data: &'a Value,
    from_entity_id: Option<i64>,
    to_entity_id: Option<i64>,
    document_hashes: Option<&'a BTreeMap<String, String>>,
    timestamp: String,
    nonce: &'a str,
}

impl Transaction {
    /// The canonical JSON payload: every field except `actor_signature`
    /// and `hash`, in wire order.
    pub fn canonical_payload(&self) -> String {
        let payload = CanonicalPayload {
            transaction_type: self.transaction_type,
            batch_no: &self.batch_no,
            actor_user_id: self.actor_user_id,
            actor_role: &self.actor_role,
            actor_public_key: self.actor_public_key.as_deref(),
            transaction_data: &self.transaction_data,
            from_entity_id: self.from_entity_id,
            to_entity_id: self.to_entity_id,
            document_hashes: self.document_hashes.as_ref(),
            timestamp: time::format_canonical(&self.timestamp),
            nonce: &self.nonce,
        };
        serde_json::to_string(&payload).expect("canonical payload serializes")
    }

    /// Recompute the transaction hash from the current field values.
    pub fn compute_hash(&self) -> String {
        sha256_hex(self.canonical_payload().as_bytes())
    }

    /// Whether a signature is attached. Says nothing about validity —
    /// that is [`super::verification::verify_transaction`]'s job.
    pub fn is_signed(&self) -> bool {
        self.actor_signature.is_some()
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent constructor for unsigned transactions.
///
/// Unset optional fields default sensibly: `timestamp` to the current
/// canonical instant, `nonce` to fresh OS randomness, `transaction_data`
/// to an empty object.
///
/// # Examples
///
/// ```
/// use provena_ledger::transaction::{TransactionBuilder, TransactionType};
///
/// let tx = TransactionBuilder::new(TransactionType::BatchCreate, "BATCH001")
///     .actor(7, "farmer")
///     .data(serde_json::json!({ "plot": "A-12", "seed_variety": "K7" }))
///     .build();
/// assert_eq!(tx.hash, tx.compute_hash());
/// assert!(!tx.is_signed());
/// ```
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    transaction_type: TransactionType,
    batch_no: String,
    actor_user_id: i64,
    actor_role: String,
    actor_public_key: Option<String>,
    transaction_data: Value,
    from_entity_id: Option<i64>,
    to_entity_id: Option<i64>,
    document_hashes: Option<BTreeMap<String, String>>,
    timestamp: Option<DateTime<Utc>>,
    nonce: Option<String>,
}

impl TransactionBuilder {
    /// Start a builder for the given event tag and batch.
    pub fn new(transaction_type: TransactionType, batch_no: impl Into<String>) -> Self {
        Self {
            transaction_type,
            batch_no: batch_no.into(),
            actor_user_id: 0,
            actor_role: String::new(),
            actor_public_key: None,
            transaction_data: Value::Object(serde_json::Map::new()),
            from_entity_id: None,
            to_entity_id: None,
            document_hashes: None,
            timestamp: None,
            nonce: None,
        }
    }

    /// The submitting actor's identity and role. Required.
    pub fn actor(mut self, user_id: i64, role: impl Into<String>) -> Self {
        self.actor_user_id = user_id;
        self.actor_role = role.into();
        self
    }

    /// Pre-set the actor's public key. Normally left to signing.
    pub fn public_key(mut self, public_key_hex: impl Into<String>) -> Self {
        self.actor_public_key = Some(public_key_hex.into());
        self
    }

    /// The opaque event payload. Expected to be a JSON object.
    pub fn data(mut self, data: Value) -> Self {
        self.transaction_data = data;
        self
    }

    /// Custody transfer endpoints for transport/distribution events.
    pub fn custody(mut self, from_entity_id: Option<i64>, to_entity_id: Option<i64>) -> Self {
        self.from_entity_id = from_entity_id;
        self.to_entity_id = to_entity_id;
        self
    }

    /// Supporting document references.
    pub fn document_hashes(mut self, hashes: BTreeMap<String, String>) -> Self {
        self.document_hashes = Some(hashes);
        self
    }

    /// Explicit event instant. Defaults to now. Sub-millisecond precision
    /// is truncated to keep the value canonical.
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Explicit replay nonce, for deterministic tests. Defaults to fresh
    /// OS randomness.
    pub fn nonce(mut self, nonce_hex: impl Into<String>) -> Self {
        self.nonce = Some(nonce_hex.into());
        self
    }

    /// Assemble the transaction and derive its hash.
    pub fn build(self) -> Transaction {
        let timestamp = self
            .timestamp
            .map(|ts| {
                // Truncate to whole milliseconds so the stored instant
                // re-renders byte-identically.
                let sub = ts.timestamp_subsec_nanos() % 1_000_000;
                ts - chrono::Duration::nanoseconds(i64::from(sub))
            })
            .unwrap_or_else(time::now_canonical);

        let mut tx = Transaction {
            transaction_type: self.transaction_type,
            batch_no: self.batch_no,
            actor_user_id: self.actor_user_id,
            actor_role: self.actor_role,
            actor_public_key: self.actor_public_key,
            actor_signature: None,
            transaction_data: self.transaction_data,
            from_entity_id: self.from_entity_id,
            to_entity_id: self.to_entity_id,
            document_hashes: self.document_hashes,
            timestamp,
            nonce: self.nonce.unwrap_or_else(random_nonce_hex),
            hash: String::new(),
        };
        tx.hash = tx.compute_hash();
        tx
    }
}
