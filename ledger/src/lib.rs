// Copyright (c) 2026 Provena Systems. MIT License.
// See LICENSE for details.

//! # Provena Ledger — Core Library
//!
//! An application-embedded, single-writer proof-of-work ledger that
//! records append-only, signed supply-chain events (cultivation,
//! harvest, collection, transport, processing, distribution, export)
//! and backs them with a relational store so the in-memory chain can be
//! recovered, audited, and validated at any time.
//!
//! The ledger is the source of truth for "what happened to a given
//! batch". Relational tables elsewhere in the product are denormalized
//! mirrors of it, never the other way around.
//!
//! ## Architecture
//!
//! - **crypto** — SHA-256, ECDSA/secp256k1, AES-256-GCM sealing, random
//!   nonces. Thin wrappers over audited crates; nothing hand-rolled.
//! - **transaction** — the signed event: canonical form, builder,
//!   signing, verification.
//! - **block** — Merkle root, proof-of-work mining, validator
//!   signatures, structural validation.
//! - **keystore** — per-actor keypairs, encrypted at rest, rotated and
//!   (de)activated on demand.
//! - **chain** — the single-writer engine: admission gates (replay,
//!   rate limit), the pending pool, sealing, difficulty adjustment.
//! - **store** — SQLite persistence: write-through sealing, startup
//!   reload, the batch→stage index.
//! - **health** — the periodic integrity check with auto-recovery.
//! - **ledger** — the one handle the host talks to.
//!
//! ## Quick start
//!
//! ```no_run
//! use provena_ledger::{EventDraft, Ledger, LedgerConfig, LedgerStore, TransactionType};
//!
//! # fn main() -> Result<(), provena_ledger::LedgerError> {
//! let ledger = Ledger::open(
//!     LedgerConfig::new("host-shared-secret"),
//!     LedgerStore::open("provena.db")?,
//! )?;
//!
//! ledger.generate_keys(7)?;
//! let receipt = ledger.record_event(
//!     EventDraft::new(
//!         TransactionType::BatchCreate,
//!         "BATCH001",
//!         serde_json::json!({ "plot": "A-12" }),
//!     ),
//!     7,
//!     "farmer",
//!     true,
//!     Some(1),
//! )?;
//! assert!(receipt.block.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Invariants the crate lives by
//!
//! 1. The canonical JSON forms (transaction payload, block header) are
//!    the ABI. Field order, timestamp precision, and the Merkle
//!    duplication rule are frozen.
//! 2. The in-memory chain never runs ahead of the store: sealing
//!    persists first and appends second, rolling the pool back on
//!    failure.
//! 3. A transaction hash is admitted at most once, ever (the replay
//!    set survives reloads via storage).
//! 4. Private keys exist in plaintext only in transit through
//!    `generate` and inside a signing call.

pub mod block;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod health;
pub mod keystore;
pub mod ledger;
pub mod store;
pub mod time;
pub mod transaction;

pub use block::Block;
pub use chain::{ReloadOutcome, SubmitReceipt};
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use health::{spawn_supervisor, IntegrityReport, SupervisorHandle};
pub use keystore::{GeneratedKeys, KeyStore, KeyStoreError};
pub use ledger::{ChainStats, EventDraft, HealthStatus, Ledger};
pub use store::{BatchEvent, BatchRef, KeyInfo, LedgerStore, StoreError};
pub use transaction::{
    sign_transaction, verify_transaction, Stage, Transaction, TransactionBuilder,
    TransactionError, TransactionType,
};
