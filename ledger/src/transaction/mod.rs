//! # Transaction Module
//!
//! Construction, signing, verification, and serialization of supply-chain
//! events. Every recorded movement of a batch is represented as a
//! [`Transaction`].
//!
//! ## Architecture
//!
//! ```text
//! types.rs        — Event tag vocabulary and the derived Stage
//! builder.rs      — Transaction struct, canonical form, fluent builder
//! signing.rs      — ECDSA signing with an actor's keypair
//! verification.rs — Structural and cryptographic verification
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Build** — [`TransactionBuilder`] assembles the fields and derives
//!    the hash from the canonical payload.
//! 2. **Sign** — [`sign_transaction`] attaches the actor's public key and
//!    ECDSA signature (refreshing the hash).
//! 3. **Admit** — the chain engine runs [`verify_transaction`] plus its
//!    replay and rate-limit gates.
//! 4. **Seal** — the transaction is drained into exactly one block and
//!    becomes immutable.

pub mod builder;
pub mod signing;
pub mod types;
pub mod verification;

pub use builder::{Transaction, TransactionBuilder};
pub use signing::sign_transaction;
pub use types::{Stage, TransactionType};
pub use verification::{verify_transaction, TransactionError};
