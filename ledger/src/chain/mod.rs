//! # Chain Module
//!
//! The mutable heart of the ledger: admission control, the pending pool,
//! and the sealing pipeline.
//!
//! ```text
//! pool.rs      — FIFO pending pool + chain-wide replay set
//! ratelimit.rs — per-actor fixed-window admission quotas
//! engine.rs    — the single-writer ChainEngine (admit/seal/validate/reload)
//! ```
//!
//! Everything here mutates under one logical owner: [`crate::Ledger`]
//! wraps the [`ChainEngine`] in a mutex, so two seals can never overlap
//! and the replay set is never raced.

pub mod engine;
pub mod pool;
pub mod ratelimit;

pub use engine::{ChainEngine, ReloadOutcome, SubmitReceipt};
pub use pool::PendingPool;
pub use ratelimit::RateLimiter;
