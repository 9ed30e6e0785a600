//! # Ledger Configuration & Constants
//!
//! Every tunable of the chain lives here. The free constants are the
//! production defaults; [`LedgerConfig`] carries the same values as an
//! injectable struct so tests can shrink windows and block sizes without
//! touching the chain code.
//!
//! The canonical serialization constants at the bottom are part of the
//! wire format: changing the timestamp precision or the digest width
//! invalidates every hash and signature ever produced.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Chain Parameters
// ---------------------------------------------------------------------------

/// Soft cap on transactions per block. When the pending pool reaches this
/// size, the engine seals a block without waiting for an explicit request.
pub const BLOCK_SIZE: usize = 5_000;

/// Leading zero hex characters required of a block hash at chain start.
/// Genesis itself is exempt (difficulty 0).
pub const INITIAL_DIFFICULTY: u32 = 2;

/// Target wall-clock spacing between sealed blocks.
pub const TARGET_BLOCK_TIME: Duration = Duration::from_secs(10);

/// Difficulty is re-evaluated every this many blocks, against the span of
/// the previous window.
pub const ADJUST_EVERY: u64 = 10;

/// Difficulty never drops below this floor once mining has started.
pub const MIN_DIFFICULTY: u32 = 1;

/// The hash of "nothing before genesis". Stored verbatim in the genesis
/// block's `previous_hash`.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

// ---------------------------------------------------------------------------
// Admission Control
// ---------------------------------------------------------------------------

/// Width of the per-user rate-limit window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Maximum transactions a single actor may submit per window.
pub const RATE_MAX: u32 = 100;

/// Transactions timestamped further than this into the future are rejected.
/// Covers ordinary clock skew between the host and its callers.
pub const MAX_FUTURE_DRIFT: Duration = Duration::from_secs(60);

/// Transactions older than this are admitted with a warning. Backfilled
/// field data arrives late in the real world; we record it, we just flag it.
pub const STALE_WARN_AGE: Duration = Duration::from_secs(24 * 60 * 60);

// ---------------------------------------------------------------------------
// Health Supervisor
// ---------------------------------------------------------------------------

/// Interval between integrity checks of the in-memory chain against the
/// durable store.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// SHA-256 digest width as lowercase hex.
pub const HASH_HEX_LENGTH: usize = 64;

/// Transaction replay nonces are this many random bytes, hex-encoded.
pub const TX_NONCE_BYTES: usize = 32;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce (IV) length in bytes. 96 bits, the standard GCM size.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Canonical timestamp rendering: ISO-8601 UTC with exactly millisecond
/// precision. Part of the wire format; see the module docs.
pub const CANONICAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// The validator set installed when the metadata table has none recorded.
pub const DEFAULT_VALIDATORS: &[i64] = &[1];

/// Metadata key under which the serialized validator set is stored.
pub const META_VALIDATORS_KEY: &str = "validators";

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`crate::Ledger`] instance.
///
/// `Default` mirrors the production constants above. Tests typically start
/// from `LedgerConfig::for_tests()` and override individual knobs with
/// struct-update syntax.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Host-supplied shared secret. Key-derivation input for sealing
    /// private keys at rest; never logged, never persisted.
    pub shared_secret: String,

    /// Transactions per block before auto-sealing kicks in.
    pub block_size: usize,

    /// Difficulty of the first mined block.
    pub initial_difficulty: u32,

    /// Target spacing between blocks, used by difficulty adjustment.
    pub target_block_time: Duration,

    /// Blocks between difficulty re-evaluations.
    pub adjust_every: u64,

    /// Per-user rate-limit window width.
    pub rate_window: Duration,

    /// Per-user transaction quota per window.
    pub rate_max: u32,

    /// Interval between integrity checks when the supervisor is running.
    pub health_interval: Duration,

    /// When set, reload recomputes every block hash and re-verifies every
    /// signature instead of trusting the stored digests. Slow; meant for
    /// audits and for recovery from a replica that is not trusted.
    pub strict_reload_verification: bool,

    /// When set, `reset` demands an operator identity and fails with
    /// `OperatorOnly` without one. Disable only in development setups.
    pub require_operator_reset: bool,
}

impl LedgerConfig {
    /// Production-shaped configuration with the caller's shared secret.
    pub fn new(shared_secret: impl Into<String>) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            ..Self::default()
        }
    }

    /// Configuration for unit and integration tests: no operator gate and
    /// a well-known secret.
    pub fn for_tests() -> Self {
        Self {
            shared_secret: "provena-test-secret".to_string(),
            require_operator_reset: false,
            ..Self::default()
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            shared_secret: String::new(),
            block_size: BLOCK_SIZE,
            initial_difficulty: INITIAL_DIFFICULTY,
            target_block_time: TARGET_BLOCK_TIME,
            adjust_every: ADJUST_EVERY,
            rate_window: RATE_WINDOW,
            rate_max: RATE_MAX,
            health_interval: HEALTH_INTERVAL,
            strict_reload_verification: false,
            require_operator_reset: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.block_size, BLOCK_SIZE);
        assert_eq!(cfg.initial_difficulty, INITIAL_DIFFICULTY);
        assert_eq!(cfg.adjust_every, ADJUST_EVERY);
        assert_eq!(cfg.rate_max, RATE_MAX);
        assert_eq!(cfg.rate_window, RATE_WINDOW);
        assert_eq!(cfg.health_interval, HEALTH_INTERVAL);
        assert!(cfg.require_operator_reset);
        assert!(!cfg.strict_reload_verification);
    }

    #[test]
    fn test_config_relaxes_operator_gate() {
        let cfg = LedgerConfig::for_tests();
        assert!(!cfg.require_operator_reset);
        assert!(!cfg.shared_secret.is_empty());
    }

    #[test]
    fn timing_constants_sanity() {
        // A one-block adjustment window would let a single slow block
        // whipsaw the difficulty.
        assert!(ADJUST_EVERY >= 2);
        assert!(TARGET_BLOCK_TIME.as_secs() > 0);
        assert!(RATE_WINDOW.as_secs() > 0);
        assert!(MAX_FUTURE_DRIFT < STALE_WARN_AGE);
    }

    #[test]
    fn crypto_parameter_sizes() {
        assert_eq!(HASH_HEX_LENGTH, 64);
        assert_eq!(TX_NONCE_BYTES, 32);
        assert_eq!(AES_KEY_LENGTH, 32);
        assert_eq!(AES_NONCE_LENGTH, 12);
        assert_eq!(AES_TAG_LENGTH, 16);
    }
}
