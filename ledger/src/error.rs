//! The public error surface of the ledger core.
//!
//! Module-level errors (`TransactionError`, `KeyStoreError`,
//! `StoreError`) stay inspectable through `#[from]` conversions; the
//! admission and operator kinds (`Replay`, `RateLimited`,
//! `OperatorOnly`, …) are defined directly here.
//!
//! Callers must not retry `Replay` or `RateLimited` with the same
//! `(nonce, hash)` pair: a retried event needs a fresh nonce, which
//! gives it a fresh hash.

use thiserror::Error;

use crate::keystore::KeyStoreError;
use crate::store::StoreError;
use crate::transaction::TransactionError;

/// Everything the ledger surface can fail with.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The transaction failed structural or cryptographic verification.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),

    /// The transaction hash is already in the replay set.
    #[error("replay: transaction {hash} already admitted")]
    Replay { hash: String },

    /// The actor exhausted their admission quota for the current window.
    #[error("rate limited: user {user_id} exceeded {max} transactions per {window_secs}s")]
    RateLimited {
        user_id: i64,
        max: u32,
        window_secs: u64,
    },

    /// A key store failure (`KeyMissing`, `KeyInactive`, `DecryptFailed`, …).
    #[error(transparent)]
    Key(#[from] KeyStoreError),

    /// The durable store refused a write or returned corrupt rows. A
    /// failed sealing write has already been rolled back in memory when
    /// this surfaces.
    #[error("persistence failed: {0}")]
    PersistenceFailed(#[from] StoreError),

    /// Chain validation found issues. Triggers auto-recovery when raised
    /// by the integrity loop.
    #[error("chain integrity failed: {}", issues.join("; "))]
    IntegrityFailed { issues: Vec<String> },

    /// A query addressed a block, transaction, or batch that does not
    /// exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Reset attempted without an operator identity.
    #[error("reset is an operator-only action")]
    OperatorOnly,

    /// A second process-wide handle initialization was attempted.
    #[error("ledger already initialized")]
    AlreadyInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_informative() {
        let err = LedgerError::Replay {
            hash: "ab".repeat(32),
        };
        assert!(err.to_string().contains("replay"));

        let err = LedgerError::RateLimited {
            user_id: 9,
            max: 100,
            window_secs: 60,
        };
        assert!(err.to_string().contains("user 9"));
        assert!(err.to_string().contains("100"));

        let err = LedgerError::IntegrityFailed {
            issues: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "chain integrity failed: a; b");
    }

    #[test]
    fn module_errors_convert() {
        let key_err: LedgerError = KeyStoreError::KeyMissing { user_id: 3 }.into();
        assert!(matches!(
            key_err,
            LedgerError::Key(KeyStoreError::KeyMissing { user_id: 3 })
        ));
    }
}
