//! # Key Store
//!
//! Per-actor secp256k1 keypairs, sealed at rest with AES-256-GCM under a
//! key derived from the host's shared secret and the owning user id.
//!
//! ## Lifecycle
//!
//! - `generate` creates a version-1 record, or, when an active record
//!   already exists, rotates it in place: new key material, bumped
//!   `key_version`. The plaintext private key is returned exactly once,
//!   from that call; it is never readable again except through
//!   `get_private`, which re-derives it from the sealed column.
//! - `deactivate` / `reactivate` flip the record's active flag. An
//!   inactive key refuses to sign (`KeyInactive`), which is the switch
//!   an operator throws when an actor's device is lost.
//! - At most one active record per user, enforced by a partial unique
//!   index in the store.
//!
//! Private key material never appears in logs or `Debug` output.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::LedgerConfig;
use crate::crypto::ecdsa::{ActorKeypair, SignatureError};
use crate::crypto::sealing;
use crate::store::{keys, KeyInfo, LedgerStore, StoreError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from key store operations.
///
/// `DecryptFailed` and `KeyMissing` stay distinct: the first means the
/// sealed column or the shared secret is wrong, the second that the user
/// has no record at all. Conflating them would hide real corruption.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("no key record for user {user_id}")]
    KeyMissing { user_id: i64 },

    #[error("key for user {user_id} is deactivated")]
    KeyInactive { user_id: i64 },

    #[error("sealed private key for user {user_id} failed to decrypt")]
    DecryptFailed { user_id: i64 },

    #[error("sealing private key for user {user_id} failed")]
    SealFailed { user_id: i64 },

    #[error(transparent)]
    InvalidKey(#[from] SignatureError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The one-time result of `generate`: the only moment the plaintext
/// private key leaves the store.
#[derive(Debug, Clone)]
pub struct GeneratedKeys {
    pub public_key: String,
    pub private_key: String,
    pub key_version: i64,
}

// ---------------------------------------------------------------------------
// KeyStore
// ---------------------------------------------------------------------------

/// Encrypted keypair store over the `user_keys` table.
pub struct KeyStore {
    store: Arc<LedgerStore>,
    shared_secret: String,
}

impl KeyStore {
    /// Build a key store sharing the ledger's database handle.
    pub fn new(store: Arc<LedgerStore>, config: &LedgerConfig) -> Self {
        Self {
            store,
            shared_secret: config.shared_secret.clone(),
        }
    }

    /// Create or rotate the keypair for a user.
    ///
    /// Rotation happens inside one SQL transaction: the active record's
    /// key material is replaced and its version bumped, so a reader never
    /// observes a half-rotated record.
    pub fn generate(&self, user_id: i64) -> Result<GeneratedKeys, KeyStoreError> {
        let keypair = ActorKeypair::generate();
        let public_key = keypair.public_hex();
        let private_key = keypair.private_hex();

        let sealing_key = sealing::derive_sealing_key(&self.shared_secret, user_id);
        let sealed = sealing::seal(&sealing_key, private_key.as_bytes())
            .map_err(|_| KeyStoreError::SealFailed { user_id })?;

        let key_version = self.store.with_tx(|db_tx| {
            match keys::active_for_user(db_tx, user_id)? {
                Some(active) => keys::rotate(db_tx, active.key_id, &public_key, &sealed),
                None => {
                    keys::insert(db_tx, user_id, &public_key, &sealed)?;
                    Ok(1)
                }
            }
        })?;

        if key_version > 1 {
            info!(user_id, key_version, "rotated actor keypair");
        } else {
            info!(user_id, "generated actor keypair");
        }

        Ok(GeneratedKeys {
            public_key,
            private_key,
            key_version,
        })
    }

    /// The user's active public key, or `None`.
    pub fn get_public(&self, user_id: i64) -> Result<Option<String>, KeyStoreError> {
        let row = self
            .store
            .with_conn(|conn| keys::active_for_user(conn, user_id))?;
        Ok(row.map(|r| r.public_key))
    }

    /// Decrypt and rebuild the user's keypair for signing.
    ///
    /// # Errors
    ///
    /// `KeyMissing` when the user has no record, `KeyInactive` when the
    /// newest record is deactivated, `DecryptFailed` on a GCM tag
    /// mismatch (wrong secret or tampered column).
    pub fn get_private(&self, user_id: i64) -> Result<ActorKeypair, KeyStoreError> {
        let row = self
            .store
            .with_conn(|conn| keys::latest_for_user(conn, user_id))?
            .ok_or(KeyStoreError::KeyMissing { user_id })?;
        if !row.is_active {
            return Err(KeyStoreError::KeyInactive { user_id });
        }

        let sealing_key = sealing::derive_sealing_key(&self.shared_secret, user_id);
        let plaintext = sealing::open_sealed(&sealing_key, &row.encrypted_private_key)
            .map_err(|_| KeyStoreError::DecryptFailed { user_id })?;
        let private_hex = String::from_utf8(plaintext)
            .map_err(|_| KeyStoreError::DecryptFailed { user_id })?;

        Ok(ActorKeypair::from_private_hex(&private_hex)?)
    }

    /// Deactivate the user's active key. No-op when already inactive.
    pub fn deactivate(&self, user_id: i64) -> Result<(), KeyStoreError> {
        self.flip_active(user_id, false)
    }

    /// Reactivate the user's newest key.
    pub fn reactivate(&self, user_id: i64) -> Result<(), KeyStoreError> {
        self.flip_active(user_id, true)
    }

    /// Whether the user currently has an active key.
    pub fn has_active(&self, user_id: i64) -> Result<bool, KeyStoreError> {
        Ok(self
            .store
            .with_conn(|conn| keys::active_for_user(conn, user_id))?
            .is_some())
    }

    /// Key metadata for the user's newest record, without private
    /// material.
    pub fn get_info(&self, user_id: i64) -> Result<Option<KeyInfo>, KeyStoreError> {
        let row = self
            .store
            .with_conn(|conn| keys::latest_for_user(conn, user_id))?;
        Ok(row.map(KeyInfo::from))
    }

    /// Check that a private/public hex pair belongs together by signing
    /// and verifying a canned payload.
    pub fn validate_pair(private_hex: &str, public_hex: &str) -> bool {
        const CANNED: &[u8] = b"provena keypair validation payload";
        match ActorKeypair::from_private_hex(private_hex) {
            Ok(keypair) => {
                let signature = keypair.sign_hex(CANNED);
                crate::crypto::ecdsa::verify_hex(public_hex, CANNED, &signature)
            }
            Err(_) => false,
        }
    }

    fn flip_active(&self, user_id: i64, active: bool) -> Result<(), KeyStoreError> {
        // None = no record, Some(false) = already in the requested state.
        let flipped = self.store.with_tx(|db_tx| {
            match keys::latest_for_user(db_tx, user_id)? {
                None => Ok(None),
                Some(row) if row.is_active == active => Ok(Some(false)),
                Some(row) => {
                    keys::set_active(db_tx, row.key_id, active)?;
                    Ok(Some(true))
                }
            }
        })?;

        match flipped {
            None => Err(KeyStoreError::KeyMissing { user_id }),
            Some(changed) => {
                if changed {
                    info!(user_id, active, "flipped key active state");
                }
                Ok(())
            }
        }
    }
}
