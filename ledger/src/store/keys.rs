//! Row mapping for the `user_keys` table.
//!
//! A partial unique index guarantees at most one active record per user.
//! Rotation replaces the active row in place (public key, sealed private
//! key, bumped version) rather than inserting; history of prior key
//! material is deliberately not retained.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::StoreError;
use crate::time;

/// A `user_keys` row, sealed private key included. Internal to the key
/// store; the public surface exposes [`KeyInfo`] instead.
#[derive(Debug, Clone)]
pub struct KeyRow {
    pub key_id: i64,
    pub user_id: i64,
    pub public_key: String,
    pub encrypted_private_key: String,
    pub key_version: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Key metadata safe to hand to callers: everything except the sealed
/// private key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyInfo {
    pub user_id: i64,
    pub public_key: String,
    pub key_version: i64,
    pub is_active: bool,
    #[serde(with = "crate::time::serde_canonical")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::time::serde_canonical")]
    pub updated_at: DateTime<Utc>,
}

impl From<KeyRow> for KeyInfo {
    fn from(row: KeyRow) -> Self {
        Self {
            user_id: row.user_id,
            public_key: row.public_key,
            key_version: row.key_version,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// The most recent key row for a user, active or not.
pub fn latest_for_user(conn: &Connection, user_id: i64) -> Result<Option<KeyRow>, StoreError> {
    conn.query_row(
        "SELECT key_id, user_id, public_key, encrypted_private_key, key_version,
                is_active, created_at, updated_at
         FROM user_keys WHERE user_id = ?1 ORDER BY key_id DESC LIMIT 1",
        [user_id],
        row_to_key,
    )
    .optional()?
    .map(decode_row)
    .transpose()
}

/// The active key row for a user, if one exists.
pub fn active_for_user(conn: &Connection, user_id: i64) -> Result<Option<KeyRow>, StoreError> {
    conn.query_row(
        "SELECT key_id, user_id, public_key, encrypted_private_key, key_version,
                is_active, created_at, updated_at
         FROM user_keys WHERE user_id = ?1 AND is_active = 1",
        [user_id],
        row_to_key,
    )
    .optional()?
    .map(decode_row)
    .transpose()
}

/// Insert a fresh version-1 record.
pub fn insert(
    conn: &Connection,
    user_id: i64,
    public_key: &str,
    encrypted_private_key: &str,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO user_keys (user_id, public_key, encrypted_private_key, key_version, is_active)
         VALUES (?1, ?2, ?3, 1, 1)",
        params![user_id, public_key, encrypted_private_key],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Rotate an existing record in place: new key material, bumped version.
pub fn rotate(
    conn: &Connection,
    key_id: i64,
    public_key: &str,
    encrypted_private_key: &str,
) -> Result<i64, StoreError> {
    conn.execute(
        "UPDATE user_keys
         SET public_key = ?2, encrypted_private_key = ?3,
             key_version = key_version + 1,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
         WHERE key_id = ?1",
        params![key_id, public_key, encrypted_private_key],
    )?;
    let version: i64 = conn.query_row(
        "SELECT key_version FROM user_keys WHERE key_id = ?1",
        [key_id],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Flip a record's active flag. Returns whether a row was touched.
pub fn set_active(conn: &Connection, key_id: i64, active: bool) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE user_keys
         SET is_active = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')
         WHERE key_id = ?1",
        params![key_id, active],
    )?;
    Ok(changed == 1)
}

fn row_to_key(row: &Row<'_>) -> rusqlite::Result<RawKeyRow> {
    Ok(RawKeyRow {
        key_id: row.get(0)?,
        user_id: row.get(1)?,
        public_key: row.get(2)?,
        encrypted_private_key: row.get(3)?,
        key_version: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

struct RawKeyRow {
    key_id: i64,
    user_id: i64,
    public_key: String,
    encrypted_private_key: String,
    key_version: i64,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

fn decode_row(raw: RawKeyRow) -> Result<KeyRow, StoreError> {
    let created_at = time::parse_canonical(&raw.created_at)
        .map_err(|e| StoreError::Corrupt(format!("user_keys created_at: {e}")))?;
    let updated_at = time::parse_canonical(&raw.updated_at)
        .map_err(|e| StoreError::Corrupt(format!("user_keys updated_at: {e}")))?;
    Ok(KeyRow {
        key_id: raw.key_id,
        user_id: raw.user_id,
        public_key: raw.public_key,
        encrypted_private_key: raw.encrypted_private_key,
        key_version: raw.key_version,
        is_active: raw.is_active,
        created_at,
        updated_at,
    })
}
