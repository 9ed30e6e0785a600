//! The `metadata` key/value table.
//!
//! Small serialized state that must survive restarts but does not
//! deserve a table of its own: the validator set, operational markers,
//! and similar. Values are opaque strings; callers pick the encoding
//! (the validator set is a JSON array).

use rusqlite::{params, Connection, OptionalExtension};

use super::StoreError;

/// Read a metadata value.
pub fn get(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let value = conn
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

/// Insert or replace a metadata value.
pub fn set(
    conn: &Connection,
    key: &str,
    value: &str,
    description: Option<&str>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO metadata (key, value, description)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             description = COALESCE(excluded.description, metadata.description),
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')",
        params![key, value, description],
    )?;
    Ok(())
}
