//! Relational schema and versioning.
//!
//! Five tables back the ledger core: `blocks`, `transactions` (FK to
//! blocks), `batch_refs` (the batch→stage secondary index), `user_keys`
//! (encrypted keypairs), and `metadata` (key/value state such as the
//! validator set). A `schema_version` table gates migrations.
//!
//! Block rows carry `block_hash` and `merkle_root` verbatim so that
//! reload never has to recompute them: the store is the authority the
//! in-memory chain is rebuilt from.

use rusqlite::Connection;
use tracing::info;

use super::StoreError;

/// Current schema version. Bump together with a migration arm in
/// [`migrate`].
pub const SCHEMA_VERSION: i32 = 1;

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    block_id              INTEGER PRIMARY KEY AUTOINCREMENT,
    block_number          INTEGER NOT NULL UNIQUE,
    previous_hash         TEXT    NOT NULL,
    merkle_root           TEXT    NOT NULL,
    timestamp             TEXT    NOT NULL,
    nonce                 INTEGER NOT NULL,
    difficulty            INTEGER NOT NULL,
    block_hash            TEXT    NOT NULL UNIQUE,
    validator_user_id     INTEGER,
    validator_public_key  TEXT,
    validator_signature   TEXT,
    transaction_count     INTEGER NOT NULL DEFAULT 0,
    mining_time_ms        INTEGER,
    is_valid              INTEGER NOT NULL DEFAULT 1,
    created_at            TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
);

CREATE TABLE IF NOT EXISTS transactions (
    transaction_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_hash      TEXT    NOT NULL UNIQUE,
    block_id              INTEGER NOT NULL REFERENCES blocks(block_id),
    transaction_type      TEXT    NOT NULL,
    batch_no              TEXT    NOT NULL,
    actor_user_id         INTEGER NOT NULL,
    actor_role            TEXT    NOT NULL,
    actor_public_key      TEXT,
    actor_signature       TEXT    NOT NULL,
    transaction_data      TEXT    NOT NULL,
    from_entity_id        INTEGER,
    to_entity_id          INTEGER,
    document_hashes       TEXT,
    nonce                 TEXT    NOT NULL,
    timestamp             TEXT    NOT NULL,
    is_verified           INTEGER NOT NULL DEFAULT 1,
    verification_count    INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
);

CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions(block_id);
CREATE INDEX IF NOT EXISTS idx_transactions_batch ON transactions(batch_no);

CREATE TABLE IF NOT EXISTS batch_refs (
    ref_id                INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_no              TEXT    NOT NULL,
    stage                 TEXT    NOT NULL,
    transaction_id        INTEGER NOT NULL REFERENCES transactions(transaction_id),
    block_id              INTEGER NOT NULL REFERENCES blocks(block_id),
    transaction_hash      TEXT    NOT NULL,
    created_at            TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
);

CREATE INDEX IF NOT EXISTS idx_batch_refs_batch_stage ON batch_refs(batch_no, stage);

CREATE TABLE IF NOT EXISTS user_keys (
    key_id                INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id               INTEGER NOT NULL,
    public_key            TEXT    NOT NULL,
    encrypted_private_key TEXT    NOT NULL,
    key_version           INTEGER NOT NULL DEFAULT 1,
    is_active             INTEGER NOT NULL DEFAULT 1,
    created_at            TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    updated_at            TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_user_keys_one_active
    ON user_keys(user_id) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS metadata (
    key                   TEXT PRIMARY KEY,
    value                 TEXT NOT NULL,
    description           TEXT,
    updated_at            TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
);
"#;

/// Create or migrate the schema on a fresh connection.
pub fn init(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let current: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    if current == 0 {
        info!(version = SCHEMA_VERSION, "creating ledger schema");
        conn.execute_batch(DDL)?;
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
    } else if current < SCHEMA_VERSION {
        migrate(conn, current)?;
    }

    Ok(())
}

/// Apply migrations from `from_version` up to [`SCHEMA_VERSION`].
fn migrate(conn: &Connection, from_version: i32) -> Result<(), StoreError> {
    info!(from_version, to_version = SCHEMA_VERSION, "migrating ledger schema");
    // Migration arms land here as the schema evolves; v1 is the baseline.
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn all_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();

        for table in ["blocks", "transactions", "batch_refs", "user_keys", "metadata"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[test]
    fn one_active_key_per_user_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();

        conn.execute(
            "INSERT INTO user_keys (user_id, public_key, encrypted_private_key) VALUES (7, 'pk', 'sealed')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO user_keys (user_id, public_key, encrypted_private_key) VALUES (7, 'pk2', 'sealed2')",
            [],
        );
        assert!(dup.is_err(), "second active key for the same user must violate the partial index");

        // An inactive second row is fine.
        conn.execute(
            "INSERT INTO user_keys (user_id, public_key, encrypted_private_key, is_active) VALUES (7, 'pk3', 'sealed3', 0)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn block_hash_uniqueness_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();

        conn.execute(
            "INSERT INTO blocks (block_number, previous_hash, merkle_root, timestamp, nonce, difficulty, block_hash)
             VALUES (0, '0', 'root', '2026-01-01T00:00:00.000Z', 0, 0, 'hash-a')",
            [],
        )
        .unwrap();
        let dup_number = conn.execute(
            "INSERT INTO blocks (block_number, previous_hash, merkle_root, timestamp, nonce, difficulty, block_hash)
             VALUES (0, '0', 'root', '2026-01-01T00:00:00.000Z', 0, 0, 'hash-b')",
            [],
        );
        assert!(dup_number.is_err());
    }
}
