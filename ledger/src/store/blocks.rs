//! Row mapping for the `blocks` table.
//!
//! Block rows store `block_hash` and `merkle_root` verbatim: reload
//! rebuilds the in-memory chain from the stored digests without
//! recomputing them. The store is the authority after a restart.

use rusqlite::{params, Connection, Row};

use super::{transactions, StoreError};
use crate::block::Block;
use crate::time;

/// Insert a sealed block row. Returns the new `block_id`.
pub fn insert(db_tx: &rusqlite::Transaction<'_>, block: &Block) -> Result<i64, StoreError> {
    db_tx.execute(
        "INSERT INTO blocks (
            block_number, previous_hash, merkle_root, timestamp, nonce,
            difficulty, block_hash, validator_user_id, validator_public_key,
            validator_signature, transaction_count, mining_time_ms, is_valid
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1)",
        params![
            block.block_number as i64,
            block.previous_hash,
            block.merkle_root,
            time::format_canonical(&block.timestamp),
            block.nonce as i64,
            block.difficulty,
            block.hash,
            block.validator_user_id,
            block.validator_public_key,
            block.validator_signature,
            block.transactions.len() as i64,
            block.mining_time_ms.map(|ms| ms as i64),
        ],
    )?;
    Ok(db_tx.last_insert_rowid())
}

/// Load the entire chain in `block_number` order, each block with its
/// transactions in `transaction_id` order.
pub fn load_chain(conn: &Connection) -> Result<Vec<Block>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT block_id, block_number, previous_hash, merkle_root, timestamp,
                nonce, difficulty, block_hash, validator_user_id,
                validator_public_key, validator_signature, mining_time_ms
         FROM blocks ORDER BY block_number",
    )?;

    let raw_rows: Vec<RawBlockRow> = stmt
        .query_map([], RawBlockRow::from_row)?
        .collect::<Result<_, _>>()?;

    raw_rows
        .into_iter()
        .map(|raw| {
            let transactions = transactions::load_for_block(conn, raw.block_id)?;
            raw.decode(transactions)
        })
        .collect()
}

/// Number of block rows.
pub fn count(conn: &Connection) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// `(block_number, block_hash)` for every stored block, ascending.
/// The integrity check compares these against the in-memory chain.
pub fn stored_hashes(conn: &Connection) -> Result<Vec<(u64, String)>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT block_number, block_hash FROM blocks ORDER BY block_number")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?))
        })?
        .collect::<Result<_, _>>()?;
    Ok(rows)
}

/// The highest stored block, as `(block_number, block_hash)`.
pub fn latest(conn: &Connection) -> Result<Option<(u64, String)>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT block_number, block_hash FROM blocks ORDER BY block_number DESC LIMIT 1",
    )?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => Ok(Some((
            row.get::<_, i64>(0)? as u64,
            row.get::<_, String>(1)?,
        ))),
        None => Ok(None),
    }
}

struct RawBlockRow {
    block_id: i64,
    block_number: i64,
    previous_hash: String,
    merkle_root: String,
    timestamp: String,
    nonce: i64,
    difficulty: u32,
    block_hash: String,
    validator_user_id: Option<i64>,
    validator_public_key: Option<String>,
    validator_signature: Option<String>,
    mining_time_ms: Option<i64>,
}

impl RawBlockRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            block_id: row.get(0)?,
            block_number: row.get(1)?,
            previous_hash: row.get(2)?,
            merkle_root: row.get(3)?,
            timestamp: row.get(4)?,
            nonce: row.get(5)?,
            difficulty: row.get(6)?,
            block_hash: row.get(7)?,
            validator_user_id: row.get(8)?,
            validator_public_key: row.get(9)?,
            validator_signature: row.get(10)?,
            mining_time_ms: row.get(11)?,
        })
    }

    fn decode(self, transactions: Vec<crate::transaction::Transaction>) -> Result<Block, StoreError> {
        let timestamp = time::parse_canonical(&self.timestamp)
            .map_err(|e| StoreError::Corrupt(format!("block timestamp: {e}")))?;
        Ok(Block {
            block_number: self.block_number as u64,
            previous_hash: self.previous_hash,
            merkle_root: self.merkle_root,
            timestamp,
            nonce: self.nonce as u64,
            difficulty: self.difficulty,
            validator_user_id: self.validator_user_id,
            validator_public_key: self.validator_public_key,
            validator_signature: self.validator_signature,
            transactions,
            hash: self.block_hash,
            mining_time_ms: self.mining_time_ms.map(|ms| ms as u64),
        })
    }
}
