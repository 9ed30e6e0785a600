//! The batch→stage secondary index (`batch_refs`).
//!
//! One row per sealed transaction, keyed by `(batch_no, stage)`, written
//! in the same SQL transaction as the block itself. This is what lets
//! the read side answer "show me everything that happened to BATCH001"
//! without touching the chain.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::transactions::RawTransactionRow;
use super::StoreError;
use crate::transaction::{Stage, Transaction};

/// A row of the batch→stage index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRef {
    pub ref_id: i64,
    pub batch_no: String,
    pub stage: Stage,
    pub transaction_id: i64,
    pub block_id: i64,
    pub transaction_hash: String,
}

/// A batch-history entry: the sealed transaction enriched with its chain
/// location and derived stage. Ordered by event timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEvent {
    pub transaction: Transaction,
    pub stage: Stage,
    pub block_number: u64,
    pub block_hash: String,
}

/// Index one sealed transaction under its batch and stage.
pub fn insert(
    db_tx: &rusqlite::Transaction<'_>,
    tx: &Transaction,
    transaction_id: i64,
    block_id: i64,
) -> Result<i64, StoreError> {
    db_tx.execute(
        "INSERT INTO batch_refs (batch_no, stage, transaction_id, block_id, transaction_hash)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            tx.batch_no,
            tx.transaction_type.stage().as_str(),
            transaction_id,
            block_id,
            tx.hash,
        ],
    )?;
    Ok(db_tx.last_insert_rowid())
}

/// All index rows for a batch, in insertion order.
pub fn for_batch(conn: &Connection, batch_no: &str) -> Result<Vec<BatchRef>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT ref_id, batch_no, stage, transaction_id, block_id, transaction_hash
         FROM batch_refs WHERE batch_no = ?1 ORDER BY ref_id",
    )?;

    let raw: Vec<(i64, String, String, i64, i64, String)> = stmt
        .query_map([batch_no], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?
        .collect::<Result<_, _>>()?;

    raw.into_iter()
        .map(|(ref_id, batch_no, stage, transaction_id, block_id, transaction_hash)| {
            let stage = stage
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("batch_refs stage: {e}")))?;
            Ok(BatchRef {
                ref_id,
                batch_no,
                stage,
                transaction_id,
                block_id,
                transaction_hash,
            })
        })
        .collect()
}

/// Sealed-transaction counts per stage, across all batches. Feeds the
/// stats surface.
pub fn stage_counts(conn: &Connection) -> Result<std::collections::BTreeMap<String, u64>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT stage, COUNT(*) FROM batch_refs GROUP BY stage ORDER BY stage")?;
    let rows: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;
    Ok(rows.into_iter().map(|(s, n)| (s, n as u64)).collect())
}

/// The enriched event history of a batch, ordered by event timestamp
/// (ties broken by insertion order).
pub fn batch_history(conn: &Connection, batch_no: &str) -> Result<Vec<BatchEvent>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT t.transaction_hash, t.transaction_type, t.batch_no, t.actor_user_id,
                t.actor_role, t.actor_public_key, t.actor_signature, t.transaction_data,
                t.from_entity_id, t.to_entity_id, t.document_hashes, t.nonce, t.timestamp,
                b.block_number, b.block_hash
         FROM transactions t
         JOIN blocks b ON b.block_id = t.block_id
         WHERE t.batch_no = ?1
         ORDER BY t.timestamp, t.transaction_id",
    )?;

    let raw: Vec<(RawTransactionRow, i64, String)> = stmt
        .query_map([batch_no], |row| {
            let tx_row = RawTransactionRow::from_row(row)?;
            Ok((tx_row, row.get(13)?, row.get(14)?))
        })?
        .collect::<Result<_, _>>()?;

    raw.into_iter()
        .map(|(tx_row, block_number, block_hash)| {
            let transaction = tx_row.decode()?;
            Ok(BatchEvent {
                stage: transaction.transaction_type.stage(),
                block_number: block_number as u64,
                block_hash,
                transaction,
            })
        })
        .collect()
}
