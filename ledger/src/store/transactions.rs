//! Row mapping for the `transactions` table.
//!
//! Transactions are written only as part of a block's sealing
//! transaction and read back in `transaction_id` order, which preserves
//! admission order within each block.

use rusqlite::{params, Connection, Row};

use super::StoreError;
use crate::time;
use crate::transaction::Transaction;

/// Insert one sealed transaction under its block row. Returns the new
/// `transaction_id`.
pub fn insert(
    db_tx: &rusqlite::Transaction<'_>,
    block_id: i64,
    tx: &Transaction,
) -> Result<i64, StoreError> {
    let data_json = serde_json::to_string(&tx.transaction_data)
        .map_err(|e| StoreError::Corrupt(format!("transaction_data encode: {e}")))?;
    let docs_json = tx
        .document_hashes
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("document_hashes encode: {e}")))?;

    db_tx.execute(
        "INSERT INTO transactions (
            transaction_hash, block_id, transaction_type, batch_no,
            actor_user_id, actor_role, actor_public_key, actor_signature,
            transaction_data, from_entity_id, to_entity_id, document_hashes,
            nonce, timestamp, is_verified, verification_count
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 1, 0)",
        params![
            tx.hash,
            block_id,
            tx.transaction_type.as_str(),
            tx.batch_no,
            tx.actor_user_id,
            tx.actor_role,
            tx.actor_public_key,
            tx.actor_signature.as_deref().unwrap_or(""),
            data_json,
            tx.from_entity_id,
            tx.to_entity_id,
            docs_json,
            tx.nonce,
            time::format_canonical(&tx.timestamp),
        ],
    )?;
    Ok(db_tx.last_insert_rowid())
}

/// Load a block's transactions in `transaction_id` order.
pub fn load_for_block(conn: &Connection, block_id: i64) -> Result<Vec<Transaction>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT transaction_hash, transaction_type, batch_no, actor_user_id,
                actor_role, actor_public_key, actor_signature, transaction_data,
                from_entity_id, to_entity_id, document_hashes, nonce, timestamp
         FROM transactions WHERE block_id = ?1 ORDER BY transaction_id",
    )?;

    let raw_rows: Vec<RawTransactionRow> = stmt
        .query_map([block_id], RawTransactionRow::from_row)?
        .collect::<Result<_, _>>()?;

    raw_rows.into_iter().map(RawTransactionRow::decode).collect()
}

/// Total sealed transactions in the store.
pub fn count(conn: &Connection) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// All sealed transaction hashes, for seeding the replay set on reload.
pub fn all_hashes(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT transaction_hash FROM transactions")?;
    let hashes = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    Ok(hashes)
}

/// Raw column values, decoded into a [`Transaction`] outside the rusqlite
/// mapper so parse failures surface as [`StoreError::Corrupt`] instead of
/// panicking inside the row callback.
pub(super) struct RawTransactionRow {
    pub transaction_hash: String,
    pub transaction_type: String,
    pub batch_no: String,
    pub actor_user_id: i64,
    pub actor_role: String,
    pub actor_public_key: Option<String>,
    pub actor_signature: String,
    pub transaction_data: String,
    pub from_entity_id: Option<i64>,
    pub to_entity_id: Option<i64>,
    pub document_hashes: Option<String>,
    pub nonce: String,
    pub timestamp: String,
}

impl RawTransactionRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            transaction_hash: row.get(0)?,
            transaction_type: row.get(1)?,
            batch_no: row.get(2)?,
            actor_user_id: row.get(3)?,
            actor_role: row.get(4)?,
            actor_public_key: row.get(5)?,
            actor_signature: row.get(6)?,
            transaction_data: row.get(7)?,
            from_entity_id: row.get(8)?,
            to_entity_id: row.get(9)?,
            document_hashes: row.get(10)?,
            nonce: row.get(11)?,
            timestamp: row.get(12)?,
        })
    }

    pub(super) fn decode(self) -> Result<Transaction, StoreError> {
        let transaction_type = self
            .transaction_type
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("transaction_type: {e}")))?;
        let transaction_data = serde_json::from_str(&self.transaction_data)
            .map_err(|e| StoreError::Corrupt(format!("transaction_data decode: {e}")))?;
        let document_hashes = self
            .document_hashes
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("document_hashes decode: {e}")))?;
        let timestamp = time::parse_canonical(&self.timestamp)
            .map_err(|e| StoreError::Corrupt(format!("transaction timestamp: {e}")))?;

        Ok(Transaction {
            transaction_type,
            batch_no: self.batch_no,
            actor_user_id: self.actor_user_id,
            actor_role: self.actor_role,
            actor_public_key: self.actor_public_key,
            actor_signature: if self.actor_signature.is_empty() {
                None
            } else {
                Some(self.actor_signature)
            },
            transaction_data,
            from_entity_id: self.from_entity_id,
            to_entity_id: self.to_entity_id,
            document_hashes,
            timestamp,
            nonce: self.nonce,
            hash: self.transaction_hash,
        })
    }
}
