//! # Store Module
//!
//! Durable persistence for the ledger core, backed by SQLite through
//! `rusqlite`. The in-memory chain is a cache; this module owns the
//! truth that survives restarts.
//!
//! ## Architecture
//!
//! ```text
//! schema.rs       — DDL for the five tables + schema versioning
//! blocks.rs       — block rows (stored digests are authoritative)
//! transactions.rs — transaction rows, FK to blocks
//! refs.rs         — batch→stage secondary index, enriched history reads
//! keys.rs         — encrypted keypair rows
//! metadata.rs     — key/value state (validator set, markers)
//! ```
//!
//! ## Atomicity
//!
//! Sealing writes the block row, every transaction row, and every
//! `batch_refs` row inside one SQL transaction via [`LedgerStore::
//! persist_block`]. Either the whole block lands or none of it does; the
//! engine rolls its in-memory append back when this call fails, so the
//! chain never runs ahead of the store.
//!
//! ## Concurrency
//!
//! One `Connection` behind a mutex. The engine is single-writer anyway;
//! WAL mode keeps concurrent readers (the health supervisor's count
//! queries) cheap.

pub mod blocks;
pub mod keys;
pub mod metadata;
pub mod refs;
pub mod schema;
pub mod transactions;

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, info};

use crate::block::Block;

pub use keys::{KeyInfo, KeyRow};
pub use refs::{BatchEvent, BatchRef};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// SQLite-backed store for blocks, transactions, the batch index,
/// user keys, and metadata.
pub struct LedgerStore {
    conn: Mutex<Connection>,
}

impl LedgerStore {
    /// Open (or create) the ledger database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        info!(path = %path.as_ref().display(), "opening ledger store");
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// An in-memory store that vanishes on drop. For tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        debug!("opening in-memory ledger store");
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read closure against the connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run a write closure inside a SQL transaction. The transaction
    /// commits iff the closure returns `Ok`; any early exit rolls back.
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        let db_tx = conn.transaction()?;
        let value = f(&db_tx)?;
        db_tx.commit()?;
        Ok(value)
    }

    // -- Chain write-through ------------------------------------------------

    /// Persist a sealed block: the block row, all transaction rows, and
    /// all batch-index rows, atomically. Returns the new `block_id`.
    pub fn persist_block(&self, block: &Block) -> Result<i64, StoreError> {
        self.with_tx(|db_tx| {
            let block_id = blocks::insert(db_tx, block)?;
            for tx in &block.transactions {
                let transaction_id = transactions::insert(db_tx, block_id, tx)?;
                refs::insert(db_tx, tx, transaction_id, block_id)?;
            }
            Ok(block_id)
        })
    }

    // -- Chain reads --------------------------------------------------------

    /// The whole stored chain, blocks ascending, transactions in
    /// admission order.
    pub fn load_chain(&self) -> Result<Vec<Block>, StoreError> {
        self.with_conn(blocks::load_chain)
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> Result<u64, StoreError> {
        self.with_conn(blocks::count)
    }

    /// Number of stored transactions.
    pub fn transaction_count(&self) -> Result<u64, StoreError> {
        self.with_conn(transactions::count)
    }

    /// `(block_number, block_hash)` pairs for every stored block.
    pub fn stored_hashes(&self) -> Result<Vec<(u64, String)>, StoreError> {
        self.with_conn(blocks::stored_hashes)
    }

    /// The highest stored block, as `(block_number, block_hash)`.
    pub fn latest_block(&self) -> Result<Option<(u64, String)>, StoreError> {
        self.with_conn(blocks::latest)
    }

    /// Every sealed transaction hash, for replay-set seeding.
    pub fn all_transaction_hashes(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(transactions::all_hashes)
    }

    /// Enriched, timestamp-ordered history of a batch.
    pub fn batch_history(&self, batch_no: &str) -> Result<Vec<BatchEvent>, StoreError> {
        self.with_conn(|conn| refs::batch_history(conn, batch_no))
    }

    /// Raw index rows for a batch.
    pub fn batch_refs(&self, batch_no: &str) -> Result<Vec<BatchRef>, StoreError> {
        self.with_conn(|conn| refs::for_batch(conn, batch_no))
    }

    /// Sealed-transaction counts per stage.
    pub fn stage_counts(&self) -> Result<std::collections::BTreeMap<String, u64>, StoreError> {
        self.with_conn(refs::stage_counts)
    }

    // -- Metadata -----------------------------------------------------------

    /// Read a metadata value.
    pub fn metadata_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| metadata::get(conn, key))
    }

    /// Insert or replace a metadata value.
    pub fn metadata_set(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| metadata::set(conn, key, value, description))
    }

    // -- Reset --------------------------------------------------------------

    /// Operator reset: delete the index, then transactions, then blocks,
    /// in one SQL transaction (FK order). Keys and metadata survive.
    /// Returns the number of blocks deleted.
    pub fn clear_chain(&self) -> Result<u64, StoreError> {
        self.with_tx(|db_tx| {
            db_tx.execute("DELETE FROM batch_refs", [])?;
            db_tx.execute("DELETE FROM transactions", [])?;
            let deleted = db_tx.execute("DELETE FROM blocks", [])?;
            Ok(deleted as u64)
        })
    }
}
