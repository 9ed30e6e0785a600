//! # The Ledger Handle
//!
//! One `Ledger` owns the whole core: the single-writer chain engine
//! behind a mutex, the shared store, the key store, the rate limiter,
//! and the last integrity report. Clones share state; the HTTP layer
//! holds one clone per worker and every call goes through here.
//!
//! The process-wide singleton the host expects is modeled with
//! [`Ledger::init_global`], which installs a handle exactly once and
//! rejects a second initialization.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::block::Block;
use crate::chain::{ChainEngine, RateLimiter, ReloadOutcome, SubmitReceipt};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::health::IntegrityReport;
use crate::keystore::{GeneratedKeys, KeyStore};
use crate::store::{BatchEvent, BatchRef, KeyInfo, LedgerStore};
use crate::time;
use crate::transaction::{
    sign_transaction, Transaction, TransactionBuilder, TransactionType,
};

static GLOBAL: OnceLock<Ledger> = OnceLock::new();

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// A prospective supply-chain event, before the engine turns it into a
/// signed transaction. What the HTTP layer assembles from a request.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub transaction_type: TransactionType,
    pub batch_no: String,
    pub transaction_data: serde_json::Value,
    pub from_entity_id: Option<i64>,
    pub to_entity_id: Option<i64>,
    pub document_hashes: Option<BTreeMap<String, String>>,
}

impl EventDraft {
    /// A draft with just the tag, batch, and payload.
    pub fn new(
        transaction_type: TransactionType,
        batch_no: impl Into<String>,
        transaction_data: serde_json::Value,
    ) -> Self {
        Self {
            transaction_type,
            batch_no: batch_no.into(),
            transaction_data,
            from_entity_id: None,
            to_entity_id: None,
            document_hashes: None,
        }
    }
}

/// Chain statistics for the read surface.
#[derive(Debug, Clone, Serialize)]
pub struct ChainStats {
    pub blocks: u64,
    pub transactions: u64,
    pub pending: usize,
    pub replay_entries: usize,
    pub difficulty: u32,
    pub validators: Vec<i64>,
    pub latest_block_number: u64,
    pub latest_block_hash: String,
    #[serde(with = "crate::time::serde_canonical")]
    pub latest_block_time: DateTime<Utc>,
    /// Sealed transactions per supply-chain stage.
    pub stage_counts: BTreeMap<String, u64>,
}

/// Point-in-time health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub chain_valid: bool,
    pub blocks_in_memory: u64,
    pub blocks_in_store: u64,
    pub pending: usize,
    pub last_check: Option<IntegrityReport>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

struct LedgerInner {
    config: LedgerConfig,
    store: Arc<LedgerStore>,
    keystore: Arc<KeyStore>,
    engine: Mutex<ChainEngine>,
    rate: RateLimiter,
    last_check: Mutex<Option<IntegrityReport>>,
}

/// Cloneable handle to the ledger core.
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open a ledger over the given store and initialize it: load or
    /// synthesize the chain, seed the replay set, install validators,
    /// and run one validation pass.
    pub fn open(config: LedgerConfig, store: LedgerStore) -> Result<Self, LedgerError> {
        let store = Arc::new(store);
        let keystore = Arc::new(KeyStore::new(Arc::clone(&store), &config));
        let rate = RateLimiter::new(config.rate_window, config.rate_max);
        let mut engine = ChainEngine::new(config.clone(), Arc::clone(&store), Arc::clone(&keystore));
        engine.initialize()?;

        Ok(Self {
            inner: Arc::new(LedgerInner {
                config,
                store,
                keystore,
                engine: Mutex::new(engine),
                rate,
                last_check: Mutex::new(None),
            }),
        })
    }

    /// Install the process-wide handle. Fails with `AlreadyInitialized`
    /// when a handle has been installed before; all callers are meant
    /// to share the first one.
    pub fn init_global(config: LedgerConfig, store: LedgerStore) -> Result<Ledger, LedgerError> {
        let ledger = Self::open(config, store)?;
        GLOBAL
            .set(ledger.clone())
            .map_err(|_| LedgerError::AlreadyInitialized)?;
        Ok(ledger)
    }

    /// The process-wide handle, if one was installed.
    pub fn global() -> Option<Ledger> {
        GLOBAL.get().cloned()
    }

    // -- Write surface ------------------------------------------------------

    /// Build, sign, and admit a transaction for a prospective event.
    ///
    /// Fetches the actor's private key from the key store (failing with
    /// `KeyMissing`/`KeyInactive`/`DecryptFailed`), constructs the
    /// transaction, signs it, and runs it through the admission gates.
    pub fn record_event(
        &self,
        draft: EventDraft,
        actor_user_id: i64,
        actor_role: impl Into<String>,
        auto_seal: bool,
        validator_id: Option<i64>,
    ) -> Result<SubmitReceipt, LedgerError> {
        let keypair = self.inner.keystore.get_private(actor_user_id)?;

        let mut builder = TransactionBuilder::new(draft.transaction_type, draft.batch_no)
            .actor(actor_user_id, actor_role)
            .data(draft.transaction_data)
            .custody(draft.from_entity_id, draft.to_entity_id);
        if let Some(hashes) = draft.document_hashes {
            builder = builder.document_hashes(hashes);
        }
        let mut tx = builder.build();
        sign_transaction(&mut tx, &keypair);

        self.add_transaction(tx, auto_seal, validator_id)
    }

    /// Admit a pre-signed transaction. `auto_seal` forces sealing after
    /// admission; the pool also seals itself at `block_size` regardless.
    pub fn add_transaction(
        &self,
        tx: Transaction,
        auto_seal: bool,
        validator_id: Option<i64>,
    ) -> Result<SubmitReceipt, LedgerError> {
        self.inner
            .engine
            .lock()
            .add_transaction(tx, &self.inner.rate, auto_seal, validator_id)
    }

    /// Seal whatever is pending into a block. `None` when the pool is
    /// empty.
    pub fn seal(&self, validator_id: Option<i64>) -> Result<Option<Block>, LedgerError> {
        self.inner.engine.lock().seal(validator_id)
    }

    // -- Queries ------------------------------------------------------------

    /// Enriched, timestamp-ordered history of a batch. Empty for a batch
    /// the chain has never seen.
    pub fn get_batch_history(&self, batch_no: &str) -> Result<Vec<BatchEvent>, LedgerError> {
        Ok(self.inner.store.batch_history(batch_no)?)
    }

    /// The batch→stage index rows for a batch.
    pub fn get_batch_reference(&self, batch_no: &str) -> Result<Vec<BatchRef>, LedgerError> {
        let refs = self.inner.store.batch_refs(batch_no)?;
        if refs.is_empty() {
            return Err(LedgerError::NotFound(format!("batch {batch_no}")));
        }
        Ok(refs)
    }

    /// Validate the in-memory chain.
    pub fn validate_chain(&self) -> bool {
        self.inner.engine.lock().validate_chain()
    }

    /// A block by number.
    pub fn get_block(&self, block_number: u64) -> Result<Block, LedgerError> {
        self.inner
            .engine
            .lock()
            .block(block_number)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("block {block_number}")))
    }

    /// A sealed transaction by hash.
    pub fn get_transaction(&self, hash: &str) -> Result<Transaction, LedgerError> {
        self.inner
            .engine
            .lock()
            .transaction(hash)
            .map(|(tx, _)| tx.clone())
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {hash}")))
    }

    /// The whole in-memory chain.
    pub fn get_all_blocks(&self) -> Vec<Block> {
        self.inner.engine.lock().blocks().to_vec()
    }

    /// Every sealed transaction, chain order.
    pub fn get_all_transactions(&self) -> Vec<Transaction> {
        self.inner.engine.lock().all_transactions()
    }

    /// Chain statistics.
    pub fn get_stats(&self) -> Result<ChainStats, LedgerError> {
        let stage_counts = self.inner.store.stage_counts()?;
        let engine = self.inner.engine.lock();
        let tip = engine.tip().ok_or_else(|| LedgerError::IntegrityFailed {
            issues: vec!["chain is empty".to_string()],
        })?;

        Ok(ChainStats {
            blocks: engine.height() as u64,
            transactions: engine
                .blocks()
                .iter()
                .map(|b| b.transactions.len() as u64)
                .sum(),
            pending: engine.pending(),
            replay_entries: engine.replay_len(),
            difficulty: engine.difficulty(),
            validators: engine.validators(),
            latest_block_number: tip.block_number,
            latest_block_hash: tip.hash.clone(),
            latest_block_time: tip.timestamp,
            stage_counts,
        })
    }

    /// Point-in-time health snapshot (does not run a full check; see
    /// [`Ledger::run_integrity_check`]).
    pub fn get_health(&self) -> Result<HealthStatus, LedgerError> {
        let blocks_in_store = self.inner.store.block_count()?;
        let engine = self.inner.engine.lock();
        let chain_valid = engine.validate_chain();
        let blocks_in_memory = engine.height() as u64;
        let pending = engine.pending();
        drop(engine);

        Ok(HealthStatus {
            healthy: chain_valid && blocks_in_memory == blocks_in_store,
            chain_valid,
            blocks_in_memory,
            blocks_in_store,
            pending,
            last_check: self.last_integrity_report(),
        })
    }

    // -- Maintenance --------------------------------------------------------

    /// Drop in-memory state and rebuild it from the store.
    pub fn reload_chain(&self) -> Result<ReloadOutcome, LedgerError> {
        info!("reloading chain from store");
        self.inner.engine.lock().reload()
    }

    /// Operator reset: wipe the chain and start over from a fresh
    /// genesis. Requires an operator identity unless the configuration
    /// disables the gate. Returns the new chain length.
    pub fn reset(&self, operator_user_id: Option<i64>) -> Result<usize, LedgerError> {
        if self.inner.config.require_operator_reset && operator_user_id.is_none() {
            return Err(LedgerError::OperatorOnly);
        }
        warn!(operator = ?operator_user_id, "operator reset requested");
        self.inner.engine.lock().reset()
    }

    /// Add a user to the validator set (persisted).
    pub fn add_validator(&self, user_id: i64) -> Result<(), LedgerError> {
        self.inner.engine.lock().add_validator(user_id)
    }

    /// Whether the user may sign blocks.
    pub fn is_validator(&self, user_id: i64) -> bool {
        self.inner.engine.lock().is_validator(user_id)
    }

    /// Operator action: forget all rate-limit counters.
    pub fn clear_rate_limits(&self) {
        info!("clearing rate-limit counters");
        self.inner.rate.clear();
    }

    // -- Key store pass-throughs --------------------------------------------

    /// Create or rotate an actor's keypair. The plaintext private key in
    /// the result is shown exactly once.
    pub fn generate_keys(&self, user_id: i64) -> Result<GeneratedKeys, LedgerError> {
        Ok(self.inner.keystore.generate(user_id)?)
    }

    /// The actor's active public key, or `None`.
    pub fn get_public_key(&self, user_id: i64) -> Result<Option<String>, LedgerError> {
        Ok(self.inner.keystore.get_public(user_id)?)
    }

    /// Key metadata, without private material.
    pub fn get_key_info(&self, user_id: i64) -> Result<Option<KeyInfo>, LedgerError> {
        Ok(self.inner.keystore.get_info(user_id)?)
    }

    /// Block an actor's key from signing.
    pub fn deactivate_keys(&self, user_id: i64) -> Result<(), LedgerError> {
        Ok(self.inner.keystore.deactivate(user_id)?)
    }

    /// Restore a deactivated key.
    pub fn reactivate_keys(&self, user_id: i64) -> Result<(), LedgerError> {
        Ok(self.inner.keystore.reactivate(user_id)?)
    }

    /// Whether the actor currently has an active key.
    pub fn has_active_keys(&self, user_id: i64) -> Result<bool, LedgerError> {
        Ok(self.inner.keystore.has_active(user_id)?)
    }

    // -- Integrity ----------------------------------------------------------

    /// Run one integrity check, with auto-recovery on divergence.
    ///
    /// Phase 1 compares under a brief engine lock: chain validation,
    /// stored-vs-memory block count, and per-block hash comparison. Any
    /// issue triggers recovery (clear and reload from the store) and a
    /// second comparison whose outcome is the reported result.
    pub fn run_integrity_check(&self) -> IntegrityReport {
        let started = Instant::now();
        let mut issues = self.integrity_issues();
        let mut recovered = false;

        if !issues.is_empty() {
            warn!(?issues, "integrity check found issues; auto-recovering from store");
            recovered = true;
            match self.inner.engine.lock().reload() {
                Ok(outcome) => {
                    info!(blocks = outcome.blocks, valid = outcome.valid, "auto-recovery reloaded chain");
                    issues = self.integrity_issues();
                }
                Err(e) => {
                    issues.push(format!("auto-recovery reload failed: {e}"));
                }
            }
        }

        let report = IntegrityReport {
            checked_at: time::now_canonical(),
            duration_ms: started.elapsed().as_millis() as u64,
            passed: issues.is_empty(),
            issues,
            recovered,
        };
        *self.inner.last_check.lock() = Some(report.clone());
        report
    }

    /// The most recent integrity report, if any check has run.
    pub fn last_integrity_report(&self) -> Option<IntegrityReport> {
        self.inner.last_check.lock().clone()
    }

    /// The comparison phase of the integrity check.
    fn integrity_issues(&self) -> Vec<String> {
        let engine = self.inner.engine.lock();
        let mut issues = engine.chain_issues();

        match self.inner.store.block_count() {
            Ok(stored) => {
                let in_memory = engine.height() as u64;
                if stored != in_memory {
                    issues.push(format!(
                        "store has {stored} blocks, memory has {in_memory}"
                    ));
                }
            }
            Err(e) => issues.push(format!("block count query failed: {e}")),
        }

        match self.inner.store.stored_hashes() {
            Ok(stored) => {
                for (block_number, stored_hash) in stored {
                    match engine.block(block_number) {
                        Some(block) if block.hash == stored_hash => {}
                        Some(_) => issues.push(format!(
                            "block {block_number} hash differs between store and memory"
                        )),
                        None => issues.push(format!(
                            "block {block_number} exists in store but not in memory"
                        )),
                    }
                }
            }
            Err(e) => issues.push(format!("stored hash query failed: {e}")),
        }

        issues
    }
}
