//! # Chain Engine
//!
//! The single-writer core: the ordered block list, the pending pool and
//! replay set, the validator set, difficulty adjustment, and the
//! admission → seal → persist pipeline.
//!
//! ## Pipeline
//!
//! ```text
//! 1. ADMIT   — verify, replay-gate, rate-limit, enqueue
//! 2. DRAIN   — FIFO slice of up to block_size pending transactions
//! 3. MINE    — nonce search to the current difficulty target
//! 4. SIGN    — validator signature, when a validator key is loadable
//! 5. PERSIST — block + transactions + batch index in one SQL transaction
//! 6. APPEND  — in-memory chain advances only after the store commits
//! ```
//!
//! Step 6 is the rollback guarantee: on a persistence failure the drained
//! transactions return to the front of the pending pool and the chain is
//! untouched, so memory never runs ahead of the store.
//!
//! The engine itself is not thread-safe; [`crate::Ledger`] owns it behind
//! a mutex and serializes every mutation through that lock.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::pool::PendingPool;
use super::ratelimit::RateLimiter;
use crate::block::Block;
use crate::config::{LedgerConfig, DEFAULT_VALIDATORS, META_VALIDATORS_KEY, MIN_DIFFICULTY};
use crate::error::LedgerError;
use crate::keystore::KeyStore;
use crate::store::LedgerStore;
use crate::transaction::{verify_transaction, Transaction};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What `add_transaction` hands back: the admitted transaction, the block
/// it was sealed into (when admission triggered sealing), and the pending
/// pool size afterwards.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub transaction: Transaction,
    pub block: Option<Block>,
    pub pending: usize,
}

/// Outcome of a chain reload from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// Blocks now in memory.
    pub blocks: usize,
    /// Result of the post-reload chain validation.
    pub valid: bool,
}

// ---------------------------------------------------------------------------
// ChainEngine
// ---------------------------------------------------------------------------

/// The in-memory chain plus everything needed to extend it.
pub struct ChainEngine {
    config: LedgerConfig,
    store: Arc<LedgerStore>,
    keystore: Arc<KeyStore>,
    chain: Vec<Block>,
    pool: PendingPool,
    validators: HashSet<i64>,
    /// Difficulty the next mined block must meet. Resumes from the tip
    /// on reload; re-evaluated at every adjustment boundary.
    difficulty: u32,
}

impl ChainEngine {
    /// An engine with an empty chain. Call [`ChainEngine::initialize`]
    /// (or let [`crate::Ledger::open`] do it) before anything else.
    pub fn new(config: LedgerConfig, store: Arc<LedgerStore>, keystore: Arc<KeyStore>) -> Self {
        let difficulty = config.initial_difficulty;
        Self {
            config,
            store,
            keystore,
            chain: Vec::new(),
            pool: PendingPool::new(),
            validators: HashSet::new(),
            difficulty,
        }
    }

    /// Load the chain from the store (synthesizing genesis on a fresh
    /// store), seed the replay set, load the validator set, and run one
    /// validation pass.
    pub fn initialize(&mut self) -> Result<ReloadOutcome, LedgerError> {
        let outcome = self.reload()?;
        info!(
            blocks = outcome.blocks,
            valid = outcome.valid,
            difficulty = self.difficulty,
            "ledger engine initialized"
        );
        Ok(outcome)
    }

    /// Rebuild all in-memory state from the store.
    ///
    /// Stored block digests are trusted (the store is authoritative)
    /// unless `strict_reload_verification` is set, in which case every
    /// hash is recomputed and every signature re-verified, and any
    /// mismatch fails the reload with `IntegrityFailed`.
    pub fn reload(&mut self) -> Result<ReloadOutcome, LedgerError> {
        let mut chain = self.store.load_chain()?;

        if chain.is_empty() {
            let genesis = Block::genesis();
            self.store.persist_block(&genesis)?;
            info!(hash = %genesis.hash, "synthesized genesis block");
            chain.push(genesis);
        }

        if self.config.strict_reload_verification {
            let issues = Self::verify_blocks_strict(&chain);
            if !issues.is_empty() {
                return Err(LedgerError::IntegrityFailed { issues });
            }
        }

        self.pool.clear();
        self.pool
            .seed_replay(self.store.all_transaction_hashes()?);

        self.validators = self.load_validators()?;

        // Resume mining difficulty from the tip; a fresh chain starts at
        // the configured initial value (genesis itself carries 0).
        self.difficulty = match chain.last() {
            Some(tip) if tip.block_number > 0 => tip.difficulty,
            _ => self.config.initial_difficulty,
        };

        self.chain = chain;
        let valid = self.validate_chain();
        if !valid {
            warn!(issues = ?self.chain_issues(), "reloaded chain fails validation");
        }

        Ok(ReloadOutcome {
            blocks: self.chain.len(),
            valid,
        })
    }

    // -- Admission ----------------------------------------------------------

    /// Admit a signed transaction through the gates, auto-sealing when
    /// the pool fills (or when the caller forces it).
    ///
    /// Gate order is contractual: verification, then replay, then rate
    /// limit. A replayed transaction must not consume rate quota.
    pub fn add_transaction(
        &mut self,
        tx: Transaction,
        rate: &RateLimiter,
        force_seal: bool,
        validator_id: Option<i64>,
    ) -> Result<SubmitReceipt, LedgerError> {
        verify_transaction(&tx)?;

        if self.pool.seen(&tx.hash) {
            return Err(LedgerError::Replay {
                hash: tx.hash.clone(),
            });
        }

        if !rate.try_acquire(tx.actor_user_id) {
            return Err(LedgerError::RateLimited {
                user_id: tx.actor_user_id,
                max: rate.max(),
                window_secs: rate.window().as_secs(),
            });
        }

        debug!(
            hash = %tx.hash,
            batch_no = %tx.batch_no,
            tx_type = %tx.transaction_type,
            "admitted transaction"
        );
        let transaction = tx.clone();
        self.pool.push(tx);

        let block = if force_seal || self.pool.len() >= self.config.block_size {
            self.seal(validator_id)?
        } else {
            None
        };

        Ok(SubmitReceipt {
            transaction,
            block,
            pending: self.pool.len(),
        })
    }

    // -- Sealing ------------------------------------------------------------

    /// Seal the pending pool into a block: drain, mine, sign, persist,
    /// append. Returns `None` when there is nothing pending.
    pub fn seal(&mut self, validator_id: Option<i64>) -> Result<Option<Block>, LedgerError> {
        if self.pool.is_empty() {
            return Ok(None);
        }
        let Some(tip) = self.chain.last() else {
            return Err(LedgerError::IntegrityFailed {
                issues: vec!["chain is empty; engine was never initialized".to_string()],
            });
        };

        let block_number = tip.block_number + 1;
        let previous_hash = tip.hash.clone();

        if block_number >= self.config.adjust_every
            && block_number % self.config.adjust_every == 0
        {
            self.difficulty = self.adjusted_difficulty(block_number);
        }

        let transactions = self.pool.drain(self.config.block_size);
        let mut block = Block::draft(block_number, previous_hash, transactions, self.difficulty);

        // Sign-and-mine when a validator key is loadable; the signing
        // path embeds the validator identity before the nonce search so
        // the block is mined exactly once.
        match validator_id.and_then(|id| self.validator_keypair(id)) {
            Some((id, keypair)) => block.sign_as_validator(id, &keypair),
            None => {
                block.mine();
            }
        }

        match self.store.persist_block(&block) {
            Ok(_) => {
                info!(
                    block_number,
                    transactions = block.transactions.len(),
                    difficulty = block.difficulty,
                    mining_time_ms = block.mining_time_ms.unwrap_or(0),
                    signed = block.validator_signature.is_some(),
                    hash = %block.hash,
                    "sealed block"
                );
                self.chain.push(block.clone());
                Ok(Some(block))
            }
            Err(e) => {
                warn!(block_number, error = %e, "sealing persistence failed; restoring pending pool");
                self.pool.restore_front(block.transactions);
                Err(LedgerError::PersistenceFailed(e))
            }
        }
    }

    /// Resolve a validator's signing key. Non-members and key failures
    /// log and fall back to an unsigned block. A missing signature is
    /// legal, a missing block is not.
    fn validator_keypair(&self, validator_id: i64) -> Option<(i64, crate::crypto::ecdsa::ActorKeypair)> {
        if !self.validators.contains(&validator_id) {
            warn!(validator_id, "seal requested by non-validator; sealing unsigned");
            return None;
        }
        match self.keystore.get_private(validator_id) {
            Ok(keypair) => Some((validator_id, keypair)),
            Err(e) => {
                warn!(validator_id, error = %e, "validator key unavailable; sealing unsigned");
                None
            }
        }
    }

    /// Difficulty for the block about to be sealed at an adjustment
    /// boundary: compare the previous window's span to the target.
    fn adjusted_difficulty(&self, block_number: u64) -> u32 {
        let window_start = &self.chain[(block_number - self.config.adjust_every) as usize];
        let window_end = &self.chain[(block_number - 1) as usize];

        let span_ms = window_end
            .timestamp
            .signed_duration_since(window_start.timestamp)
            .num_milliseconds()
            .max(0) as u128;
        let expected_ms =
            self.config.target_block_time.as_millis() * u128::from(self.config.adjust_every);

        let adjusted = if span_ms < expected_ms / 2 {
            self.difficulty + 1
        } else if span_ms > expected_ms * 2 {
            self.difficulty.saturating_sub(1).max(MIN_DIFFICULTY)
        } else {
            self.difficulty
        };

        if adjusted != self.difficulty {
            info!(
                block_number,
                from = self.difficulty,
                to = adjusted,
                span_ms = span_ms as u64,
                expected_ms = expected_ms as u64,
                "adjusted mining difficulty"
            );
        }
        adjusted
    }

    // -- Validation ---------------------------------------------------------

    /// Whole-chain validation: genesis shape, numbering, linkage, and
    /// per-block structure (PoW target, Merkle root, validator
    /// signature).
    pub fn validate_chain(&self) -> bool {
        self.chain_issues().is_empty()
    }

    /// The detailed issue list behind [`ChainEngine::validate_chain`].
    pub fn chain_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let Some(genesis) = self.chain.first() else {
            issues.push("chain is empty".to_string());
            return issues;
        };
        if genesis.block_number != 0 {
            issues.push(format!(
                "first block has number {}, expected 0",
                genesis.block_number
            ));
        }

        for (i, block) in self.chain.iter().enumerate() {
            if block.block_number != i as u64 {
                issues.push(format!(
                    "block at index {i} has number {}",
                    block.block_number
                ));
            }
            if i > 0 {
                let prev = &self.chain[i - 1];
                if block.previous_hash != prev.hash {
                    issues.push(format!(
                        "block {} previous_hash does not match block {} hash",
                        block.block_number, prev.block_number
                    ));
                }
            }
            if let Err(e) = block.validate(false) {
                issues.push(e.to_string());
            }
        }

        issues
    }

    fn verify_blocks_strict(chain: &[Block]) -> Vec<String> {
        let mut issues = Vec::new();
        for block in chain {
            if let Err(e) = block.validate(true) {
                issues.push(e.to_string());
            }
            for tx in &block.transactions {
                if tx.hash != tx.compute_hash() {
                    issues.push(format!(
                        "transaction {} hash does not match its payload",
                        tx.hash
                    ));
                }
            }
        }
        issues
    }

    // -- Validators ---------------------------------------------------------

    /// Whether the user may sign blocks.
    pub fn is_validator(&self, user_id: i64) -> bool {
        self.validators.contains(&user_id)
    }

    /// Add a user to the validator set and persist the set.
    pub fn add_validator(&mut self, user_id: i64) -> Result<(), LedgerError> {
        if self.validators.insert(user_id) {
            self.persist_validators()?;
            info!(user_id, "added validator");
        }
        Ok(())
    }

    /// The validator set, sorted for stable output.
    pub fn validators(&self) -> Vec<i64> {
        let mut set: Vec<i64> = self.validators.iter().copied().collect();
        set.sort_unstable();
        set
    }

    fn load_validators(&self) -> Result<HashSet<i64>, LedgerError> {
        match self.store.metadata_get(META_VALIDATORS_KEY)? {
            Some(raw) => {
                let parsed: Vec<i64> = serde_json::from_str(&raw).unwrap_or_else(|e| {
                    warn!(error = %e, "corrupt validator set in metadata; using default");
                    DEFAULT_VALIDATORS.to_vec()
                });
                Ok(parsed.into_iter().collect())
            }
            None => {
                let default: HashSet<i64> = DEFAULT_VALIDATORS.iter().copied().collect();
                let mut sorted: Vec<i64> = default.iter().copied().collect();
                sorted.sort_unstable();
                self.store.metadata_set(
                    META_VALIDATORS_KEY,
                    &serde_json::to_string(&sorted).expect("validator set serializes"),
                    Some("user ids allowed to sign blocks"),
                )?;
                Ok(default)
            }
        }
    }

    fn persist_validators(&self) -> Result<(), LedgerError> {
        let sorted = self.validators();
        self.store.metadata_set(
            META_VALIDATORS_KEY,
            &serde_json::to_string(&sorted).expect("validator set serializes"),
            None,
        )?;
        Ok(())
    }

    // -- Reset --------------------------------------------------------------

    /// Operator reset: wipe the stored chain (index → transactions →
    /// blocks), clear memory, and re-initialize with a fresh genesis.
    /// Returns the new chain length (1). The operator gate lives on the
    /// [`crate::Ledger`] surface.
    pub fn reset(&mut self) -> Result<usize, LedgerError> {
        let deleted = self.store.clear_chain()?;
        self.chain.clear();
        self.pool.clear();
        warn!(deleted_blocks = deleted, "chain reset; re-initializing");
        let outcome = self.reload()?;
        Ok(outcome.blocks)
    }

    // -- Queries ------------------------------------------------------------

    /// The latest sealed block.
    pub fn tip(&self) -> Option<&Block> {
        self.chain.last()
    }

    /// Number of sealed blocks (including genesis).
    pub fn height(&self) -> usize {
        self.chain.len()
    }

    /// A block by number.
    pub fn block(&self, block_number: u64) -> Option<&Block> {
        // block_number == index while the chain is well-formed; fall back
        // to a scan when it is not (a recovered-but-invalid chain must
        // still serve queries).
        match self.chain.get(block_number as usize) {
            Some(b) if b.block_number == block_number => Some(b),
            _ => self.chain.iter().find(|b| b.block_number == block_number),
        }
    }

    /// The whole in-memory chain.
    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// A sealed transaction by hash.
    pub fn transaction(&self, hash: &str) -> Option<(&Transaction, &Block)> {
        self.chain.iter().find_map(|block| {
            block
                .transactions
                .iter()
                .find(|tx| tx.hash == hash)
                .map(|tx| (tx, block))
        })
    }

    /// Every sealed transaction, chain order.
    pub fn all_transactions(&self) -> Vec<Transaction> {
        self.chain
            .iter()
            .flat_map(|b| b.transactions.iter().cloned())
            .collect()
    }

    /// Pending pool size.
    pub fn pending(&self) -> usize {
        self.pool.len()
    }

    /// Replay set size.
    pub fn replay_len(&self) -> usize {
        self.pool.replay_len()
    }

    /// Current mining difficulty.
    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ecdsa::ActorKeypair;
    use crate::transaction::{sign_transaction, TransactionBuilder, TransactionType};

    fn setup_with(config: LedgerConfig) -> (ChainEngine, RateLimiter, Arc<LedgerStore>) {
        let store = Arc::new(LedgerStore::open_in_memory().unwrap());
        let keystore = Arc::new(KeyStore::new(Arc::clone(&store), &config));
        let rate = RateLimiter::new(config.rate_window, config.rate_max);
        let mut engine = ChainEngine::new(config, Arc::clone(&store), keystore);
        engine.initialize().unwrap();
        (engine, rate, store)
    }

    fn setup() -> (ChainEngine, RateLimiter, Arc<LedgerStore>) {
        setup_with(LedgerConfig::for_tests())
    }

    fn signed_tx(user_id: i64, batch: &str) -> Transaction {
        let kp = ActorKeypair::generate();
        let mut tx = TransactionBuilder::new(TransactionType::BatchCreate, batch)
            .actor(user_id, "farmer")
            .data(serde_json::json!({ "plot": "A-1" }))
            .build();
        sign_transaction(&mut tx, &kp);
        tx
    }

    #[test]
    fn initialize_synthesizes_genesis() {
        let (engine, _, store) = setup();
        assert_eq!(engine.height(), 1);
        let tip = engine.tip().unwrap();
        assert_eq!(tip.block_number, 0);
        assert_eq!(tip.previous_hash, "0");
        assert!(engine.validate_chain());
        assert_eq!(store.block_count().unwrap(), 1);
        // Default validator set installed and persisted.
        assert!(engine.is_validator(1));
        assert!(store.metadata_get(META_VALIDATORS_KEY).unwrap().is_some());
    }

    #[test]
    fn admit_and_force_seal_produces_block_one() {
        let (mut engine, rate, _) = setup();
        let tx = signed_tx(7, "BATCH001");
        let receipt = engine.add_transaction(tx, &rate, true, None).unwrap();

        let block = receipt.block.expect("forced seal");
        assert_eq!(block.block_number, 1);
        assert_eq!(block.previous_hash, engine.blocks()[0].hash);
        assert!(block.hash.starts_with("00"), "difficulty 2 prefix");
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(receipt.pending, 0);
        assert!(engine.validate_chain());
    }

    #[test]
    fn replay_gate_fires_before_rate_limit() {
        let mut config = LedgerConfig::for_tests();
        config.rate_max = 1;
        let (mut engine, rate, _) = setup_with(config);

        let tx = signed_tx(7, "BATCH001");
        engine.add_transaction(tx.clone(), &rate, false, None).unwrap();

        // The same bytes again: quota is exhausted too, but the replay
        // gate must answer first and must not consume anything.
        let err = engine.add_transaction(tx, &rate, false, None).unwrap_err();
        assert!(matches!(err, LedgerError::Replay { .. }));
    }

    #[test]
    fn rate_limit_gate_rejects_over_quota() {
        let mut config = LedgerConfig::for_tests();
        config.rate_max = 2;
        let (mut engine, rate, _) = setup_with(config);

        engine
            .add_transaction(signed_tx(9, "B1"), &rate, false, None)
            .unwrap();
        engine
            .add_transaction(signed_tx(9, "B2"), &rate, false, None)
            .unwrap();
        let err = engine
            .add_transaction(signed_tx(9, "B3"), &rate, false, None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::RateLimited { user_id: 9, .. }));

        // Another actor is unaffected.
        assert!(engine
            .add_transaction(signed_tx(10, "B4"), &rate, false, None)
            .is_ok());
    }

    #[test]
    fn invalid_transaction_rejected_without_side_effects() {
        let (mut engine, rate, _) = setup();
        let tx = TransactionBuilder::new(TransactionType::BatchCreate, "B1")
            .actor(7, "farmer")
            .build(); // unsigned
        let err = engine.add_transaction(tx, &rate, false, None).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransaction(_)));
        assert_eq!(engine.pending(), 0);
        assert_eq!(engine.replay_len(), 0);
    }

    #[test]
    fn auto_seal_at_block_size() {
        let mut config = LedgerConfig::for_tests();
        config.block_size = 3;
        let (mut engine, rate, _) = setup_with(config);

        for n in 0..2 {
            let receipt = engine
                .add_transaction(signed_tx(7, &format!("B{n}")), &rate, false, None)
                .unwrap();
            assert!(receipt.block.is_none());
        }
        let receipt = engine
            .add_transaction(signed_tx(7, "B2"), &rate, false, None)
            .unwrap();
        let block = receipt.block.expect("pool hit block_size");
        assert_eq!(block.transactions.len(), 3);
        assert_eq!(receipt.pending, 0);
    }

    #[test]
    fn seal_with_empty_pool_is_a_noop() {
        let (mut engine, _, _) = setup();
        assert!(engine.seal(None).unwrap().is_none());
        assert_eq!(engine.height(), 1);
    }

    #[test]
    fn sealing_preserves_admission_order() {
        let (mut engine, rate, _) = setup();
        let txs: Vec<Transaction> = (0..4).map(|n| signed_tx(7, &format!("B{n}"))).collect();
        let hashes: Vec<String> = txs.iter().map(|t| t.hash.clone()).collect();
        for tx in txs {
            engine.add_transaction(tx, &rate, false, None).unwrap();
        }
        let block = engine.seal(None).unwrap().unwrap();
        let sealed: Vec<String> = block.transactions.iter().map(|t| t.hash.clone()).collect();
        assert_eq!(sealed, hashes);
    }

    #[test]
    fn persistence_failure_rolls_back_pool_and_chain() {
        let (mut engine, rate, store) = setup();
        let tx = signed_tx(7, "BATCH001");
        engine.add_transaction(tx.clone(), &rate, false, None).unwrap();

        // Poison the store: a conflicting row under the same transaction
        // hash makes the sealing write violate UNIQUE(transaction_hash).
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO transactions (
                        transaction_hash, block_id, transaction_type, batch_no,
                        actor_user_id, actor_role, actor_signature, transaction_data,
                        nonce, timestamp
                     ) VALUES (?1, 1, 'BATCH_CREATE', 'BATCH001', 7, 'farmer', 'sig', '{}',
                               ?2, '2026-01-01T00:00:00.000Z')",
                    rusqlite::params![tx.hash, "00".repeat(32)],
                )?;
                Ok(())
            })
            .unwrap();

        let err = engine.seal(None).unwrap_err();
        assert!(matches!(err, LedgerError::PersistenceFailed(_)));

        // In-memory state rolled back: chain untouched, tx back in the pool.
        assert_eq!(engine.height(), 1);
        assert_eq!(engine.pending(), 1);
        assert_eq!(store.block_count().unwrap(), 1, "no partial block row");
    }

    #[test]
    fn validator_key_produces_signed_block() {
        let (mut engine, rate, store) = setup();
        let keystore = KeyStore::new(store, &LedgerConfig::for_tests());
        keystore.generate(1).unwrap(); // user 1 is the default validator

        let receipt = engine
            .add_transaction(signed_tx(7, "B1"), &rate, true, Some(1))
            .unwrap();
        let block = receipt.block.unwrap();
        assert_eq!(block.validator_user_id, Some(1));
        assert!(block.validator_signature.is_some());
        assert!(block.verify_validator_signature());
        assert!(block.meets_target());
        assert!(engine.validate_chain());
    }

    #[test]
    fn non_validator_or_missing_key_seals_unsigned() {
        let (mut engine, rate, _) = setup();

        // Not in the validator set.
        let receipt = engine
            .add_transaction(signed_tx(7, "B1"), &rate, true, Some(99))
            .unwrap();
        assert!(receipt.block.unwrap().validator_signature.is_none());

        // In the set, but no key material stored.
        let receipt = engine
            .add_transaction(signed_tx(7, "B2"), &rate, true, Some(1))
            .unwrap();
        assert!(receipt.block.unwrap().validator_signature.is_none());
    }

    #[test]
    fn difficulty_increases_after_a_fast_window() {
        let (mut engine, rate, _) = setup();
        assert_eq!(engine.difficulty(), 2);

        // Ten blocks sealed back-to-back: the window span is far below
        // the 100 s target, so block 10 must mine at difficulty 3.
        for n in 0..10 {
            engine
                .add_transaction(signed_tx(7, &format!("B{n}")), &rate, true, None)
                .unwrap();
        }
        assert_eq!(engine.difficulty(), 3);
        let block10 = engine.block(10).unwrap();
        assert_eq!(block10.difficulty, 3);
        assert!(block10.hash.starts_with("000"));
        assert!(engine.validate_chain());
    }

    #[test]
    fn reload_restores_chain_and_replay_set() {
        let (mut engine, rate, store) = setup();
        let tx = signed_tx(7, "BATCH001");
        engine.add_transaction(tx.clone(), &rate, true, None).unwrap();
        let chain_before: Vec<Block> = engine.blocks().to_vec();

        // A second engine over the same store sees the identical chain.
        let config = LedgerConfig::for_tests();
        let keystore = Arc::new(KeyStore::new(Arc::clone(&store), &config));
        let mut engine2 = ChainEngine::new(config, store, keystore);
        let outcome = engine2.initialize().unwrap();

        assert_eq!(outcome.blocks, 2);
        assert!(outcome.valid);
        assert_eq!(engine2.blocks(), chain_before.as_slice());
        assert_eq!(engine2.difficulty(), 2);

        // The replay set was seeded from storage.
        let err = engine2.add_transaction(tx, &rate, false, None).unwrap_err();
        assert!(matches!(err, LedgerError::Replay { .. }));
    }

    #[test]
    fn strict_reload_rejects_tampered_store() {
        let (mut engine, rate, store) = setup();
        engine
            .add_transaction(signed_tx(7, "B1"), &rate, true, None)
            .unwrap();

        // Corrupt the stored hash of block 1.
        store
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE blocks SET block_hash = ?1 WHERE block_number = 1",
                    [format!("00{}", "de".repeat(31))],
                )?;
                Ok(())
            })
            .unwrap();

        let mut config = LedgerConfig::for_tests();
        config.strict_reload_verification = true;
        let keystore = Arc::new(KeyStore::new(Arc::clone(&store), &config));
        let mut strict_engine = ChainEngine::new(config, store, keystore);
        let err = strict_engine.initialize().unwrap_err();
        assert!(matches!(err, LedgerError::IntegrityFailed { .. }));
    }

    #[test]
    fn reset_reinitializes_with_fresh_genesis() {
        let (mut engine, rate, store) = setup();
        engine.add_validator(42).unwrap();
        engine
            .add_transaction(signed_tx(7, "B1"), &rate, true, None)
            .unwrap();
        let old_genesis_hash = engine.blocks()[0].hash.clone();

        let blocks = engine.reset().unwrap();
        assert_eq!(blocks, 1);
        assert_eq!(engine.height(), 1);
        assert_eq!(engine.pending(), 0);
        assert_eq!(store.block_count().unwrap(), 1);
        assert_eq!(store.transaction_count().unwrap(), 0);
        assert_ne!(engine.blocks()[0].hash, old_genesis_hash, "fresh genesis");

        // Metadata survives reset: the extra validator is still there.
        assert!(engine.is_validator(42));
    }

    #[test]
    fn validators_persist_across_engines() {
        let (mut engine, _, store) = setup();
        engine.add_validator(42).unwrap();
        assert_eq!(engine.validators(), vec![1, 42]);

        let config = LedgerConfig::for_tests();
        let keystore = Arc::new(KeyStore::new(Arc::clone(&store), &config));
        let mut engine2 = ChainEngine::new(config, store, keystore);
        engine2.initialize().unwrap();
        assert!(engine2.is_validator(42));
        assert!(engine2.is_validator(1));
    }

    #[test]
    fn chain_issues_detects_broken_linkage_and_numbering() {
        let (mut engine, rate, _) = setup();
        for n in 0..2 {
            engine
                .add_transaction(signed_tx(7, &format!("B{n}")), &rate, true, None)
                .unwrap();
        }
        assert!(engine.validate_chain());

        engine.chain[2].previous_hash = "00".repeat(32);
        let issues = engine.chain_issues();
        assert!(!issues.is_empty());
        assert!(issues.iter().any(|i| i.contains("previous_hash")));
        assert!(!engine.validate_chain());
    }

    #[test]
    fn queries_find_blocks_and_transactions() {
        let (mut engine, rate, _) = setup();
        let tx = signed_tx(7, "BATCH001");
        engine.add_transaction(tx.clone(), &rate, true, None).unwrap();

        assert!(engine.block(0).is_some());
        assert!(engine.block(1).is_some());
        assert!(engine.block(2).is_none());

        let (found, block) = engine.transaction(&tx.hash).unwrap();
        assert_eq!(found.hash, tx.hash);
        assert_eq!(block.block_number, 1);
        assert!(engine.transaction(&"00".repeat(32)).is_none());

        assert_eq!(engine.all_transactions().len(), 1);
    }
}
