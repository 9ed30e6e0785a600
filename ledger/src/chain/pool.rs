//! Pending pool and replay set.
//!
//! Admitted transactions queue here in FIFO order until sealing drains
//! them into a block. The replay set holds every transaction hash the
//! chain has observed since initialization, pending AND sealed, and is
//! what makes a duplicate submission of the same bytes a hard error.
//!
//! Hashes are never removed from the replay set by draining: a sealed
//! transaction's hash stays burned. Only `clear` (reset/reload) empties
//! it, and reload immediately re-seeds it from the store.

use std::collections::{HashSet, VecDeque};

use crate::transaction::Transaction;

/// FIFO pending pool plus the chain-wide replay set.
#[derive(Debug, Default)]
pub struct PendingPool {
    queue: VecDeque<Transaction>,
    replay: HashSet<String>,
}

impl PendingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions waiting to be sealed.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether this hash has ever been admitted (pending or sealed).
    pub fn seen(&self, hash: &str) -> bool {
        self.replay.contains(hash)
    }

    /// Enqueue an admitted transaction and burn its hash.
    pub fn push(&mut self, tx: Transaction) {
        self.replay.insert(tx.hash.clone());
        self.queue.push_back(tx);
    }

    /// Drain up to `max` transactions in admission order. Their hashes
    /// remain in the replay set.
    pub fn drain(&mut self, max: usize) -> Vec<Transaction> {
        let take = max.min(self.queue.len());
        self.queue.drain(..take).collect()
    }

    /// Put drained transactions back at the front, preserving their
    /// original order. Used when sealing fails after the drain.
    pub fn restore_front(&mut self, txs: Vec<Transaction>) {
        for tx in txs.into_iter().rev() {
            self.queue.push_front(tx);
        }
    }

    /// Seed the replay set from storage (reload path).
    pub fn seed_replay<I: IntoIterator<Item = String>>(&mut self, hashes: I) {
        self.replay.extend(hashes);
    }

    /// Drop everything: pending queue and replay set.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.replay.clear();
    }

    /// Replay set size, for stats.
    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }
}
