//! # Health Supervisor
//!
//! A timer task that periodically compares the in-memory chain against
//! the durable store and repairs divergence by reloading from storage.
//!
//! ## Check phases
//!
//! 1. Validate the in-memory chain (linkage, numbering, PoW, Merkle,
//!    signatures).
//! 2. Compare the stored block count to the in-memory height.
//! 3. Compare every stored `block_hash` (tip included) to its in-memory
//!    counterpart.
//!
//! Any issue triggers **auto-recovery**: clear in-memory state, reload
//! from the store, and run the comparison again. The post-recovery
//! result is what the check reports: a chain that is self-consistent in
//! memory but invalid in the store stays reported as failing while the
//! process keeps serving queries.
//!
//! The supervisor holds no lock while it sleeps; it contends for the
//! engine lock only during the comparison and recovery phases.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ledger::Ledger;

// ---------------------------------------------------------------------------
// IntegrityReport
// ---------------------------------------------------------------------------

/// Record of one integrity check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityReport {
    /// When the check ran.
    #[serde(with = "crate::time::serde_canonical")]
    pub checked_at: DateTime<Utc>,

    /// Wall-clock duration of the check, recovery included.
    pub duration_ms: u64,

    /// Whether the (post-recovery, if any) state is issue-free.
    pub passed: bool,

    /// Human-readable issue list. Empty when `passed`.
    pub issues: Vec<String>,

    /// Whether auto-recovery ran during this check.
    pub recovered: bool,
}

// ---------------------------------------------------------------------------
// Supervisor task
// ---------------------------------------------------------------------------

/// Handle to a running supervisor task.
pub struct SupervisorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    /// Abort without waiting. For process teardown paths where the
    /// runtime is going away anyway.
    pub fn abort(self) {
        self.task.abort();
    }
}

/// Spawn the supervisor on the current tokio runtime.
///
/// The first check runs one full `interval` after spawn, then every
/// `interval` thereafter. Results land in the ledger's last-check slot
/// (see [`Ledger::last_integrity_report`]) and in the log.
pub fn spawn_supervisor(ledger: Ledger, interval: Duration) -> SupervisorHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    info!(interval_secs = interval.as_secs(), "starting health supervisor");

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval() fires immediately on the first tick; consume it so
        // the first real check happens one full period after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = ledger.run_integrity_check();
                    if report.passed {
                        debug!(duration_ms = report.duration_ms, "integrity check passed");
                    } else {
                        warn!(
                            issues = ?report.issues,
                            recovered = report.recovered,
                            "integrity check failed"
                        );
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
        debug!("health supervisor stopped");
    });

    SupervisorHandle { shutdown, task }
}
