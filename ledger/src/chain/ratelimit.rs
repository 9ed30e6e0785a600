//! Per-actor admission rate limiting.
//!
//! Fixed windows with lazy expiry: each actor's counter carries the
//! instant its window opened, and the first admission attempted after
//! the window has elapsed resets it. Nothing ticks in the background —
//! an idle actor's entry just sits there until the operator clears the
//! map or the actor comes back.
//!
//! The counter map is concurrent so `clear` (an operator action) never
//! has to contend with the engine lock.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Per-user fixed-window counters.
pub struct RateLimiter {
    windows: DashMap<i64, Window>,
    window: Duration,
    max: u32,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    count: u32,
}

impl RateLimiter {
    /// A limiter admitting `max` transactions per `window` per user.
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max,
        }
    }

    /// Try to record one admission for the user. Returns `false` when
    /// the user's quota for the current window is exhausted; the counter
    /// is only incremented on success.
    pub fn try_acquire(&self, user_id: i64) -> bool {
        let now = Instant::now();
        let mut entry = self.windows.entry(user_id).or_insert(Window {
            opened: now,
            count: 0,
        });

        // Lazy expiry: first attempt past the window opens a fresh one.
        if now.duration_since(entry.opened) >= self.window {
            entry.opened = now;
            entry.count = 0;
        }

        if entry.count >= self.max {
            debug!(user_id, max = self.max, "rate limit exhausted");
            return false;
        }
        entry.count += 1;
        true
    }

    /// Operator action: drop every counter.
    pub fn clear(&self) {
        self.windows.clear();
    }

    /// Number of users with live counters, for stats.
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }

    /// The configured per-window quota.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// The configured window width.
    pub fn window(&self) -> Duration {
        self.window
    }
}
