//! Rate Limiting
//!
//! Sliding-window attempt counter keyed by an arbitrary string such as
//! `login:203.0.113.7`. Once a key exhausts its window it is blocked for a
//! full window, regardless of how old its earlier attempts are.
//!
//! State is process-local. Instances behind a load balancer each keep their
//! own counters.

use crate::clock::Clock;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Attempts recorded for one key
#[derive(Debug, Clone, Default)]
pub struct RateLimitEntry {
    /// Accepted attempts inside the current window, oldest first
    pub attempts: VecDeque<DateTime<Utc>>,
    /// Set once the key exceeded its budget
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitEntry {
    fn is_idle(&self, now: DateTime<Utc>, window_start: DateTime<Utc>) -> bool {
        let blocked = self.blocked_until.is_some_and(|until| now < until);
        let live_attempts = self.attempts.iter().any(|at| *at > window_start);
        !blocked && !live_attempts
    }
}

/// In-memory sliding-window rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Record an attempt for `key` if it is within budget.
    ///
    /// Returns false while the key is blocked. The attempt that overflows the
    /// budget is not recorded; it starts a block lasting `window_minutes`.
    pub fn is_allowed(&self, key: &str, max_attempts: usize, window_minutes: i64) -> bool {
        let now = self.clock.now();
        let window = Duration::minutes(window_minutes);
        let mut entry = self.entries.entry(key.to_string()).or_default();

        if let Some(until) = entry.blocked_until {
            if now < until {
                return false;
            }
            entry.blocked_until = None;
        }

        let window_start = now - window;
        while entry
            .attempts
            .front()
            .is_some_and(|oldest| *oldest <= window_start)
        {
            entry.attempts.pop_front();
        }

        if entry.attempts.len() < max_attempts {
            entry.attempts.push_back(now);
            return true;
        }

        entry.blocked_until = Some(now + window);
        tracing::warn!(key = %key, window_minutes, "Rate limit exceeded, key blocked");
        false
    }

    /// Whole seconds until `key` is unblocked, rounded up
    pub fn retry_after(&self, key: &str) -> Option<u64> {
        let now = self.clock.now();
        let until = self.entries.get(key)?.blocked_until?;
        if now >= until {
            return None;
        }

        let millis = (until - now).num_milliseconds();
        Some(((millis + 999) / 1000) as u64)
    }

    /// Forget all attempts and any block for `key`
    pub fn reset_attempts(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear_all(&self) {
        self.entries.clear();
    }

    /// Drop entries that no longer hold live attempts or an active block.
    ///
    /// `window_minutes` should be the longest window any caller uses.
    /// Returns the number of entries removed.
    pub fn purge_idle(&self, window_minutes: i64) -> usize {
        let now = self.clock.now();
        let window_start = now - Duration::minutes(window_minutes);
        let before = self.entries.len();

        self.entries
            .retain(|_, entry| !entry.is_idle(now, window_start));

        before.saturating_sub(self.entries.len())
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (RateLimiter::new(clock.clone()), clock)
    }

    #[test]
    fn allows_up_to_budget_then_blocks() {
        let (limiter, _) = limiter();

        for _ in 0..3 {
            assert!(limiter.is_allowed("register:1.2.3.4", 3, 60));
        }
        assert!(!limiter.is_allowed("register:1.2.3.4", 3, 60));
        assert!(!limiter.is_allowed("register:1.2.3.4", 3, 60));
    }

    #[test]
    fn keys_are_independent() {
        let (limiter, _) = limiter();

        assert!(limiter.is_allowed("login:a", 1, 15));
        assert!(!limiter.is_allowed("login:a", 1, 15));
        assert!(limiter.is_allowed("login:b", 1, 15));
    }

    #[test]
    fn block_lasts_a_full_window() {
        let (limiter, clock) = limiter();

        for _ in 0..5 {
            assert!(limiter.is_allowed("login:x", 5, 15));
        }
        clock.advance(Duration::minutes(10));
        assert!(!limiter.is_allowed("login:x", 5, 15));

        // the first attempts have left the window but the block has not
        clock.advance(Duration::minutes(10));
        assert!(!limiter.is_allowed("login:x", 5, 15));

        clock.advance(Duration::minutes(5) + Duration::seconds(1));
        assert!(limiter.is_allowed("login:x", 5, 15));
    }

    #[test]
    fn old_attempts_slide_out_of_the_window() {
        let (limiter, clock) = limiter();

        assert!(limiter.is_allowed("k", 2, 15));
        clock.advance(Duration::minutes(10));
        assert!(limiter.is_allowed("k", 2, 15));
        clock.advance(Duration::minutes(6));
        // first attempt is now 16 minutes old
        assert!(limiter.is_allowed("k", 2, 15));
        assert!(!limiter.is_allowed("k", 2, 15));
    }

    #[test]
    fn retry_after_rounds_up() {
        let (limiter, clock) = limiter();

        assert!(limiter.retry_after("k").is_none());
        assert!(limiter.is_allowed("k", 1, 1));
        assert!(!limiter.is_allowed("k", 1, 1));
        assert_eq!(limiter.retry_after("k"), Some(60));

        clock.advance(Duration::milliseconds(500));
        assert_eq!(limiter.retry_after("k"), Some(60));

        clock.advance(Duration::seconds(59));
        assert_eq!(limiter.retry_after("k"), Some(1));

        clock.advance(Duration::seconds(1));
        assert!(limiter.retry_after("k").is_none());
    }

    #[test]
    fn reset_clears_history_and_block() {
        let (limiter, _) = limiter();

        assert!(limiter.is_allowed("k", 1, 15));
        assert!(!limiter.is_allowed("k", 1, 15));
        limiter.reset_attempts("k");
        assert!(limiter.retry_after("k").is_none());
        assert!(limiter.is_allowed("k", 1, 15));
    }

    #[test]
    fn clear_all_forgets_everything() {
        let (limiter, _) = limiter();

        limiter.is_allowed("a", 1, 15);
        limiter.is_allowed("b", 1, 15);
        assert_eq!(limiter.len(), 2);
        limiter.clear_all();
        assert!(limiter.is_empty());
    }

    #[test]
    fn purge_idle_keeps_live_entries() {
        let (limiter, clock) = limiter();

        limiter.is_allowed("old", 5, 15);
        limiter.is_allowed("blocked", 1, 60);
        limiter.is_allowed("blocked", 1, 60);
        clock.advance(Duration::minutes(20));
        limiter.is_allowed("fresh", 5, 15);

        assert_eq!(limiter.purge_idle(15), 1);
        assert_eq!(limiter.len(), 2);
        assert!(limiter.entries.contains_key("blocked"));
        assert!(limiter.entries.contains_key("fresh"));
    }

    #[test]
    fn concurrent_callers_never_exceed_budget() {
        let limiter = Arc::new(RateLimiter::new(Arc::new(ManualClock::starting_now())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| limiter.is_allowed("shared", 20, 15))
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 20);
    }
}
