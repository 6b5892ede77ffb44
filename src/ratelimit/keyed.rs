//! Per-key counter store for a single rule.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::window::SlidingWindow;

/// Maps each criteria key to its own [`SlidingWindow`], sharing one rule's
/// `(window_size, rate_limit)` across all keys.
///
/// Counters are created lazily on first reference to a key and live for the
/// lifetime of the store; nothing evicts them. Keys derived from unbounded
/// sources (client IPs on a long-running server) therefore grow the map
/// without bound — callers needing eviction should bound the key space
/// before it reaches the limiter.
pub struct KeyedLimiter {
    /// Window length in seconds, shared by every counter.
    window_size: u64,
    /// Admissions allowed per window, shared by every counter.
    rate_limit: usize,
    /// Counters indexed by criteria key.
    counters: DashMap<String, Arc<SlidingWindow>>,
}

impl KeyedLimiter {
    /// Create a store whose counters allow `rate_limit` admissions per
    /// trailing `window_size` seconds.
    pub fn new(window_size: u64, rate_limit: usize) -> Self {
        Self {
            window_size,
            rate_limit,
            counters: DashMap::new(),
        }
    }

    /// Check whether a call for `key` is admitted right now.
    ///
    /// Distinct keys are fully isolated: exhausting one key's window has no
    /// effect on any other key.
    pub fn allow(&self, key: &str) -> bool {
        self.counter_for(key).allow()
    }

    /// Check whether a call for `key` at `now` (unix seconds) is admitted.
    pub fn allow_at(&self, key: &str, now: u64) -> bool {
        self.counter_for(key).allow_at(now)
    }

    /// Look up the counter for `key`, creating it on first reference.
    ///
    /// The fast path is a shard read lock; only a brand-new key takes the
    /// insert path, where the map's entry lock guarantees exactly one
    /// counter is constructed per key even under racing first access.
    fn counter_for(&self, key: &str) -> Arc<SlidingWindow> {
        if let Some(counter) = self.counters.get(key) {
            return Arc::clone(&counter);
        }

        let counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(
                    key = %key,
                    window_size = self.window_size,
                    rate_limit = self.rate_limit,
                    "Creating new sliding window counter"
                );
                Arc::new(SlidingWindow::new(self.window_size, self.rate_limit))
            });
        Arc::clone(&counter)
    }

    /// Window length in seconds.
    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// Admissions allowed per window.
    pub fn rate_limit(&self) -> usize {
        self.rate_limit
    }

    /// Number of keys with an active counter.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }
}
