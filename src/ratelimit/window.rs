//! Sliding window counter implementation.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::trace;

/// A sliding window counter that tracks the timestamps of recent admissions
/// for a single key.
///
/// Timestamps are stored at second precision in a fixed-capacity circular
/// buffer of length `rate_limit`, so the counter never allocates after
/// construction and holds at most `rate_limit` entries. `head` points at the
/// latest stored timestamp and `tail` at the eldest; both are `None` while
/// the buffer is empty. This avoids shifting elements on insert or expiry,
/// keeping each check O(1) amortized.
///
/// A call is admitted when fewer than `rate_limit` timestamps remain inside
/// the trailing `window_size` seconds. The expiry boundary is inclusive: an
/// entry exactly `window_size` seconds old no longer counts.
pub struct SlidingWindow {
    /// Length of the window in seconds.
    window_size: u64,
    /// Maximum admissions within the window; also the buffer capacity.
    rate_limit: usize,
    /// Buffer and cursors, mutated together under one lock per check.
    state: Mutex<WindowState>,
}

struct WindowState {
    /// Stored admission timestamps, unix seconds.
    buffer: Vec<Option<u64>>,
    /// Index of the latest timestamp, `None` when empty.
    head: Option<usize>,
    /// Index of the eldest timestamp, `None` when empty.
    tail: Option<usize>,
}

impl SlidingWindow {
    /// Create a counter allowing `rate_limit` admissions per trailing
    /// `window_size` seconds.
    ///
    /// `RuleSet::register` validates that both values are positive before
    /// any counter is constructed. A directly constructed counter with a
    /// `rate_limit` of zero has no slots and admits nothing.
    pub fn new(window_size: u64, rate_limit: usize) -> Self {
        Self {
            window_size,
            rate_limit,
            state: Mutex::new(WindowState {
                buffer: vec![None; rate_limit],
                head: None,
                tail: None,
            }),
        }
    }

    /// Check whether a call is admitted right now, recording it if so.
    ///
    /// Not idempotent: an admitted call consumes one slot in the window.
    pub fn allow(&self) -> bool {
        self.allow_at(now_unix_seconds())
    }

    /// Check whether a call at `now` (unix seconds) is admitted, recording
    /// it if so.
    ///
    /// This is the primitive `allow` delegates to; callers that maintain
    /// their own clock can drive it directly. `now` must not move backwards
    /// across calls on the same counter.
    pub fn allow_at(&self, now: u64) -> bool {
        // A zero-capacity buffer has nowhere to record an admission.
        if self.rate_limit == 0 {
            return false;
        }

        let mut state = self.state.lock();

        // Entries at or beyond the window boundary no longer count.
        if let Some(expired_at) = now.checked_sub(self.window_size) {
            state.remove_expired(expired_at, self.rate_limit);
        }

        if state.is_full(self.rate_limit) {
            trace!(now = now, "window full, call denied");
            return false;
        }

        state.record(now, self.rate_limit);
        trace!(now = now, "call admitted");
        true
    }

    /// Length of the window in seconds.
    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    /// Maximum admissions within the window.
    pub fn rate_limit(&self) -> usize {
        self.rate_limit
    }

    /// Number of timestamps currently stored.
    ///
    /// Expired entries are only reclaimed by `allow_at`, so this reflects
    /// occupancy as of the last check.
    pub fn occupancy(&self) -> usize {
        let state = self.state.lock();
        state.buffer.iter().filter(|slot| slot.is_some()).count()
    }
}

impl WindowState {
    /// Clear every stored timestamp `t` with `t <= expired_at`, walking
    /// forward circularly from the eldest entry.
    fn remove_expired(&mut self, expired_at: u64, capacity: usize) {
        let Some(tail) = self.tail else {
            return;
        };

        let mut index = tail;
        while matches!(self.buffer[index], Some(t) if t <= expired_at) {
            self.buffer[index] = None;
            index = next_index(index, capacity);
        }

        self.tail = self.buffer[index].map(|_| index);
        if let Some(head) = self.head {
            if self.buffer[head].is_none() {
                self.head = None;
            }
        }
    }

    /// Full exactly when the slot following `head` is the eldest entry.
    fn is_full(&self, capacity: usize) -> bool {
        match (self.head, self.tail) {
            (Some(head), Some(tail)) => next_index(head, capacity) == tail,
            _ => false,
        }
    }

    /// Store `now` in the slot after `head`, claiming slot 0 when empty.
    fn record(&mut self, now: u64, capacity: usize) {
        let head = match self.head {
            Some(head) => next_index(head, capacity),
            None => 0,
        };
        self.buffer[head] = Some(now);
        self.head = Some(head);
        if self.tail.is_none() {
            self.tail = Some(head);
        }
    }
}

fn next_index(current: usize, capacity: usize) -> usize {
    (current + 1) % capacity
}

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Install a test subscriber so `trace!`/`debug!` output is captured
    /// per test when run with RUST_LOG set.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_allows_up_to_rate_limit_within_window() {
        let window = SlidingWindow::new(10, 3);

        assert!(window.allow_at(100));
        assert!(window.allow_at(101));
        assert!(window.allow_at(102));
        assert!(!window.allow_at(103));
        assert_eq!(window.occupancy(), 3);
    }

    #[test]
    fn test_denied_call_does_not_consume_a_slot() {
        let window = SlidingWindow::new(10, 2);

        assert!(window.allow_at(100));
        assert!(window.allow_at(100));
        assert!(!window.allow_at(101));

        // The denial above recorded nothing, so expiry of the two admitted
        // calls frees both slots.
        assert!(window.allow_at(110));
        assert!(window.allow_at(110));
    }

    #[test]
    fn test_slides_rather_than_resetting_in_buckets() {
        let window = SlidingWindow::new(10, 2);

        assert!(window.allow_at(100));
        assert!(window.allow_at(105));
        assert!(!window.allow_at(106));

        // At t=110 only the t=100 entry has aged out: one slot free.
        assert!(window.allow_at(110));
        assert!(!window.allow_at(110));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let window = SlidingWindow::new(10, 1);

        assert!(window.allow_at(100));
        // Exactly window_size seconds later the entry is expired.
        assert!(window.allow_at(110));
        // One second short of the boundary it is not.
        assert!(window.allow_at(125));
        assert!(!window.allow_at(134));
        assert!(window.allow_at(135));
    }

    #[test]
    fn test_wraps_around_the_buffer_across_windows() {
        let window = SlidingWindow::new(5, 3);

        let mut admitted = 0;
        for t in (0..100).step_by(2) {
            if window.allow_at(t) {
                admitted += 1;
            }
        }
        // Every other slot frees up as entries age out; occupancy still
        // never exceeds the configured limit.
        assert!(admitted > 3);
        assert!(window.occupancy() <= 3);
    }

    #[test]
    fn test_single_slot_window() {
        let window = SlidingWindow::new(60, 1);

        assert!(window.allow_at(1000));
        assert!(!window.allow_at(1000));
        assert!(!window.allow_at(1059));
        assert!(window.allow_at(1060));
    }

    #[test]
    fn test_zero_rate_limit_admits_nothing() {
        let window = SlidingWindow::new(10, 0);

        assert!(!window.allow_at(100));
        assert!(!window.allow());
        assert_eq!(window.occupancy(), 0);
    }

    #[test]
    fn test_all_entries_expiring_empties_the_window() {
        let window = SlidingWindow::new(10, 3);

        assert!(window.allow_at(100));
        assert!(window.allow_at(101));
        assert!(window.allow_at(102));

        // Far enough in the future that everything is gone.
        assert!(window.allow_at(500));
        assert_eq!(window.occupancy(), 1);
    }

    #[test]
    fn test_wall_clock_allow_admits_first_call() {
        let window = SlidingWindow::new(60, 2);
        assert!(window.allow());
        assert!(window.allow());
        assert!(!window.allow());
    }

    #[test]
    fn test_concurrent_calls_admit_exactly_rate_limit() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        init_tracing();
        let window = Arc::new(SlidingWindow::new(60, 4));
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let window = Arc::clone(&window);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    if window.allow() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 4);
    }
}
