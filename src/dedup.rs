//! Recent-success cache that suppresses redundant re-syncs.
//!
//! A novel can be reached by several sync runs in quick succession (for
//! example when it belongs to more than one category and each category is
//! refreshed). [`DedupCache`] remembers when each novel last refreshed
//! successfully and reports it as fresh for the length of the window.
//!
//! The cache is owned by the engine that constructs it and shared via `Arc`;
//! it is never persisted.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

/// Default dedup window (5 minutes).
pub const DEFAULT_DEDUP_WINDOW: TimeDelta = TimeDelta::minutes(5);

/// Novel id → time of the last successful refresh.
#[derive(Debug)]
pub struct DedupCache {
    window: TimeDelta,
    clock: Arc<dyn Clock>,
    entries: DashMap<i64, DateTime<Utc>>,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW, Arc::new(SystemClock))
    }
}

impl DedupCache {
    #[must_use]
    pub fn new(window: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Drops entries older than the window and returns how many were removed.
    ///
    /// A window reaching back past the earliest representable time keeps
    /// every entry.
    pub fn prune(&self) -> usize {
        let Some(cutoff) = self.clock.now().checked_sub_signed(self.window) else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|_, succeeded_at| *succeeded_at >= cutoff);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "pruned stale dedup entries");
        }
        removed
    }

    /// Returns true when `novel_id` succeeded less than one window ago.
    #[must_use]
    pub fn is_fresh(&self, novel_id: i64) -> bool {
        let now = self.clock.now();
        self.entries
            .get(&novel_id)
            .is_some_and(|succeeded_at| now - *succeeded_at < self.window)
    }

    /// Records a successful refresh at the current time.
    pub fn record_success(&self, novel_id: i64) {
        self.entries.insert(novel_id, self.clock.now());
    }

    #[must_use]
    pub fn last_success(&self, novel_id: i64) -> Option<DateTime<Utc>> {
        self.entries.get(&novel_id).map(|entry| *entry)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache_with_clock() -> (DedupCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
        let cache = DedupCache::new(DEFAULT_DEDUP_WINDOW, clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_unknown_novel_is_not_fresh() {
        let (cache, _clock) = cache_with_clock();
        assert!(!cache.is_fresh(1));
    }

    #[test]
    fn test_fresh_within_window() {
        let (cache, clock) = cache_with_clock();
        cache.record_success(1);
        clock.advance(TimeDelta::minutes(2));
        assert!(cache.is_fresh(1));
    }

    #[test]
    fn test_not_fresh_after_window() {
        let (cache, clock) = cache_with_clock();
        cache.record_success(1);
        clock.advance(TimeDelta::minutes(6));
        assert!(!cache.is_fresh(1));
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let (cache, clock) = cache_with_clock();
        cache.record_success(1);
        clock.advance(DEFAULT_DEDUP_WINDOW);
        assert!(!cache.is_fresh(1));
    }

    #[test]
    fn test_prune_removes_only_stale_entries() {
        let (cache, clock) = cache_with_clock();
        cache.record_success(1);
        clock.advance(TimeDelta::minutes(4));
        cache.record_success(2);
        clock.advance(TimeDelta::minutes(2));

        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.last_success(1).is_none());
        assert!(cache.last_success(2).is_some());
    }

    #[test]
    fn test_prune_with_unbounded_window_keeps_everything() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = DedupCache::new(TimeDelta::MAX, clock.clone());
        cache.record_success(1);
        clock.advance(TimeDelta::days(365));

        assert_eq!(cache.prune(), 0);
        assert_eq!(cache.len(), 1);
        assert!(cache.is_fresh(1));
    }

    #[test]
    fn test_record_success_refreshes_timestamp() {
        let (cache, clock) = cache_with_clock();
        cache.record_success(1);
        clock.advance(TimeDelta::minutes(4));
        cache.record_success(1);
        clock.advance(TimeDelta::minutes(4));
        assert!(cache.is_fresh(1));
    }
}
