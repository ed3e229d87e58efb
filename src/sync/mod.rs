//! Library synchronization engine.
//!
//! Refreshes every eligible novel from its content source using a bounded
//! pull pool: `W` workers share one cursor over the candidate list, so a
//! slow novel never holds up the rest. Each novel is retried with a fixed
//! delay, deduplicated against recent successes, and failures only ever
//! affect the novel that failed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shelfsync_core::Database;
//! use shelfsync_core::dedup::DedupCache;
//! use shelfsync_core::library::{LibraryScope, SqliteLibrary};
//! use shelfsync_core::source::SourceRegistry;
//! use shelfsync_core::sync::{SyncEngine, SyncOptions};
//! use shelfsync_core::tasks::{MetaHandle, ScheduledTasks, TracingNotifier};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new_in_memory().await?;
//! let engine = SyncEngine::new(
//!     SourceRegistry::new(),
//!     Arc::new(SqliteLibrary::new(db)),
//!     Arc::new(DedupCache::default()),
//!     SyncOptions::default(),
//!     Arc::new(TracingNotifier),
//! )?;
//! let scheduler = ScheduledTasks::new();
//! let stats = engine
//!     .run(LibraryScope::all(), &MetaHandle::detached(), scheduler.as_ref())
//!     .await?;
//! println!("updated {}, skipped {}, failed {}", stats.succeeded(), stats.skipped(), stats.failed());
//! # Ok(())
//! # }
//! ```

mod progress;
mod refresh;
mod release_time;

pub use progress::{DEFAULT_PROGRESS_INTERVAL, DEFAULT_PROGRESS_MIN_DELTA, ProgressThrottle};
pub use release_time::{max_release_time, parse_release_time};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::dedup::DedupCache;
use crate::library::{Datastore, LibraryScope, SyncTarget};
use crate::retry::RetryPolicy;
use crate::source::{DEFAULT_CALL_TIMEOUT, SourceRegistry};
use crate::store::{KeyValueStore, StoreError};
use crate::tasks::{MetaHandle, Notifier, TaskScheduler};
use progress::ProgressReporter;

/// Minimum allowed worker count.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed worker count.
const MAX_CONCURRENCY: usize = 100;

/// Default worker count; one writer keeps the embedded store free of
/// competing write transactions.
pub const DEFAULT_SYNC_CONCURRENCY: usize = 1;

/// Default pause after each processed (not skipped) novel.
pub const DEFAULT_INTER_ITEM_DELAY: Duration = Duration::from_millis(500);

/// Key under which the last run's start time is stored.
pub const LAST_UPDATE_TIME_KEY: &str = "last_update_time";

/// Notification sent when the scope contains nothing to refresh.
pub const NOTHING_TO_UPDATE: &str = "There's no novel to be updated";

/// Error type for sync engine operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The candidate list could not be read.
    #[error("failed to load novels to update: {0}")]
    Datastore(#[from] StoreError),
}

/// Tuning for a [`SyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Number of workers pulling novels.
    pub concurrency: usize,
    /// Attempts per novel and the fixed pause between them.
    pub retry: RetryPolicy,
    /// Fixed pause after each processed novel.
    pub inter_item_delay: Duration,
    /// Overwrite display metadata instead of only the page count.
    pub refresh_novel_metadata: bool,
    /// Schedule a download task for every newly inserted chapter.
    pub download_new_chapters: bool,
    /// Restrict every run to ongoing novels.
    pub only_update_ongoing: bool,
    /// Deadline for each content source call.
    pub call_timeout: Duration,
    /// Publish progress at least this often while novels are processed.
    pub progress_interval: Duration,
    /// Publish early once progress has grown by this fraction.
    pub progress_min_delta: f64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_SYNC_CONCURRENCY,
            retry: RetryPolicy::default(),
            inter_item_delay: DEFAULT_INTER_ITEM_DELAY,
            refresh_novel_metadata: false,
            download_new_chapters: false,
            only_update_ongoing: false,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            progress_min_delta: DEFAULT_PROGRESS_MIN_DELTA,
        }
    }
}

/// Statistics from one sync run.
///
/// Uses atomic counters so concurrent workers can update them.
#[derive(Debug, Default)]
pub struct SyncStats {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    retried: AtomicUsize,
    new_chapters: AtomicUsize,
}

impl SyncStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Novels refreshed successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// Novels whose every attempt failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Novels skipped because they succeeded within the dedup window.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Extra attempts made after a first failure.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Chapters inserted across all novels.
    #[must_use]
    pub fn new_chapters(&self) -> usize {
        self.new_chapters.load(Ordering::SeqCst)
    }

    /// Novels looked at, whatever the outcome.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded() + self.failed() + self.skipped()
    }

    fn increment_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    fn add_new_chapters(&self, count: usize) {
        self.new_chapters.fetch_add(count, Ordering::SeqCst);
    }
}

/// What happened to one novel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Skipped,
    Succeeded,
    Failed,
}

/// Refreshes library novels from their content sources.
pub struct SyncEngine {
    sources: SourceRegistry,
    datastore: Arc<dyn Datastore>,
    dedup: Arc<DedupCache>,
    options: SyncOptions,
    notifier: Arc<dyn Notifier>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("sources", &self.sources)
            .field("options", &self.options)
            .field("dedup_entries", &self.dedup.len())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Creates a new sync engine.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConcurrency`] if `options.concurrency`
    /// is outside 1..=100.
    pub fn new(
        sources: SourceRegistry,
        datastore: Arc<dyn Datastore>,
        dedup: Arc<DedupCache>,
        options: SyncOptions,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, SyncError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.concurrency) {
            return Err(SyncError::InvalidConcurrency {
                value: options.concurrency,
            });
        }

        Ok(Self {
            sources,
            datastore,
            dedup,
            options,
            notifier,
            store: None,
            clock: Arc::new(SystemClock),
        })
    }

    /// Records each run's start time in `store` under [`LAST_UPDATE_TIME_KEY`].
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses `clock` for the recorded update time.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    #[must_use]
    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Refreshes every novel in `scope`.
    ///
    /// Per-novel failures are notified and counted, never returned. The
    /// final `progress = 1, is_running = false` is always published.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Datastore`] if the candidate list cannot be read.
    #[instrument(skip(self, meta, scheduler), fields(category_id = ?scope.category_id))]
    pub async fn run(
        &self,
        scope: LibraryScope,
        meta: &MetaHandle,
        scheduler: &dyn TaskScheduler,
    ) -> Result<SyncStats, SyncError> {
        let scope = LibraryScope {
            only_ongoing: scope.only_ongoing || self.options.only_update_ongoing,
            ..scope
        };
        let stats = SyncStats::new();

        let targets = match self.datastore.sync_targets(&scope).await {
            Ok(targets) => targets,
            Err(error) => {
                ProgressReporter::new(meta, self.throttle(), 0).finish().await;
                return Err(SyncError::Datastore(error));
            }
        };

        let reporter = ProgressReporter::new(meta, self.throttle(), targets.len());
        reporter.start().await;

        if targets.is_empty() {
            info!("no novels to update");
            self.notifier.notify(NOTHING_TO_UPDATE);
            reporter.finish().await;
            return Ok(stats);
        }

        let pruned = self.dedup.prune();
        debug!(pruned, "pruned dedup cache");
        self.record_update_time().await;

        let workers = self.options.concurrency.min(targets.len());
        info!(novels = targets.len(), workers, "starting library update");

        let cursor = AtomicUsize::new(0);
        join_all((0..workers).map(|worker| {
            self.worker(worker, &targets, &cursor, &stats, &reporter, scheduler)
        }))
        .await;

        reporter.finish().await;

        if stats.skipped() > 0 {
            debug!(skipped = stats.skipped(), "skipped recently updated novels");
        }
        info!(
            succeeded = stats.succeeded(),
            failed = stats.failed(),
            skipped = stats.skipped(),
            retried = stats.retried(),
            new_chapters = stats.new_chapters(),
            "library update complete"
        );

        Ok(stats)
    }

    fn throttle(&self) -> ProgressThrottle {
        ProgressThrottle::new(self.options.progress_interval, self.options.progress_min_delta)
    }

    async fn record_update_time(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let stamp = self.clock.now().format("%Y-%m-%d %H:%M:%S").to_string();
        if let Err(error) = store.set(LAST_UPDATE_TIME_KEY, &stamp).await {
            warn!(error = %error, "failed to record last update time");
        }
    }

    /// Pulls novels off the shared cursor until none are left.
    async fn worker(
        &self,
        worker: usize,
        targets: &[SyncTarget],
        cursor: &AtomicUsize,
        stats: &SyncStats,
        reporter: &ProgressReporter<'_>,
        scheduler: &dyn TaskScheduler,
    ) {
        loop {
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(target) = targets.get(index) else {
                break;
            };

            reporter.item_started(&target.name).await;
            let outcome = self.sync_one(target, stats, scheduler).await;
            reporter.item_finished().await;
            debug!(worker, novel_id = target.novel_id, ?outcome, "novel processed");

            if outcome != ItemOutcome::Skipped && !self.options.inter_item_delay.is_zero() {
                tokio::time::sleep(self.options.inter_item_delay).await;
            }
        }
    }

    #[instrument(skip(self, target, stats, scheduler), fields(novel_id = target.novel_id, plugin_id = %target.plugin_id))]
    async fn sync_one(
        &self,
        target: &SyncTarget,
        stats: &SyncStats,
        scheduler: &dyn TaskScheduler,
    ) -> ItemOutcome {
        if self.dedup.is_fresh(target.novel_id) {
            stats.increment_skipped();
            return ItemOutcome::Skipped;
        }

        let result = self
            .options
            .retry
            .run(move |attempt| {
                if attempt > 1 {
                    stats.increment_retried();
                }
                self.refresh_novel(target, scheduler)
            })
            .await;

        match result {
            Ok(inserted) => {
                self.dedup.record_success(target.novel_id);
                stats.increment_succeeded();
                stats.add_new_chapters(inserted);
                ItemOutcome::Succeeded
            }
            Err(exhausted) => {
                stats.increment_failed();
                warn!(
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "novel update failed"
                );
                self.notifier
                    .notify(&format!("{}: {}", target.name, exhausted.error));
                ItemOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tasks::RecordingNotifier;

    #[test]
    fn test_sync_options_defaults() {
        let options = SyncOptions::default();
        assert_eq!(options.concurrency, 1);
        assert_eq!(options.retry.max_retries(), 2);
        assert_eq!(options.retry.delay(), Duration::from_secs(2));
        assert_eq!(options.inter_item_delay, Duration::from_millis(500));
        assert_eq!(options.call_timeout, Duration::from_secs(30));
        assert!(!options.refresh_novel_metadata);
        assert!(!options.download_new_chapters);
    }

    #[test]
    fn test_sync_stats_counters() {
        let stats = SyncStats::new();
        stats.increment_succeeded();
        stats.increment_failed();
        stats.increment_skipped();
        stats.increment_skipped();
        stats.increment_retried();
        stats.add_new_chapters(4);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.retried(), 1);
        assert_eq!(stats.new_chapters(), 4);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_concurrency() {
        let db = crate::Database::new_in_memory().await.unwrap();
        for value in [0, 101] {
            let result = SyncEngine::new(
                SourceRegistry::new(),
                Arc::new(crate::library::SqliteLibrary::new(db.clone())),
                Arc::new(DedupCache::default()),
                SyncOptions {
                    concurrency: value,
                    ..SyncOptions::default()
                },
                RecordingNotifier::new(),
            );
            assert!(matches!(
                result,
                Err(SyncError::InvalidConcurrency { value: v }) if v == value
            ));
        }
    }
}
