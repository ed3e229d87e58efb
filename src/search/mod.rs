//! Fan-out search across every installed source.
//!
//! Each query opens a session identified by a monotonically increasing
//! token. Workers pull sources off a shared cursor and write results into
//! the session's slots only while their token is still current, so a newer
//! query (or [`SearchEngine::cancel`]) silently discards late answers from
//! older ones. Remote calls are never aborted.
//!
//! Workers also wait on a focus gate before each call: while the host view
//! is unfocused no new call starts, but the cursor keeps its position.

mod session;

pub use session::{SearchSlot, SearchSnapshot};

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, instrument};

use crate::error::AppError;
use crate::source::{ContentSource, DEFAULT_CALL_TIMEOUT, NovelItem, call_with_timeout};
use session::{compare_names, sort_slots};

/// Default number of sources queried at once.
pub const DEFAULT_SEARCH_CONCURRENCY: usize = 1;

/// Default quiet period before a submitted query runs.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Result page requested from each source.
const FIRST_PAGE: u32 = 1;

/// Tuning for a [`SearchEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Sources queried at once; values below 1 act as 1.
    pub concurrency: usize,
    pub debounce: Duration,
    /// Display filter applied by [`SearchEngine::results`].
    pub hide_empty_results: bool,
    /// Deadline for each source call.
    pub call_timeout: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_SEARCH_CONCURRENCY,
            debounce: DEFAULT_SEARCH_DEBOUNCE,
            hide_empty_results: false,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// How a call to [`SearchEngine::search`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchRun {
    /// The query equals the active one; nothing was started.
    Duplicate,
    /// Every source answered while the session was current.
    Completed { token: u64 },
    /// A newer query or a cancellation took over before the end.
    Superseded { token: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gate {
    focused: bool,
    token: u64,
}

struct Pending {
    id: u64,
    abort: AbortHandle,
}

struct Inner {
    options: Mutex<SearchOptions>,
    sources: Mutex<Vec<Arc<dyn ContentSource>>>,
    session: Mutex<SearchSnapshot>,
    snapshots: watch::Sender<SearchSnapshot>,
    gate: watch::Sender<Gate>,
    pending: Mutex<Option<Pending>>,
    submissions: AtomicU64,
}

/// Global search over a set of content sources.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct SearchEngine {
    inner: Arc<Inner>,
}

impl fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("SearchEngine")
            .field("token", &snapshot.token)
            .field("query", &snapshot.query)
            .field("progress", &snapshot.progress)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SearchEngine {
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn ContentSource>>, options: SearchOptions) -> Self {
        let (snapshots, _) = watch::channel(SearchSnapshot::default());
        let (gate, _) = watch::channel(Gate {
            focused: true,
            token: 0,
        });

        Self {
            inner: Arc::new(Inner {
                options: Mutex::new(options),
                sources: Mutex::new(sources),
                session: Mutex::new(SearchSnapshot::default()),
                snapshots,
                gate,
                pending: Mutex::new(None),
                submissions: AtomicU64::new(0),
            }),
        }
    }

    /// Replaces the sources used by later searches.
    pub fn set_sources(&self, sources: Vec<Arc<dyn ContentSource>>) {
        *lock(&self.inner.sources) = sources;
    }

    /// Toggles the display filter used by [`Self::results`].
    pub fn set_hide_empty_results(&self, hide: bool) {
        lock(&self.inner.options).hide_empty_results = hide;
    }

    /// Pauses (false) or resumes (true) the start of new source calls.
    pub fn set_focused(&self, focused: bool) {
        debug!(focused, "search focus changed");
        self.inner.gate.send_modify(|gate| gate.focused = focused);
    }

    /// Invalidates the active session and any pending submission.
    pub fn cancel(&self) {
        self.abort_pending();
        let token = {
            let mut session = lock(&self.inner.session);
            session.token += 1;
            session.query = None;
            self.inner.snapshots.send_replace(session.clone());
            session.token
        };
        self.inner.gate.send_modify(|gate| gate.token = token);
        debug!(token, "search cancelled");
    }

    /// Runs `query` after the debounce period unless another submission
    /// arrives first.
    ///
    /// The returned handle resolves to the run outcome, or to a cancelled
    /// [`tokio::task::JoinError`] when a later submission replaced this one.
    pub fn submit(&self, query: impl Into<String>) -> JoinHandle<SearchRun> {
        let query = query.into();
        let debounce = lock(&self.inner.options).debounce;
        let id = self.inner.submissions.fetch_add(1, Ordering::SeqCst);
        let engine = self.clone();

        let mut pending = lock(&self.inner.pending);
        if let Some(previous) = pending.take() {
            previous.abort.abort();
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            {
                let mut pending = lock(&engine.inner.pending);
                if pending.as_ref().is_some_and(|p| p.id == id) {
                    *pending = None;
                }
            }
            engine.search(&query).await
        });

        *pending = Some(Pending {
            id,
            abort: handle.abort_handle(),
        });
        handle
    }

    fn abort_pending(&self) {
        if let Some(previous) = lock(&self.inner.pending).take() {
            previous.abort.abort();
        }
    }

    /// Searches every source for `query` and waits for the session to end.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> SearchRun {
        let (token, ordered, options) = {
            let mut session = lock(&self.inner.session);
            if session.query.as_deref() == Some(query) {
                debug!("query already active");
                return SearchRun::Duplicate;
            }

            let mut ordered = lock(&self.inner.sources).clone();
            ordered.sort_by(|a, b| compare_names(&a.plugin_item(), &b.plugin_item()));

            let mut slots: Vec<SearchSlot> = ordered
                .iter()
                .enumerate()
                .map(|(index, source)| SearchSlot::loading(index, source.plugin_item()))
                .collect();
            sort_slots(&mut slots);

            session.token += 1;
            session.query = Some(query.to_string());
            session.total = ordered.len();
            session.completed = 0;
            session.progress = if ordered.is_empty() { 1.0 } else { 0.0 };
            session.slots = slots;
            self.inner.snapshots.send_replace(session.clone());

            (session.token, ordered, lock(&self.inner.options).clone())
        };
        self.inner.gate.send_modify(|gate| gate.token = token);

        let workers = options.concurrency.max(1).min(ordered.len());
        info!(token, sources = ordered.len(), workers, "starting global search");

        let cursor = AtomicUsize::new(0);
        join_all((0..workers).map(|_| self.worker(token, query, &ordered, &cursor, &options)))
            .await;

        if self.is_current(token) {
            debug!(token, "search completed");
            SearchRun::Completed { token }
        } else {
            debug!(token, "search superseded");
            SearchRun::Superseded { token }
        }
    }

    async fn worker(
        &self,
        token: u64,
        query: &str,
        ordered: &[Arc<dyn ContentSource>],
        cursor: &AtomicUsize,
        options: &SearchOptions,
    ) {
        loop {
            if !self.wait_until_focused(token).await {
                return;
            }

            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(source) = ordered.get(index) else {
                return;
            };

            let result = call_with_timeout(
                source.id(),
                options.call_timeout,
                source.search_novels(query, FIRST_PAGE),
            )
            .await;
            self.complete(token, index, source.id(), result);
        }
    }

    /// Waits for focus; returns false once the session is no longer current.
    async fn wait_until_focused(&self, token: u64) -> bool {
        let mut gate = self.inner.gate.subscribe();
        let open = gate
            .wait_for(|gate| gate.focused || gate.token != token)
            .await
            .is_ok();
        open && self.is_current(token)
    }

    fn is_current(&self, token: u64) -> bool {
        lock(&self.inner.session).token == token
    }

    fn complete(
        &self,
        token: u64,
        source_index: usize,
        plugin_id: &str,
        result: Result<Vec<NovelItem>, AppError>,
    ) {
        let mut session = lock(&self.inner.session);
        if session.token != token {
            debug!(token, plugin_id, "discarding stale search result");
            return;
        }

        if let Some(slot) = session
            .slots
            .iter_mut()
            .find(|slot| slot.source_index == source_index)
        {
            slot.is_loading = false;
            match result {
                Ok(novels) => {
                    slot.novels = novels;
                    slot.error = None;
                }
                Err(error) => {
                    debug!(plugin_id, error = %error, "source search failed");
                    slot.novels = Vec::new();
                    slot.error = Some(error.to_string());
                }
            }
        }
        sort_slots(&mut session.slots);

        session.completed += 1;
        #[allow(clippy::cast_precision_loss)]
        let progress = (session.completed as f64 / session.total.max(1) as f64).min(1.0);
        session.progress = progress;
        self.inner.snapshots.send_replace(session.clone());
    }

    #[must_use]
    pub fn snapshot(&self) -> SearchSnapshot {
        lock(&self.inner.session).clone()
    }

    /// Current slots after the "hide empty results" filter.
    #[must_use]
    pub fn results(&self) -> Vec<SearchSlot> {
        let hide_empty = lock(&self.inner.options).hide_empty_results;
        self.snapshot().visible_slots(hide_empty)
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        lock(&self.inner.session).progress
    }

    /// Receives a snapshot after every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.inner.snapshots.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::source::PopularOptions;
    use crate::source::SourceNovel;

    struct Fixed {
        id: &'static str,
        hits: usize,
        fail: bool,
    }

    #[async_trait]
    impl ContentSource for Fixed {
        fn id(&self) -> &str {
            self.id
        }

        fn name(&self) -> &str {
            self.id
        }

        async fn fetch_novel(&self, _path: &str) -> Result<SourceNovel, AppError> {
            Ok(SourceNovel::default())
        }

        async fn search_novels(&self, query: &str, _page: u32) -> Result<Vec<NovelItem>, AppError> {
            if self.fail {
                return Err(AppError::network("fetch failed"));
            }
            Ok((0..self.hits)
                .map(|i| NovelItem::new(format!("{query} {i}"), format!("/{i}")))
                .collect())
        }

        async fn popular_novels(
            &self,
            _page: u32,
            _options: &PopularOptions,
        ) -> Result<Vec<NovelItem>, AppError> {
            Ok(Vec::new())
        }
    }

    fn source(id: &'static str, hits: usize) -> Arc<dyn ContentSource> {
        Arc::new(Fixed {
            id,
            hits,
            fail: false,
        })
    }

    #[tokio::test]
    async fn test_search_without_sources_reports_full_progress() {
        let engine = SearchEngine::new(Vec::new(), SearchOptions::default());
        let run = engine.search("anything").await;
        assert_eq!(run, SearchRun::Completed { token: 1 });
        assert_eq!(engine.progress(), 1.0);
        assert!(engine.results().is_empty());
    }

    #[tokio::test]
    async fn test_same_query_is_duplicate() {
        let engine = SearchEngine::new(vec![source("alpha", 1)], SearchOptions::default());
        assert!(matches!(engine.search("q").await, SearchRun::Completed { .. }));
        assert_eq!(engine.search("q").await, SearchRun::Duplicate);
    }

    #[tokio::test]
    async fn test_errors_stay_in_their_slot() {
        let failing: Arc<dyn ContentSource> = Arc::new(Fixed {
            id: "bravo",
            hits: 0,
            fail: true,
        });
        let engine = SearchEngine::new(
            vec![failing, source("alpha", 2)],
            SearchOptions {
                concurrency: 2,
                ..SearchOptions::default()
            },
        );

        engine.search("q").await;

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.slots[0].plugin.id, "alpha");
        assert_eq!(snapshot.slots[0].novels.len(), 2);
        assert_eq!(snapshot.slots[1].error.as_deref(), Some("fetch failed"));
        assert!(!snapshot.slots[1].is_loading);
        assert_eq!(snapshot.progress, 1.0);
    }

    #[tokio::test]
    async fn test_sources_sharing_an_id_each_fill_their_own_slot() {
        let engine = SearchEngine::new(
            vec![source("mirror", 2), source("mirror", 0)],
            SearchOptions {
                concurrency: 2,
                ..SearchOptions::default()
            },
        );

        engine.search("q").await;

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.completed, 2);
        assert!(snapshot.slots.iter().all(|slot| !slot.is_loading));
        let mut hits: Vec<usize> = snapshot.slots.iter().map(|slot| slot.novels.len()).collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_hide_empty_results_is_display_only() {
        let engine = SearchEngine::new(
            vec![source("alpha", 1), source("bravo", 0)],
            SearchOptions::default(),
        );
        engine.search("q").await;

        engine.set_hide_empty_results(true);
        assert_eq!(engine.results().len(), 1);
        assert_eq!(engine.snapshot().slots.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_clears_active_query() {
        let engine = SearchEngine::new(vec![source("alpha", 1)], SearchOptions::default());
        engine.search("q").await;
        engine.cancel();
        assert_eq!(engine.snapshot().query, None);
        assert!(matches!(engine.search("q").await, SearchRun::Completed { token: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_debounces_to_last_query() {
        let engine = SearchEngine::new(vec![source("alpha", 1)], SearchOptions::default());

        let first = engine.submit("fir");
        let second = engine.submit("first");

        assert!(first.await.unwrap_err().is_cancelled());
        assert!(matches!(second.await.unwrap(), SearchRun::Completed { .. }));
        assert_eq!(engine.snapshot().query.as_deref(), Some("first"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfocused_engine_waits_before_calling() {
        let engine = SearchEngine::new(vec![source("alpha", 1)], SearchOptions::default());
        engine.set_focused(false);

        let handle = tokio::spawn({
            let engine = engine.clone();
            async move { engine.search("q").await }
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(engine.snapshot().completed, 0);
        assert!(engine.snapshot().slots[0].is_loading);

        engine.set_focused(true);
        assert!(matches!(handle.await.unwrap(), SearchRun::Completed { .. }));
        assert_eq!(engine.snapshot().completed, 1);
    }
}
