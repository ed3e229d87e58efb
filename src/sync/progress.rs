//! Throttled progress reporting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::tasks::{MetaHandle, TaskMetadata};

/// Default minimum time between two progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Default progress advance that forces a report regardless of time.
pub const DEFAULT_PROGRESS_MIN_DELTA: f64 = 0.01;

/// Decides whether a progress value is worth publishing.
///
/// A value is emitted when the interval has elapsed since the last emission
/// or when it advanced by at least the minimum delta. Values below the last
/// emitted one are never emitted.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    min_delta: f64,
    last_emit: Option<Instant>,
    last_value: f64,
}

impl ProgressThrottle {
    #[must_use]
    pub fn new(interval: Duration, min_delta: f64) -> Self {
        Self {
            interval,
            min_delta,
            last_emit: None,
            last_value: 0.0,
        }
    }

    /// Returns true (and records the emission) if `progress` should be published.
    pub fn should_emit(&mut self, progress: f64) -> bool {
        if progress < self.last_value {
            return false;
        }

        let now = Instant::now();
        let due = match self.last_emit {
            None => true,
            Some(at) => {
                now.duration_since(at) >= self.interval
                    || progress - self.last_value >= self.min_delta
            }
        };

        if due {
            self.last_emit = Some(now);
            self.last_value = progress;
        }
        due
    }

    #[must_use]
    pub fn last_value(&self) -> f64 {
        self.last_value
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL, DEFAULT_PROGRESS_MIN_DELTA)
    }
}

/// Publishes `completed / total` through a [`MetaHandle`].
///
/// The completed count is read while the throttle lock is held, so values
/// reach the handle in non-decreasing order even with several workers.
pub(crate) struct ProgressReporter<'a> {
    meta: &'a MetaHandle,
    throttle: Mutex<ProgressThrottle>,
    completed: AtomicUsize,
    total: usize,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(meta: &'a MetaHandle, throttle: ProgressThrottle, total: usize) -> Self {
        Self {
            meta,
            throttle: Mutex::new(throttle),
            completed: AtomicUsize::new(0),
            total,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed.load(Ordering::SeqCst) as f64 / self.total as f64).min(1.0)
    }

    /// Marks the run as started at progress 0.
    pub(crate) async fn start(&self) {
        let mut throttle = self.throttle.lock().await;
        throttle.should_emit(0.0);
        self.meta
            .set(|meta| TaskMetadata {
                is_running: true,
                progress: Some(0.0),
                ..meta
            })
            .await;
    }

    /// Reports that work on `name` began.
    pub(crate) async fn item_started(&self, name: &str) {
        let mut throttle = self.throttle.lock().await;
        let progress = self.fraction();
        if throttle.should_emit(progress) {
            let name = name.to_string();
            self.meta
                .set(move |meta| TaskMetadata {
                    progress: Some(progress),
                    progress_text: Some(name),
                    ..meta
                })
                .await;
        }
    }

    /// Counts one finished item and reports the new fraction if due.
    pub(crate) async fn item_finished(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        let mut throttle = self.throttle.lock().await;
        let progress = self.fraction();
        if throttle.should_emit(progress) {
            self.meta
                .set(move |meta| TaskMetadata {
                    progress: Some(progress),
                    ..meta
                })
                .await;
        }
    }

    /// Always publishes the final `progress = 1, is_running = false`.
    pub(crate) async fn finish(&self) {
        let mut throttle = self.throttle.lock().await;
        throttle.should_emit(1.0);
        self.meta
            .set(|meta| TaskMetadata {
                progress: Some(1.0),
                is_running: false,
                ..meta
            })
            .await;
    }
}
