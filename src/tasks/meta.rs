//! Publishing task display state.
//!
//! Long-running operations never own their display state; they send
//! transforms through a [`MetaHandle`] and whoever holds the state (the task
//! queue, or a [`MetaRecorder`] outside the queue) applies them.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::TaskMetadata;

/// A pure update applied to the current metadata.
pub type MetaTransform = Box<dyn FnOnce(TaskMetadata) -> TaskMetadata + Send>;

/// Owner of some task's metadata.
#[async_trait]
pub trait MetaPublisher: Send + Sync {
    /// Applies `transform` to the current metadata and publishes the result.
    ///
    /// Publishing for a task that no longer exists is a no-op.
    async fn publish(&self, transform: MetaTransform);
}

/// Cloneable handle passed to handlers and engines.
#[derive(Clone)]
pub struct MetaHandle {
    publisher: Arc<dyn MetaPublisher>,
}

impl fmt::Debug for MetaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaHandle").finish_non_exhaustive()
    }
}

impl MetaHandle {
    #[must_use]
    pub fn new(publisher: Arc<dyn MetaPublisher>) -> Self {
        Self { publisher }
    }

    /// A handle whose updates go nowhere.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(Arc::new(Detached))
    }

    /// Updates the metadata with `transform`.
    pub async fn set<F>(&self, transform: F)
    where
        F: FnOnce(TaskMetadata) -> TaskMetadata + Send + 'static,
    {
        self.publisher.publish(Box::new(transform)).await;
    }
}

struct Detached;

#[async_trait]
impl MetaPublisher for Detached {
    async fn publish(&self, _transform: MetaTransform) {}
}

/// Keeps every published metadata value, for engines run outside the queue.
#[derive(Debug, Default)]
pub struct MetaRecorder {
    history: Mutex<Vec<TaskMetadata>>,
}

impl MetaRecorder {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Builds a handle publishing into `recorder`.
    #[must_use]
    pub fn handle(recorder: &Arc<Self>) -> MetaHandle {
        MetaHandle::new(Arc::clone(recorder) as Arc<dyn MetaPublisher>)
    }

    /// Every published value, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<TaskMetadata> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn latest(&self) -> Option<TaskMetadata> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// The reported progress values, in publish order.
    #[must_use]
    pub fn progress_values(&self) -> Vec<f64> {
        self.history()
            .iter()
            .filter_map(|meta| meta.progress)
            .collect()
    }
}

#[async_trait]
impl MetaPublisher for MetaRecorder {
    async fn publish(&self, transform: MetaTransform) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let current = history.last().cloned().unwrap_or_default();
        history.push(transform(current));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recorder_applies_transforms_in_order() {
        let recorder = MetaRecorder::new();
        let handle = MetaRecorder::handle(&recorder);

        handle
            .set(|meta| TaskMetadata {
                is_running: true,
                progress: Some(0.0),
                ..meta
            })
            .await;
        handle
            .set(|meta| TaskMetadata {
                progress: Some(0.5),
                progress_text: Some("Alpha".to_string()),
                ..meta
            })
            .await;

        let latest = recorder.latest().unwrap();
        assert!(latest.is_running);
        assert_eq!(latest.progress_text.as_deref(), Some("Alpha"));
        assert_eq!(recorder.progress_values(), vec![0.0, 0.5]);
    }

    #[tokio::test]
    async fn test_detached_handle_is_noop() {
        let handle = MetaHandle::detached();
        handle.set(|meta| meta).await;
    }
}
