//! Error types for task queue operations.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur during task queue operations.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The queue state could not be read or written.
    #[error("task queue persistence failed: {0}")]
    Store(#[from] StoreError),

    /// The queue was dropped while a scheduler handle still existed.
    #[error("task queue is no longer running")]
    Closed,
}
