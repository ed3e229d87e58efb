//! Enqueueing follow-up work from inside a running task.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::TaskPayload;
use super::queue::QueueError;

/// Something that accepts new tasks.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Enqueues `payload` and returns the new task id.
    async fn schedule(&self, payload: TaskPayload) -> Result<String, QueueError>;
}

/// Collects scheduled payloads instead of running them.
#[derive(Debug, Default)]
pub struct ScheduledTasks {
    payloads: Mutex<Vec<TaskPayload>>,
}

impl ScheduledTasks {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn payloads(&self) -> Vec<TaskPayload> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TaskScheduler for ScheduledTasks {
    async fn schedule(&self, payload: TaskPayload) -> Result<String, QueueError> {
        let mut payloads = self.payloads.lock().unwrap_or_else(PoisonError::into_inner);
        payloads.push(payload);
        Ok(format!("scheduled-{}", payloads.len()))
    }
}
