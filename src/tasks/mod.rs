//! Background tasks: data model, handlers and the persisted queue.
//!
//! # Architecture
//!
//! - [`TaskQueue`] - Persisted FIFO queue with one runner
//! - [`TaskPayload`] - Closed set of task kinds with typed payloads
//! - [`TaskHandlers`] / [`dispatch`] - Exhaustive routing to typed handlers
//! - [`MetaHandle`] - How handlers publish their display state
//! - [`TaskScheduler`] - How handlers enqueue follow-up work
//! - [`Notifier`] - User-visible notifications

mod handler;
mod meta;
mod notify;
mod queue;
mod scheduler;
mod task;

pub use handler::{
    BackupService, ChapterDownloader, StandardHandlers, TaskContext, TaskHandlers, dispatch,
};
pub use meta::{MetaHandle, MetaPublisher, MetaRecorder, MetaTransform};
pub use notify::{Notifier, RecordingNotifier, TracingNotifier};
pub use queue::{QueueError, QueueRunState, QueueScheduler, TaskQueue};
pub use scheduler::{ScheduledTasks, TaskScheduler};
pub use task::{QueuedTask, Task, TaskKind, TaskMetadata, TaskPayload};
