//! Persisted FIFO task queue with a single runner.
//!
//! The queue state is a list of [`QueuedTask`]s written as one JSON value
//! under [`TaskQueue::STORE_KEY`] after every mutation. Writes happen while
//! the state lock is held, so stored snapshots are never reordered.
//!
//! One runner drains the queue head first, one handler at a time. Pausing
//! lets the in-flight handler finish and makes the runner exit;
//! [`TaskQueue::resume`] starts a new one.

mod error;

pub use error::QueueError;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{debug, info, instrument, warn};

use super::handler::{TaskContext, TaskHandlers, dispatch};
use super::meta::{MetaHandle, MetaPublisher, MetaTransform};
use super::{Notifier, QueuedTask, Task, TaskPayload, TaskScheduler};
use crate::store::{KeyValueStore, get_json, set_json};

/// Coarse state of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRunState {
    /// No runner; nothing to do or nothing started yet.
    Idle,
    /// A runner is active (possibly finishing its last handler after a pause).
    Running,
    /// Paused with no runner active.
    Paused,
}

#[derive(Debug, Default)]
struct Control {
    paused: bool,
    runner_active: bool,
    handler_active: bool,
}

impl Control {
    fn run_state(&self) -> QueueRunState {
        if self.runner_active {
            QueueRunState::Running
        } else if self.paused {
            QueueRunState::Paused
        } else {
            QueueRunState::Idle
        }
    }
}

struct QueueInner {
    store: Arc<dyn KeyValueStore>,
    handlers: Arc<dyn TaskHandlers>,
    notifier: Arc<dyn Notifier>,
    state: AsyncMutex<Vec<QueuedTask>>,
    snapshots: watch::Sender<Vec<QueuedTask>>,
    control: Mutex<Control>,
    run_states: watch::Sender<QueueRunState>,
}

impl QueueInner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_control(&self, update: impl FnOnce(&mut Control)) {
        let mut control = self.control();
        update(&mut control);
        self.run_states.send_replace(control.run_state());
    }

    /// Writes `tasks` and publishes it to observers.
    async fn persist(&self, tasks: &[QueuedTask]) -> Result<(), QueueError> {
        set_json(self.store.as_ref(), TaskQueue::STORE_KEY, tasks).await?;
        self.snapshots.send_replace(tasks.to_vec());
        Ok(())
    }

    /// Like [`Self::persist`], but a failed write is logged and the
    /// snapshot is still published.
    async fn persist_lossy(&self, tasks: &[QueuedTask]) {
        if let Err(error) = set_json(self.store.as_ref(), TaskQueue::STORE_KEY, tasks).await {
            warn!(error = %error, "failed to persist task queue");
        }
        self.snapshots.send_replace(tasks.to_vec());
    }
}

/// Background task queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("tasks", &self.inner.snapshots.borrow().len())
            .field("state", &self.run_state())
            .finish_non_exhaustive()
    }
}

impl TaskQueue {
    /// Key holding the persisted queue state.
    pub const STORE_KEY: &'static str = "background_task_queue";

    /// Restores the persisted queue.
    ///
    /// Entries saved as running belonged to a process that died mid-task;
    /// they are reset to not running. The runner is not started: call
    /// [`Self::resume`] or add a task.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Store`] if the stored state cannot be read,
    /// decoded or rewritten.
    #[instrument(skip_all)]
    pub async fn open(
        store: Arc<dyn KeyValueStore>,
        handlers: Arc<dyn TaskHandlers>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, QueueError> {
        let mut tasks: Vec<QueuedTask> = get_json(store.as_ref(), Self::STORE_KEY)
            .await?
            .unwrap_or_default();

        let mut recovered = 0usize;
        for queued in &mut tasks {
            if queued.meta.is_running {
                queued.meta.is_running = false;
                recovered += 1;
            }
        }

        let (snapshots, _) = watch::channel(tasks.clone());
        let (run_states, _) = watch::channel(QueueRunState::Idle);
        let inner = Arc::new(QueueInner {
            store,
            handlers,
            notifier,
            state: AsyncMutex::new(Vec::new()),
            snapshots,
            control: Mutex::new(Control::default()),
            run_states,
        });

        {
            let mut state = inner.state.lock().await;
            if recovered > 0 {
                warn!(recovered, "reset tasks left running by a previous process");
                inner.persist(&tasks).await?;
            }
            *state = tasks;
            info!(tasks = state.len(), "task queue restored");
        }

        Ok(Self { inner })
    }

    /// Appends a task and starts the runner if it is idle and not paused.
    ///
    /// Returns as soon as the task is persisted; it never waits for execution.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Store`] if the new state cannot be persisted;
    /// the task is not added in that case.
    #[instrument(skip(self), fields(kind = %payload.kind()))]
    pub async fn add_task(&self, payload: TaskPayload) -> Result<String, QueueError> {
        let queued = QueuedTask::new(Task::new(payload));
        let id = queued.task.id.clone();

        {
            let mut state = self.inner.state.lock().await;
            let mut next = state.clone();
            next.push(queued);
            self.inner.persist(&next).await?;
            *state = next;
        }

        debug!(task_id = %id, "task added");
        self.ensure_runner();
        Ok(id)
    }

    /// Removes a task if present; removing an unknown id does nothing.
    ///
    /// A running task's handler is not interrupted: only its entry goes
    /// away, and its later metadata updates are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Store`] if the new state cannot be persisted.
    #[instrument(skip(self))]
    pub async fn remove_task(&self, task_id: &str) -> Result<bool, QueueError> {
        let mut state = self.inner.state.lock().await;
        let Some(index) = state.iter().position(|queued| queued.id() == task_id) else {
            return Ok(false);
        };

        let mut next = state.clone();
        let removed = next.remove(index);
        self.inner.persist(&next).await?;
        *state = next;

        if removed.meta.is_running {
            info!("detached running task; its handler continues");
        }
        Ok(true)
    }

    /// Stops dequeuing after the in-flight handler finishes.
    pub fn pause(&self) {
        info!("pausing task queue");
        self.inner.set_control(|control| control.paused = true);
    }

    /// Same as [`Self::pause`]; queued tasks are kept.
    pub fn stop(&self) {
        self.pause();
    }

    /// Clears a pause and starts the runner if there is work.
    pub fn resume(&self) {
        info!("resuming task queue");
        self.inner.set_control(|control| control.paused = false);
        if !self.inner.snapshots.borrow().is_empty() {
            self.ensure_runner();
        }
    }

    /// True while a handler invocation is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.control().handler_active
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.control().paused
    }

    #[must_use]
    pub fn run_state(&self) -> QueueRunState {
        self.inner.control().run_state()
    }

    /// Waits until no runner is active.
    pub async fn wait_until_idle(&self) {
        let mut states = self.inner.run_states.subscribe();
        let _ = states
            .wait_for(|state| *state != QueueRunState::Running)
            .await;
    }

    /// Current queue contents, head first.
    #[must_use]
    pub fn tasks(&self) -> Vec<QueuedTask> {
        self.inner.snapshots.borrow().clone()
    }

    /// Receives the queue contents after every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<QueuedTask>> {
        self.inner.snapshots.subscribe()
    }

    /// A handle that enqueues into this queue without keeping it alive.
    #[must_use]
    pub fn scheduler(&self) -> QueueScheduler {
        QueueScheduler {
            queue: Arc::downgrade(&self.inner),
        }
    }

    fn ensure_runner(&self) {
        let start = {
            let mut control = self.inner.control();
            let start = !control.paused && !control.runner_active;
            if start {
                control.runner_active = true;
                self.inner.run_states.send_replace(control.run_state());
            }
            start
        };

        if start {
            debug!("starting task runner");
            let queue = self.clone();
            tokio::spawn(async move { queue.run().await });
        }
    }

    /// Picks the head task, or retires the runner when paused or empty.
    ///
    /// The decision to exit is made under the state lock so a concurrent
    /// [`Self::add_task`] either lands before it or sees the runner gone.
    async fn next_task(&self) -> Option<QueuedTask> {
        let mut state = self.inner.state.lock().await;

        let retire = {
            let mut control = self.inner.control();
            let retire = control.paused || state.is_empty();
            if retire {
                control.runner_active = false;
            } else {
                control.handler_active = true;
            }
            self.inner.run_states.send_replace(control.run_state());
            retire
        };
        if retire {
            return None;
        }

        let head = state.first_mut()?;
        head.meta.is_running = true;
        let task = head.clone();
        self.inner.persist_lossy(&state).await;
        Some(task)
    }

    async fn run(&self) {
        while let Some(queued) = self.next_task().await {
            self.execute(&queued).await;

            let mut state = self.inner.state.lock().await;
            state.retain(|entry| entry.id() != queued.id());
            self.inner.persist_lossy(&state).await;
            self.inner.set_control(|control| control.handler_active = false);
        }
        debug!("task runner exited");
    }

    #[instrument(skip_all, fields(task_id = %queued.task.id, kind = %queued.task.payload.kind()))]
    async fn execute(&self, queued: &QueuedTask) {
        let ctx = TaskContext {
            meta: MetaHandle::new(Arc::new(QueueMeta {
                queue: Arc::downgrade(&self.inner),
                task_id: queued.task.id.clone(),
            })),
            scheduler: Arc::new(self.scheduler()),
        };
        let handlers = Arc::clone(&self.inner.handlers);
        let payload = queued.task.payload.clone();

        info!("task started");
        let outcome =
            tokio::spawn(async move { dispatch(handlers.as_ref(), &payload, &ctx).await }).await;

        let name = &queued.meta.display_name;
        match outcome {
            Ok(Ok(())) => info!("task finished"),
            Ok(Err(err)) => {
                warn!(error = %format!("{err:#}"), "task failed");
                self.inner.notifier.notify(&format!("{name}: {err:#}"));
            }
            Err(join_error) => {
                warn!(error = %join_error, "task handler panicked");
                self.inner
                    .notifier
                    .notify(&format!("{name}: task stopped unexpectedly"));
            }
        }
    }
}

/// Weak scheduling handle given to handlers.
#[derive(Clone)]
pub struct QueueScheduler {
    queue: Weak<QueueInner>,
}

impl fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueScheduler")
            .field("alive", &(self.queue.strong_count() > 0))
            .finish()
    }
}

#[async_trait]
impl TaskScheduler for QueueScheduler {
    async fn schedule(&self, payload: TaskPayload) -> Result<String, QueueError> {
        let inner = self.queue.upgrade().ok_or(QueueError::Closed)?;
        TaskQueue { inner }.add_task(payload).await
    }
}

/// Applies metadata transforms to one queue entry.
struct QueueMeta {
    queue: Weak<QueueInner>,
    task_id: String,
}

#[async_trait]
impl MetaPublisher for QueueMeta {
    async fn publish(&self, transform: MetaTransform) {
        let Some(inner) = self.queue.upgrade() else {
            return;
        };
        let mut state = inner.state.lock().await;
        let Some(entry) = state.iter_mut().find(|queued| queued.id() == self.task_id) else {
            return;
        };
        entry.meta = transform(entry.meta.clone());
        inner.persist_lossy(&state).await;
    }
}
