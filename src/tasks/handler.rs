//! Typed task handlers and the exhaustive dispatch over task kinds.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{MetaHandle, TaskPayload, TaskScheduler};
use crate::library::LibraryScope;
use crate::sync::SyncEngine;

/// What a running handler receives besides its payload.
#[derive(Clone)]
pub struct TaskContext {
    /// Publishes this task's display state.
    pub meta: MetaHandle,
    /// Enqueues follow-up tasks.
    pub scheduler: Arc<dyn TaskScheduler>,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext").finish_non_exhaustive()
    }
}

/// One handler per task kind.
///
/// An `Err` marks the task failed; the queue reports it and moves on.
#[async_trait]
pub trait TaskHandlers: Send + Sync {
    async fn update_library(&self, category_id: Option<i64>, ctx: &TaskContext)
    -> anyhow::Result<()>;

    async fn download_chapter(
        &self,
        chapter_id: i64,
        novel_name: &str,
        chapter_name: &str,
        ctx: &TaskContext,
    ) -> anyhow::Result<()>;

    async fn local_backup(&self, ctx: &TaskContext) -> anyhow::Result<()>;

    async fn local_restore(&self, ctx: &TaskContext) -> anyhow::Result<()>;

    async fn drive_backup(&self, folder_name: &str, ctx: &TaskContext) -> anyhow::Result<()>;

    async fn drive_restore(&self, folder_id: &str, ctx: &TaskContext) -> anyhow::Result<()>;
}

/// Routes `payload` to its handler.
///
/// # Errors
///
/// Returns whatever the handler returned.
#[instrument(skip_all, fields(kind = %payload.kind()))]
pub async fn dispatch(
    handlers: &dyn TaskHandlers,
    payload: &TaskPayload,
    ctx: &TaskContext,
) -> anyhow::Result<()> {
    debug!("dispatching task");
    match payload {
        TaskPayload::UpdateLibrary { category_id } => {
            handlers.update_library(*category_id, ctx).await
        }
        TaskPayload::DownloadChapter {
            chapter_id,
            novel_name,
            chapter_name,
        } => {
            handlers
                .download_chapter(*chapter_id, novel_name, chapter_name, ctx)
                .await
        }
        TaskPayload::LocalBackup => handlers.local_backup(ctx).await,
        TaskPayload::LocalRestore => handlers.local_restore(ctx).await,
        TaskPayload::DriveBackup { folder_name } => handlers.drive_backup(folder_name, ctx).await,
        TaskPayload::DriveRestore { folder_id } => handlers.drive_restore(folder_id, ctx).await,
    }
}

/// Downloads chapter content for offline reading.
#[async_trait]
pub trait ChapterDownloader: Send + Sync {
    async fn download_chapter(&self, chapter_id: i64, meta: &MetaHandle) -> anyhow::Result<()>;
}

/// Creates and restores backups. The archive format is the host's concern.
#[async_trait]
pub trait BackupService: Send + Sync {
    async fn local_backup(&self, meta: &MetaHandle) -> anyhow::Result<()>;

    async fn local_restore(&self, meta: &MetaHandle) -> anyhow::Result<()>;

    async fn drive_backup(&self, folder_name: &str, meta: &MetaHandle) -> anyhow::Result<()>;

    async fn drive_restore(&self, folder_id: &str, meta: &MetaHandle) -> anyhow::Result<()>;
}

/// Handlers backed by the sync engine and host collaborators.
pub struct StandardHandlers {
    sync: Arc<SyncEngine>,
    downloader: Option<Arc<dyn ChapterDownloader>>,
    backup: Option<Arc<dyn BackupService>>,
}

impl fmt::Debug for StandardHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardHandlers")
            .field("sync", &self.sync)
            .field("downloader", &self.downloader.is_some())
            .field("backup", &self.backup.is_some())
            .finish()
    }
}

impl StandardHandlers {
    #[must_use]
    pub fn new(sync: Arc<SyncEngine>) -> Self {
        Self {
            sync,
            downloader: None,
            backup: None,
        }
    }

    #[must_use]
    pub fn with_downloader(mut self, downloader: Arc<dyn ChapterDownloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    #[must_use]
    pub fn with_backup(mut self, backup: Arc<dyn BackupService>) -> Self {
        self.backup = Some(backup);
        self
    }

    fn backup(&self) -> anyhow::Result<&Arc<dyn BackupService>> {
        match &self.backup {
            Some(backup) => Ok(backup),
            None => bail!("no backup service configured"),
        }
    }
}

#[async_trait]
impl TaskHandlers for StandardHandlers {
    async fn update_library(
        &self,
        category_id: Option<i64>,
        ctx: &TaskContext,
    ) -> anyhow::Result<()> {
        let scope = LibraryScope {
            category_id,
            only_ongoing: false,
        };
        self.sync
            .run(scope, &ctx.meta, ctx.scheduler.as_ref())
            .await
            .context("library update failed")?;
        Ok(())
    }

    async fn download_chapter(
        &self,
        chapter_id: i64,
        novel_name: &str,
        chapter_name: &str,
        ctx: &TaskContext,
    ) -> anyhow::Result<()> {
        let Some(downloader) = &self.downloader else {
            bail!("no chapter downloader configured");
        };
        downloader
            .download_chapter(chapter_id, &ctx.meta)
            .await
            .with_context(|| format!("failed to download {novel_name}: {chapter_name}"))
    }

    async fn local_backup(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        self.backup()?.local_backup(&ctx.meta).await
    }

    async fn local_restore(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        self.backup()?.local_restore(&ctx.meta).await
    }

    async fn drive_backup(&self, folder_name: &str, ctx: &TaskContext) -> anyhow::Result<()> {
        self.backup()?.drive_backup(folder_name, &ctx.meta).await
    }

    async fn drive_restore(&self, folder_id: &str, ctx: &TaskContext) -> anyhow::Result<()> {
        self.backup()?.drive_restore(folder_id, &ctx.meta).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::tasks::{ScheduledTasks, TaskKind};

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<TaskKind>>,
    }

    impl Recording {
        fn push(&self, kind: TaskKind) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(kind);
            Ok(())
        }
    }

    #[async_trait]
    impl TaskHandlers for Recording {
        async fn update_library(
            &self,
            _category_id: Option<i64>,
            _ctx: &TaskContext,
        ) -> anyhow::Result<()> {
            self.push(TaskKind::UpdateLibrary)
        }

        async fn download_chapter(
            &self,
            _chapter_id: i64,
            _novel_name: &str,
            _chapter_name: &str,
            _ctx: &TaskContext,
        ) -> anyhow::Result<()> {
            self.push(TaskKind::DownloadChapter)
        }

        async fn local_backup(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
            self.push(TaskKind::LocalBackup)
        }

        async fn local_restore(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
            self.push(TaskKind::LocalRestore)
        }

        async fn drive_backup(&self, _folder_name: &str, _ctx: &TaskContext) -> anyhow::Result<()> {
            self.push(TaskKind::DriveBackup)
        }

        async fn drive_restore(&self, _folder_id: &str, _ctx: &TaskContext) -> anyhow::Result<()> {
            self.push(TaskKind::DriveRestore)
        }
    }

    fn context() -> TaskContext {
        TaskContext {
            meta: MetaHandle::detached(),
            scheduler: ScheduledTasks::new(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_every_kind() {
        let handlers = Recording::default();
        let payloads = vec![
            TaskPayload::UpdateLibrary { category_id: None },
            TaskPayload::DownloadChapter {
                chapter_id: 1,
                novel_name: "n".to_string(),
                chapter_name: "c".to_string(),
            },
            TaskPayload::LocalBackup,
            TaskPayload::LocalRestore,
            TaskPayload::DriveBackup {
                folder_name: "f".to_string(),
            },
            TaskPayload::DriveRestore {
                folder_id: "id".to_string(),
            },
        ];

        for payload in &payloads {
            dispatch(&handlers, payload, &context()).await.unwrap();
        }

        let seen = handlers.seen.lock().unwrap().clone();
        let expected: Vec<TaskKind> = payloads.iter().map(TaskPayload::kind).collect();
        assert_eq!(seen, expected);
    }
}
