//! Task data model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Work carried by a task, one variant per kind.
///
/// Serialized as `{"kind": "UPDATE_LIBRARY", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum TaskPayload {
    UpdateLibrary {
        #[serde(default)]
        category_id: Option<i64>,
    },
    DownloadChapter {
        chapter_id: i64,
        novel_name: String,
        chapter_name: String,
    },
    LocalBackup,
    LocalRestore,
    DriveBackup {
        folder_name: String,
    },
    DriveRestore {
        folder_id: String,
    },
}

impl TaskPayload {
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::UpdateLibrary { .. } => TaskKind::UpdateLibrary,
            Self::DownloadChapter { .. } => TaskKind::DownloadChapter,
            Self::LocalBackup => TaskKind::LocalBackup,
            Self::LocalRestore => TaskKind::LocalRestore,
            Self::DriveBackup { .. } => TaskKind::DriveBackup,
            Self::DriveRestore { .. } => TaskKind::DriveRestore,
        }
    }

    /// Human-readable label shown in the task list.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::UpdateLibrary { category_id: None } => "Update library".to_string(),
            Self::UpdateLibrary {
                category_id: Some(id),
            } => format!("Update category {id}"),
            Self::DownloadChapter {
                novel_name,
                chapter_name,
                ..
            } => format!("Download {novel_name}: {chapter_name}"),
            Self::LocalBackup => "Local backup".to_string(),
            Self::LocalRestore => "Local restore".to_string(),
            Self::DriveBackup { .. } => "Drive backup".to_string(),
            Self::DriveRestore { .. } => "Drive restore".to_string(),
        }
    }
}

/// Discriminant of [`TaskPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    UpdateLibrary,
    DownloadChapter,
    LocalBackup,
    LocalRestore,
    DriveBackup,
    DriveRestore,
}

impl TaskKind {
    /// Returns the wire representation of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateLibrary => "UPDATE_LIBRARY",
            Self::DownloadChapter => "DOWNLOAD_CHAPTER",
            Self::LocalBackup => "LOCAL_BACKUP",
            Self::LocalRestore => "LOCAL_RESTORE",
            Self::DriveBackup => "DRIVE_BACKUP",
            Self::DriveRestore => "DRIVE_RESTORE",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPDATE_LIBRARY" => Ok(Self::UpdateLibrary),
            "DOWNLOAD_CHAPTER" => Ok(Self::DownloadChapter),
            "LOCAL_BACKUP" => Ok(Self::LocalBackup),
            "LOCAL_RESTORE" => Ok(Self::LocalRestore),
            "DRIVE_BACKUP" => Ok(Self::DriveBackup),
            "DRIVE_RESTORE" => Ok(Self::DriveRestore),
            _ => Err(format!("Invalid task kind: {s}")),
        }
    }
}

/// An immutable unit of background work.
///
/// Serialized flat: `{"id", "kind", "payload", "createdAt"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(flatten)]
    pub payload: TaskPayload,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Creates a task with a fresh unique id.
    #[must_use]
    pub fn new(payload: TaskPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Display state of a task, published to observers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    #[serde(rename = "name")]
    pub display_name: String,
    pub is_running: bool,
    /// Fraction complete in `[0, 1]`; `None` renders as indeterminate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_text: Option<String>,
}

impl TaskMetadata {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }
}

/// A task together with its display state, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task: Task,
    pub meta: TaskMetadata,
}

impl QueuedTask {
    #[must_use]
    pub fn new(task: Task) -> Self {
        let meta = TaskMetadata::new(task.payload.display_name());
        Self { task, meta }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.task.id
    }
}
