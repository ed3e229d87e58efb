//! Library persistence consumed by the sync engine.
//!
//! # Architecture
//!
//! - [`Datastore`] - Async seam the sync engine writes through
//! - [`SqliteLibrary`] - sqlx implementation over the crate's own schema
//! - [`SyncTarget`] / [`LibraryScope`] - Which novels a sync run refreshes
//! - [`ChapterUpsert`] - What a chapter-list upsert actually changed

mod sqlite;
mod types;

pub use sqlite::SqliteLibrary;
pub use types::{
    ChapterRecord, ChapterUpsert, InsertedChapter, LibraryScope, NewNovel, NovelRecord, SyncTarget,
};

use async_trait::async_trait;

use crate::source::{ChapterItem, SourceNovel};
use crate::store::StoreError;

/// Data-access contract for library synchronization.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Lists the novels a sync run should refresh.
    ///
    /// Local novels and novels outside the library are never returned.
    async fn sync_targets(&self, scope: &LibraryScope) -> Result<Vec<SyncTarget>, StoreError>;

    /// Overwrites display metadata with what the source reported.
    async fn update_novel_metadata(
        &self,
        novel_id: i64,
        novel: &SourceNovel,
    ) -> Result<(), StoreError>;

    /// Records the page count of a paginated chapter list.
    async fn update_total_pages(&self, novel_id: i64, total_pages: u32) -> Result<(), StoreError>;

    /// Inserts new chapters and updates changed ones in one transaction.
    ///
    /// Chapters are identified by `(path, novel_id)`. `page` overrides the
    /// page label carried by each item; without either the label is `"1"`.
    async fn upsert_chapters(
        &self,
        novel_id: i64,
        chapters: &[ChapterItem],
        page: Option<&str>,
    ) -> Result<ChapterUpsert, StoreError>;

    /// Raises `latest_chapter_at` to `epoch_ms` unless it is already later.
    async fn raise_latest_chapter_at(&self, novel_id: i64, epoch_ms: i64)
    -> Result<(), StoreError>;
}
