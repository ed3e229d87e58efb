//! sqlx-backed library datastore.

use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, instrument};

use super::{
    ChapterRecord, ChapterUpsert, Datastore, InsertedChapter, LibraryScope, NewNovel, NovelRecord,
    SyncTarget,
};
use crate::db::Database;
use crate::source::{ChapterItem, LOCAL_PLUGIN_ID, SourceNovel};
use crate::store::StoreError;

/// Page label used when neither the caller nor the source names one.
const DEFAULT_PAGE: &str = "1";

/// Author stored when a metadata refresh reports none.
const UNKNOWN_AUTHOR: &str = "unknown";

/// Status value matched by [`LibraryScope::only_ongoing`].
const ONGOING_STATUS: &str = "Ongoing";

/// Returns `Ok(())` if at least one row was affected; otherwise [`StoreError::NovelNotFound`].
fn check_affected(novel_id: i64, rows_affected: u64) -> Result<(), StoreError> {
    if rows_affected == 0 {
        Err(StoreError::NovelNotFound(novel_id))
    } else {
        Ok(())
    }
}

fn position_value(position: usize) -> i64 {
    i64::try_from(position).unwrap_or(i64::MAX)
}

/// Library tables of a [`Database`].
#[derive(Debug, Clone)]
pub struct SqliteLibrary {
    db: Database,
}

impl SqliteLibrary {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds a novel and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails, including when
    /// `(path, plugin_id)` already exists.
    #[instrument(skip(self, novel), fields(plugin_id = %novel.plugin_id, path = %novel.path))]
    pub async fn add_novel(&self, novel: &NewNovel) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r"INSERT INTO novel (plugin_id, path, name, status, in_library, is_local)
              VALUES (?, ?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(&novel.plugin_id)
        .bind(&novel.path)
        .bind(&novel.name)
        .bind(novel.status.as_deref())
        .bind(novel.in_library)
        .bind(novel.is_local)
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.get("id"))
    }

    /// Creates a category and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self))]
    pub async fn add_category(&self, name: &str) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r"INSERT INTO category (name, sort)
              VALUES (?, (SELECT COALESCE(MAX(sort), 0) + 1 FROM category))
              RETURNING id",
        )
        .bind(name)
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.get("id"))
    }

    /// Puts a novel in a category. Assigning twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if either id does not exist.
    #[instrument(skip(self))]
    pub async fn assign_category(&self, novel_id: i64, category_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO novel_category (novel_id, category_id)
              VALUES (?, ?)
              ON CONFLICT(novel_id, category_id) DO NOTHING",
        )
        .bind(novel_id)
        .bind(category_id)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Loads a novel by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn novel(&self, novel_id: i64) -> Result<Option<NovelRecord>, StoreError> {
        let novel = sqlx::query_as::<_, NovelRecord>(
            r"SELECT id, plugin_id, path, name, cover, summary, author, artist, genres, status,
                     total_pages, rating, word_count, in_library, is_local, latest_chapter_at
              FROM novel WHERE id = ?",
        )
        .bind(novel_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(novel)
    }

    /// Chapters of a novel in reading order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn chapters(&self, novel_id: i64) -> Result<Vec<ChapterRecord>, StoreError> {
        let chapters = sqlx::query_as::<_, ChapterRecord>(
            r"SELECT id, novel_id, path, name, release_time, chapter_number, page, position
              FROM chapter
              WHERE novel_id = ?
              ORDER BY CAST(page AS INTEGER), page, position, id",
        )
        .bind(novel_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(chapters)
    }

    /// Number of stored chapters for a novel.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn chapter_count(&self, novel_id: i64) -> Result<i64, StoreError> {
        let row = sqlx::query(r"SELECT COUNT(*) AS count FROM chapter WHERE novel_id = ?")
            .bind(novel_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("count"))
    }

    /// Epoch milliseconds of the newest known release, if any was recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NovelNotFound`] for unknown ids.
    pub async fn latest_chapter_at(&self, novel_id: i64) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query(r"SELECT latest_chapter_at FROM novel WHERE id = ?")
            .bind(novel_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.map(|row| row.get("latest_chapter_at"))
            .ok_or(StoreError::NovelNotFound(novel_id))
    }
}

#[async_trait]
impl Datastore for SqliteLibrary {
    #[instrument(skip(self))]
    async fn sync_targets(&self, scope: &LibraryScope) -> Result<Vec<SyncTarget>, StoreError> {
        let rows = sqlx::query(
            r"SELECT n.id, n.plugin_id, n.path, n.name, n.total_pages
              FROM novel n
              WHERE n.in_library = 1
                AND n.is_local = 0
                AND n.plugin_id != ?
                AND (? IS NULL OR EXISTS (
                    SELECT 1 FROM novel_category nc
                    WHERE nc.novel_id = n.id AND nc.category_id = ?
                ))
                AND (? = 0 OR n.status = ?)
              ORDER BY n.name COLLATE NOCASE, n.id",
        )
        .bind(LOCAL_PLUGIN_ID)
        .bind(scope.category_id)
        .bind(scope.category_id)
        .bind(scope.only_ongoing)
        .bind(ONGOING_STATUS)
        .fetch_all(self.db.pool())
        .await?;

        let targets: Vec<SyncTarget> = rows
            .iter()
            .map(|row| SyncTarget {
                novel_id: row.get("id"),
                plugin_id: row.get("plugin_id"),
                path: row.get("path"),
                name: row.get("name"),
                current_total_pages: u32::try_from(row.get::<i64, _>("total_pages")).unwrap_or(0),
            })
            .collect();

        debug!(count = targets.len(), "resolved sync targets");
        Ok(targets)
    }

    #[instrument(skip(self, novel))]
    async fn update_novel_metadata(
        &self,
        novel_id: i64,
        novel: &SourceNovel,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"UPDATE novel SET
                  name = ?, cover = ?, summary = ?, author = ?, artist = ?,
                  genres = ?, status = ?, total_pages = ?, rating = ?, word_count = ?
              WHERE id = ?",
        )
        .bind(&novel.name)
        .bind(novel.cover.as_deref())
        .bind(novel.summary.as_deref())
        .bind(novel.author.as_deref().unwrap_or(UNKNOWN_AUTHOR))
        .bind(novel.artist.as_deref())
        .bind(novel.genres.as_deref())
        .bind(novel.status.as_deref())
        .bind(i64::from(novel.total_pages.unwrap_or(0)))
        .bind(novel.rating)
        .bind(novel.word_count)
        .bind(novel_id)
        .execute(self.db.pool())
        .await?;

        check_affected(novel_id, result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn update_total_pages(&self, novel_id: i64, total_pages: u32) -> Result<(), StoreError> {
        let result = sqlx::query(r"UPDATE novel SET total_pages = ? WHERE id = ?")
            .bind(i64::from(total_pages))
            .bind(novel_id)
            .execute(self.db.pool())
            .await?;

        check_affected(novel_id, result.rows_affected())
    }

    #[instrument(skip(self, chapters), fields(count = chapters.len()))]
    async fn upsert_chapters(
        &self,
        novel_id: i64,
        chapters: &[ChapterItem],
        page: Option<&str>,
    ) -> Result<ChapterUpsert, StoreError> {
        let mut outcome = ChapterUpsert::default();
        let mut tx = self.db.pool().begin().await?;

        for (position, chapter) in chapters.iter().enumerate() {
            let chapter_page = page
                .or(chapter.page.as_deref())
                .unwrap_or(DEFAULT_PAGE);
            let position_db = position_value(position);

            let inserted = sqlx::query(
                r"INSERT INTO chapter
                      (novel_id, path, name, release_time, chapter_number, page, position, updated_time)
                  VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))
                  ON CONFLICT(path, novel_id) DO NOTHING
                  RETURNING id",
            )
            .bind(novel_id)
            .bind(&chapter.path)
            .bind(&chapter.name)
            .bind(chapter.release_time.as_deref())
            .bind(chapter.chapter_number)
            .bind(chapter_page)
            .bind(position_db)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = inserted {
                outcome.inserted.push(InsertedChapter {
                    position,
                    chapter_id: row.get("id"),
                });
                continue;
            }

            // Only rewrite rows whose visible fields differ.
            let result = sqlx::query(
                r"UPDATE chapter SET
                      name = ?, release_time = ?, page = ?, position = ?, updated_time = datetime('now')
                  WHERE path = ? AND novel_id = ?
                    AND (name IS NOT ? OR release_time IS NOT ? OR page IS NOT ? OR position IS NOT ?)",
            )
            .bind(&chapter.name)
            .bind(chapter.release_time.as_deref())
            .bind(chapter_page)
            .bind(position_db)
            .bind(&chapter.path)
            .bind(novel_id)
            .bind(&chapter.name)
            .bind(chapter.release_time.as_deref())
            .bind(chapter_page)
            .bind(position_db)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                outcome.updated.push(position);
            }
        }

        tx.commit().await?;

        debug!(
            inserted = outcome.inserted.len(),
            updated = outcome.updated.len(),
            "chapters upserted"
        );
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn raise_latest_chapter_at(
        &self,
        novel_id: i64,
        epoch_ms: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"UPDATE novel
              SET latest_chapter_at = MAX(COALESCE(latest_chapter_at, 0), ?)
              WHERE id = ?",
        )
        .bind(epoch_ms)
        .bind(novel_id)
        .execute(self.db.pool())
        .await?;

        check_affected(novel_id, result.rows_affected())
    }
}
