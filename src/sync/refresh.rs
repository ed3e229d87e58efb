//! Refreshing one novel: details, chapter upsert and incremental pagination.

use tracing::{debug, warn};

use super::SyncEngine;
use super::release_time::max_release_time;
use crate::error::AppError;
use crate::library::SyncTarget;
use crate::source::{ChapterItem, ContentSource, LOCAL_PLUGIN_ID, call_with_timeout};
use crate::store::StoreError;
use crate::tasks::{TaskPayload, TaskScheduler};

/// Maps a datastore failure onto the source error taxonomy. Lock contention
/// and pool timeouts count as network failures.
fn store_failure(error: &StoreError) -> AppError {
    let message = error.to_string();
    if error.is_transient() {
        debug!(kind = ?error.database_kind(), "transient datastore failure");
        return AppError::network(message);
    }
    AppError::classify(&message, None)
}

impl SyncEngine {
    /// Fetches a novel and writes what changed. Returns the number of
    /// inserted chapters.
    pub(super) async fn refresh_novel(
        &self,
        target: &SyncTarget,
        scheduler: &dyn TaskScheduler,
    ) -> Result<usize, AppError> {
        if target.plugin_id == LOCAL_PLUGIN_ID {
            return Ok(0);
        }

        let source = self.sources.require(&target.plugin_id)?;
        let novel = call_with_timeout(
            &target.plugin_id,
            self.options.call_timeout,
            source.fetch_novel(&target.path),
        )
        .await?;

        if self.options.refresh_novel_metadata {
            self.datastore
                .update_novel_metadata(target.novel_id, &novel)
                .await
                .map_err(|e| store_failure(&e))?;
        } else if let Some(total_pages) = novel.total_pages.filter(|pages| *pages > 0) {
            self.datastore
                .update_total_pages(target.novel_id, total_pages)
                .await
                .map_err(|e| store_failure(&e))?;
        }

        let mut inserted = self
            .apply_chapters(target, &novel.name, &novel.chapters, None, scheduler)
            .await?;

        if let Some(total_pages) = novel.total_pages.filter(|pages| *pages > 1) {
            if source.supports_paging() {
                inserted += self
                    .refresh_pages(source.as_ref(), target, &novel.name, total_pages, scheduler)
                    .await;
            }
        }

        Ok(inserted)
    }

    /// Re-fetches the previously last page, then every page after it.
    ///
    /// A page that fails is logged and skipped; it never fails the novel.
    async fn refresh_pages(
        &self,
        source: &dyn ContentSource,
        target: &SyncTarget,
        novel_name: &str,
        total_pages: u32,
        scheduler: &dyn TaskScheduler,
    ) -> usize {
        let previous_total = target.current_total_pages;
        let first_page = if previous_total > 1 {
            previous_total
        } else {
            previous_total + 1
        };

        let mut inserted = 0;
        for page in first_page..=total_pages {
            let label = page.to_string();
            let result = async {
                let fetched = call_with_timeout(
                    &target.plugin_id,
                    self.options.call_timeout,
                    source.fetch_page(&target.path, &label),
                )
                .await?;
                self.apply_chapters(target, novel_name, &fetched.chapters, Some(&label), scheduler)
                    .await
            }
            .await;

            match result {
                Ok(count) => inserted += count,
                Err(error) => {
                    warn!(page, error = %error, "failed to fetch chapter page");
                }
            }
        }
        inserted
    }

    /// Upserts a chapter list, raises `latest_chapter_at`, and schedules
    /// downloads for new chapters when enabled. Returns the inserted count.
    async fn apply_chapters(
        &self,
        target: &SyncTarget,
        novel_name: &str,
        chapters: &[ChapterItem],
        page: Option<&str>,
        scheduler: &dyn TaskScheduler,
    ) -> Result<usize, AppError> {
        let upsert = self
            .datastore
            .upsert_chapters(target.novel_id, chapters, page)
            .await
            .map_err(|e| store_failure(&e))?;

        let latest = max_release_time(
            upsert
                .changed_positions()
                .filter_map(|position| chapters.get(position)),
        );
        if let Some(latest) = latest {
            self.datastore
                .raise_latest_chapter_at(target.novel_id, latest)
                .await
                .map_err(|e| store_failure(&e))?;
        }

        if self.options.download_new_chapters {
            for inserted in &upsert.inserted {
                let Some(chapter) = chapters.get(inserted.position) else {
                    continue;
                };
                let payload = TaskPayload::DownloadChapter {
                    chapter_id: inserted.chapter_id,
                    novel_name: novel_name.to_string(),
                    chapter_name: chapter.name.clone(),
                };
                if let Err(error) = scheduler.schedule(payload).await {
                    warn!(chapter_id = inserted.chapter_id, error = %error, "failed to schedule chapter download");
                }
            }
        }

        debug!(
            page = page.unwrap_or("-"),
            inserted = upsert.inserted.len(),
            updated = upsert.updated.len(),
            "chapters applied"
        );
        Ok(upsert.inserted.len())
    }
}
