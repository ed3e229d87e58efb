//! Content sources: the plugins that fetch novels from remote sites.
//!
//! # Architecture
//!
//! - [`ContentSource`] - Async trait each plugin implements
//! - [`SourceRegistry`] - Plugin id → source lookup used by the sync engine
//! - [`call_with_timeout`] - Deadline wrapper applied to every remote call
//! - [`SourceNovel`], [`ChapterItem`], [`NovelItem`], [`PluginItem`] - Data exchanged with sources

mod registry;
mod types;

pub use registry::SourceRegistry;
pub use types::{ChapterItem, NovelItem, PluginItem, PopularOptions, SourceNovel, SourcePage};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;

/// Plugin id of the synthetic source for novels imported from local files.
///
/// Local novels have nothing remote to refresh and are never synced.
pub const LOCAL_PLUGIN_ID: &str = "local";

/// Default deadline for a single source call (30 seconds).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A pluggable adapter for one remote reading source.
///
/// Every call may fail; errors are [`AppError`]s and callers attribute them to
/// [`ContentSource::id`].
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Stable plugin identifier (e.g. "esjzone").
    fn id(&self) -> &str;

    /// Display name used for ordering search results.
    fn name(&self) -> &str;

    /// Returns true if the source can fetch individual chapter pages.
    fn supports_paging(&self) -> bool {
        false
    }

    /// Fetches novel details and the first chapter list.
    async fn fetch_novel(&self, path: &str) -> Result<SourceNovel, AppError>;

    /// Fetches one page of a paginated chapter list.
    async fn fetch_page(&self, path: &str, page: &str) -> Result<SourcePage, AppError> {
        let _ = (path, page);
        Err(AppError::plugin(self.id(), "source does not support paged chapter lists"))
    }

    /// Searches the source for `query`.
    async fn search_novels(&self, query: &str, page: u32) -> Result<Vec<NovelItem>, AppError>;

    /// Lists popular novels.
    async fn popular_novels(
        &self,
        page: u32,
        options: &PopularOptions,
    ) -> Result<Vec<NovelItem>, AppError>;

    /// Returns the display descriptor for this source.
    fn plugin_item(&self) -> PluginItem {
        PluginItem::new(self.id(), self.name())
    }
}

/// Runs a source call with a deadline, attributing any failure to `plugin_id`.
///
/// Expiry aborts the call and surfaces as [`AppError::Network`].
///
/// # Errors
///
/// Returns the source's error (reclassified against the plugin), or a network
/// error when the deadline passes first.
pub async fn call_with_timeout<T, Fut>(
    plugin_id: &str,
    deadline: Duration,
    call: Fut,
) -> Result<T, AppError>
where
    Fut: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result.map_err(|error| error.attribute(plugin_id)),
        Err(_) => Err(AppError::network(format!(
            "{plugin_id}: request timeout after {}s",
            deadline.as_secs_f32()
        ))),
    }
}
