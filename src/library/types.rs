//! Library row types.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Which novels a sync run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LibraryScope {
    /// Restrict to one category; `None` means the whole library.
    pub category_id: Option<i64>,
    /// Only novels whose status is "Ongoing".
    pub only_ongoing: bool,
}

impl LibraryScope {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn category(category_id: i64) -> Self {
        Self {
            category_id: Some(category_id),
            only_ongoing: false,
        }
    }

    #[must_use]
    pub fn only_ongoing(mut self, only_ongoing: bool) -> Self {
        self.only_ongoing = only_ongoing;
        self
    }
}

/// One novel to refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub novel_id: i64,
    pub plugin_id: String,
    pub path: String,
    pub name: String,
    /// Page count stored before this run; drives incremental pagination.
    pub current_total_pages: u32,
}

/// A chapter inserted by an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedChapter {
    /// Index of the chapter in the upserted slice.
    pub position: usize,
    pub chapter_id: i64,
}

/// Outcome of [`super::Datastore::upsert_chapters`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterUpsert {
    pub inserted: Vec<InsertedChapter>,
    /// Slice indices of existing chapters whose fields changed.
    pub updated: Vec<usize>,
}

impl ChapterUpsert {
    /// Slice indices of every chapter written, inserted or updated.
    pub fn changed_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.inserted
            .iter()
            .map(|chapter| chapter.position)
            .chain(self.updated.iter().copied())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty()
    }
}

/// Input for adding a novel to the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNovel {
    pub plugin_id: String,
    pub path: String,
    pub name: String,
    pub status: Option<String>,
    pub in_library: bool,
    pub is_local: bool,
}

impl NewNovel {
    pub fn new(
        plugin_id: impl Into<String>,
        path: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            path: path.into(),
            name: name.into(),
            status: None,
            in_library: true,
            is_local: false,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn local(mut self) -> Self {
        self.is_local = true;
        self
    }

    #[must_use]
    pub fn outside_library(mut self) -> Self {
        self.in_library = false;
        self
    }
}

/// A stored novel.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct NovelRecord {
    pub id: i64,
    pub plugin_id: String,
    pub path: String,
    pub name: String,
    pub cover: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub genres: Option<String>,
    pub status: Option<String>,
    pub total_pages: i64,
    pub rating: Option<f64>,
    pub word_count: Option<i64>,
    pub in_library: bool,
    pub is_local: bool,
    /// Epoch milliseconds of the newest known chapter release.
    pub latest_chapter_at: Option<i64>,
}

/// A stored chapter.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ChapterRecord {
    pub id: i64,
    pub novel_id: i64,
    pub path: String,
    pub name: String,
    pub release_time: Option<String>,
    pub chapter_number: Option<f64>,
    pub page: String,
    pub position: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_positions_covers_inserted_and_updated() {
        let upsert = ChapterUpsert {
            inserted: vec![InsertedChapter {
                position: 2,
                chapter_id: 10,
            }],
            updated: vec![0],
        };
        let positions: Vec<usize> = upsert.changed_positions().collect();
        assert_eq!(positions, vec![2, 0]);
        assert!(!upsert.is_empty());
        assert!(ChapterUpsert::default().is_empty());
    }

    #[test]
    fn test_scope_builders() {
        assert_eq!(LibraryScope::all().category_id, None);
        let scope = LibraryScope::category(4).only_ongoing(true);
        assert_eq!(scope.category_id, Some(4));
        assert!(scope.only_ongoing);
    }
}
