//! Data exchanged with content sources.

use serde::{Deserialize, Serialize};

/// One chapter as listed by a source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterItem {
    pub name: String,
    /// Source-relative path; together with the novel id this identifies the chapter.
    pub path: String,
    /// Release time as published by the source (free-form date text).
    pub release_time: Option<String>,
    pub chapter_number: Option<f64>,
    /// Page label the source assigned, when the listing is paginated.
    pub page: Option<String>,
}

impl ChapterItem {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn released(mut self, release_time: impl Into<String>) -> Self {
        self.release_time = Some(release_time.into());
        self
    }
}

/// Novel details returned by [`crate::source::ContentSource::fetch_novel`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceNovel {
    pub name: String,
    pub cover: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    /// Comma separated genre list.
    pub genres: Option<String>,
    pub status: Option<String>,
    /// Number of chapter pages; absent or 1 for single-page listings.
    pub total_pages: Option<u32>,
    pub rating: Option<f64>,
    pub word_count: Option<i64>,
    #[serde(default)]
    pub chapters: Vec<ChapterItem>,
}

/// A page of a paginated chapter list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourcePage {
    #[serde(default)]
    pub chapters: Vec<ChapterItem>,
}

/// A search or browse hit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NovelItem {
    pub name: String,
    pub path: String,
    pub cover: Option<String>,
}

impl NovelItem {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            cover: None,
        }
    }
}

/// Display descriptor of an installed source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginItem {
    pub id: String,
    pub name: String,
}

impl PluginItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Options for [`crate::source::ContentSource::popular_novels`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularOptions {
    /// List by latest update instead of popularity.
    pub show_latest_novels: bool,
    /// Source-specific filter values.
    pub filters: Option<serde_json::Value>,
}
