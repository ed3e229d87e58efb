//! Shared fakes for integration tests: a scripted content source, a
//! library on a temporary database, and recording task handlers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shelfsync_core::error::AppError;
use shelfsync_core::library::SqliteLibrary;
use shelfsync_core::source::{
    ChapterItem, ContentSource, NovelItem, PopularOptions, SourceNovel, SourcePage,
};
use shelfsync_core::tasks::{TaskContext, TaskHandlers};
use shelfsync_core::Database;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Creates a library on a file database inside a temporary directory.
pub async fn setup_library() -> (SqliteLibrary, Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("library.db");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (SqliteLibrary::new(db.clone()), db, temp_dir)
}

/// A content source whose answers are set up front by the test.
pub struct ScriptedSource {
    id: String,
    name: String,
    paging: bool,
    delay: Duration,
    novels: Mutex<HashMap<String, SourceNovel>>,
    pages: Mutex<HashMap<(String, String), Vec<ChapterItem>>>,
    failures: Mutex<HashMap<String, usize>>,
    hits: Vec<String>,
    search_error: Option<String>,
    gate: Option<(String, Arc<Notify>)>,
    fetch_calls: AtomicUsize,
    fetched_pages: Mutex<Vec<String>>,
    searched: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            paging: false,
            delay: Duration::ZERO,
            novels: Mutex::new(HashMap::new()),
            pages: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            hits: Vec::new(),
            search_error: None,
            gate: None,
            fetch_calls: AtomicUsize::new(0),
            fetched_pages: Mutex::new(Vec::new()),
            searched: Mutex::new(Vec::new()),
        }
    }

    pub fn paged(mut self) -> Self {
        self.paging = true;
        self
    }

    /// Every call sleeps for `delay` before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_novel(self, path: &str, novel: SourceNovel) -> Self {
        self.set_novel(path, novel);
        self
    }

    pub fn with_page(self, path: &str, page: &str, chapters: Vec<ChapterItem>) -> Self {
        self.set_page(path, page, chapters);
        self
    }

    /// The next `times` fetches of `path` fail with a network error.
    pub fn failing(self, path: &str, times: usize) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(path.to_string(), times);
        self
    }

    /// Search answers one hit per name, prefixed with the query.
    pub fn with_hits(mut self, names: &[&str]) -> Self {
        self.hits = names.iter().map(|name| (*name).to_string()).collect();
        self
    }

    pub fn failing_search(mut self, message: &str) -> Self {
        self.search_error = Some(message.to_string());
        self
    }

    /// Searches for `query` wait until `gate` is notified.
    pub fn gated(mut self, query: &str, gate: Arc<Notify>) -> Self {
        self.gate = Some((query.to_string(), gate));
        self
    }

    pub fn set_novel(&self, path: &str, novel: SourceNovel) {
        self.novels.lock().unwrap().insert(path.to_string(), novel);
    }

    pub fn set_page(&self, path: &str, page: &str, chapters: Vec<ChapterItem>) {
        self.pages
            .lock()
            .unwrap()
            .insert((path.to_string(), page.to_string()), chapters);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn fetched_pages(&self) -> Vec<String> {
        self.fetched_pages.lock().unwrap().clone()
    }

    pub fn searched(&self) -> Vec<String> {
        self.searched.lock().unwrap().clone()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_paging(&self) -> bool {
        self.paging
    }

    async fn fetch_novel(&self, path: &str) -> Result<SourceNovel, AppError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(path)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(AppError::network("fetch failed: connection reset"));
            }
        }

        self.novels
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| AppError::plugin(&self.id, format!("no novel at {path}")))
    }

    async fn fetch_page(&self, path: &str, page: &str) -> Result<SourcePage, AppError> {
        self.fetched_pages.lock().unwrap().push(page.to_string());
        self.pause().await;

        self.pages
            .lock()
            .unwrap()
            .get(&(path.to_string(), page.to_string()))
            .cloned()
            .map(|chapters| SourcePage { chapters })
            .ok_or_else(|| AppError::network(format!("page {page} unavailable")))
    }

    async fn search_novels(&self, query: &str, _page: u32) -> Result<Vec<NovelItem>, AppError> {
        self.searched.lock().unwrap().push(query.to_string());
        if let Some((gated_query, gate)) = &self.gate
            && gated_query == query
        {
            gate.notified().await;
        }
        self.pause().await;

        if let Some(message) = &self.search_error {
            return Err(AppError::network(message.clone()));
        }
        Ok(self
            .hits
            .iter()
            .map(|hit| NovelItem::new(format!("{query} {hit}"), format!("/{hit}")))
            .collect())
    }

    async fn popular_novels(
        &self,
        _page: u32,
        _options: &PopularOptions,
    ) -> Result<Vec<NovelItem>, AppError> {
        Ok(Vec::new())
    }
}

/// A single-page novel as a source reports it.
pub fn source_novel(name: &str, chapters: Vec<ChapterItem>) -> SourceNovel {
    SourceNovel {
        name: name.to_string(),
        chapters,
        ..SourceNovel::default()
    }
}

/// Chapters named "Chapter N" with paths "/{prefix}/N".
pub fn chapters(prefix: &str, range: std::ops::RangeInclusive<u32>) -> Vec<ChapterItem> {
    range
        .map(|n| ChapterItem::new(format!("Chapter {n}"), format!("/{prefix}/{n}")))
        .collect()
}

/// Handlers that record every task they run, in order.
///
/// Tasks whose display name contains "fail" return an error; those containing
/// "panic" panic; "slow" ones wait for `release` before finishing.
#[derive(Default)]
pub struct RecordingHandlers {
    pub ran: Mutex<Vec<String>>,
    pub release: Notify,
}

impl RecordingHandlers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ran(&self) -> Vec<String> {
        self.ran.lock().unwrap().clone()
    }

    async fn run(&self, label: &str, ctx: &TaskContext) -> anyhow::Result<()> {
        self.ran.lock().unwrap().push(label.to_string());
        ctx.meta
            .set(|meta| {
                let mut meta = meta;
                meta.progress = Some(0.5);
                meta
            })
            .await;
        if label.contains("slow") {
            self.release.notified().await;
        }
        if label.contains("panic") {
            panic!("handler blew up");
        }
        if label.contains("fail") {
            anyhow::bail!("offline");
        }
        Ok(())
    }
}

#[async_trait]
impl TaskHandlers for RecordingHandlers {
    async fn update_library(
        &self,
        category_id: Option<i64>,
        ctx: &TaskContext,
    ) -> anyhow::Result<()> {
        let label = match category_id {
            Some(id) => format!("update {id}"),
            None => "update".to_string(),
        };
        self.run(&label, ctx).await
    }

    async fn download_chapter(
        &self,
        _chapter_id: i64,
        novel_name: &str,
        chapter_name: &str,
        ctx: &TaskContext,
    ) -> anyhow::Result<()> {
        self.run(&format!("{novel_name}: {chapter_name}"), ctx).await
    }

    async fn local_backup(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        self.run("local backup", ctx).await
    }

    async fn local_restore(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        self.run("local restore", ctx).await
    }

    async fn drive_backup(&self, folder_name: &str, ctx: &TaskContext) -> anyhow::Result<()> {
        self.run(&format!("drive backup {folder_name}"), ctx).await
    }

    async fn drive_restore(&self, folder_id: &str, ctx: &TaskContext) -> anyhow::Result<()> {
        self.run(&format!("drive restore {folder_id}"), ctx).await
    }
}
