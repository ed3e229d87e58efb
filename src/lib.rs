//! Shelfsync Core Library
//!
//! Background work for a novel reader: a persisted task queue, a library
//! sync engine that pulls new chapters from content sources, and a global
//! search engine that fans a query out over every installed source.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`tasks`] - Persisted FIFO task queue, task kinds and handlers
//! - [`sync`] - Library update with retry, dedup, pagination and progress
//! - [`search`] - Concurrent multi-source search with stale-result rejection
//! - [`source`] - The content source plugin contract
//! - [`library`] - Library datastore (novels, chapters, categories)
//! - [`store`] - Key-value persistence for the queue and settings
//! - [`db`] - Database connection and schema management
//! - [`config`] - Engine settings
//! - [`logging`] - Tracing subscriber setup

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod library;
pub mod logging;
pub mod retry;
pub mod search;
pub mod source;
pub mod store;
pub mod sync;
pub mod tasks;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineSettings};
pub use db::{Database, DatabaseOptions, DbError};
pub use dedup::DedupCache;
pub use error::{AppError, ErrorKind};
pub use library::{Datastore, LibraryScope, SqliteLibrary};
pub use retry::{RetryDecision, RetryPolicy};
pub use search::{SearchEngine, SearchOptions, SearchRun, SearchSnapshot};
pub use source::{ContentSource, SourceRegistry};
pub use store::{KeyValueStore, MemoryKvStore, SqliteKvStore, StoreError};
pub use sync::{SyncEngine, SyncError, SyncOptions, SyncStats};
pub use tasks::{
    MetaHandle, Notifier, QueueError, StandardHandlers, TaskHandlers, TaskPayload, TaskQueue,
};
