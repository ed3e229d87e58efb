//! Engine settings persisted by the host under [`SETTINGS_KEY`].
//!
//! Every field has a default, so a partial or missing document still loads.
//! Unknown keys written by the host are ignored.

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::retry::RetryPolicy;
use crate::search::SearchOptions;
use crate::store::{KeyValueStore, StoreError, get_json};
use crate::sync::SyncOptions;

/// Key-value entry holding the settings document.
pub const SETTINGS_KEY: &str = "app_settings";

/// Longest accepted dedup window (one day).
const MAX_DEDUP_WINDOW_SECS: u64 = 86_400;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is outside its accepted range.
    #[error("Invalid config value for `{field}`: {value}. Expected range: {expected}")]
    Invalid {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The settings document could not be read or decoded.
    #[error("failed to load settings: {0}")]
    Store(#[from] StoreError),
}

/// Tunables for the sync and search engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    pub sync_concurrency: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub inter_item_delay_ms: u64,
    pub dedup_window_secs: u64,
    pub refresh_novel_metadata: bool,
    pub download_new_chapters: bool,
    pub only_update_ongoing: bool,
    pub search_concurrency: usize,
    pub search_debounce_ms: u64,
    pub hide_empty_results: bool,
    pub source_call_timeout_secs: u64,
    pub progress_interval_ms: u64,
    pub progress_min_delta: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sync_concurrency: 1,
            max_retries: 2,
            retry_delay_ms: 2000,
            inter_item_delay_ms: 500,
            dedup_window_secs: 300,
            refresh_novel_metadata: false,
            download_new_chapters: false,
            only_update_ongoing: false,
            search_concurrency: 1,
            search_debounce_ms: 300,
            hide_empty_results: false,
            source_call_timeout_secs: 30,
            progress_interval_ms: 250,
            progress_min_delta: 0.01,
        }
    }
}

impl EngineSettings {
    /// Reads and validates the settings document, falling back to defaults
    /// when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Store`] when the document cannot be read or
    /// decoded, and [`ConfigError::Invalid`] when a value is out of range.
    #[instrument(skip(store))]
    pub async fn load(store: &dyn KeyValueStore) -> Result<Self, ConfigError> {
        let settings = match get_json::<Self>(store, SETTINGS_KEY).await? {
            Some(settings) => settings,
            None => {
                debug!("no stored settings, using defaults");
                Self::default()
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_concurrency("syncConcurrency", self.sync_concurrency)?;
        validate_concurrency("searchConcurrency", self.search_concurrency)?;

        if !(1..=3600).contains(&self.source_call_timeout_secs) {
            return Err(ConfigError::Invalid {
                field: "sourceCallTimeoutSecs",
                value: self.source_call_timeout_secs.to_string(),
                expected: "1..=3600",
            });
        }

        if self.dedup_window_secs > MAX_DEDUP_WINDOW_SECS {
            return Err(ConfigError::Invalid {
                field: "dedupWindowSecs",
                value: self.dedup_window_secs.to_string(),
                expected: "0..=86400",
            });
        }

        if !(self.progress_min_delta > 0.0 && self.progress_min_delta <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "progressMinDelta",
                value: self.progress_min_delta.to_string(),
                expected: "(0, 1]",
            });
        }

        Ok(())
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    /// Window during which a refreshed novel is skipped.
    #[must_use]
    pub fn dedup_window(&self) -> TimeDelta {
        let secs = i64::try_from(self.dedup_window_secs).unwrap_or(i64::MAX);
        TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX)
    }

    #[must_use]
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            concurrency: self.sync_concurrency,
            retry: self.retry_policy(),
            inter_item_delay: Duration::from_millis(self.inter_item_delay_ms),
            refresh_novel_metadata: self.refresh_novel_metadata,
            download_new_chapters: self.download_new_chapters,
            only_update_ongoing: self.only_update_ongoing,
            call_timeout: Duration::from_secs(self.source_call_timeout_secs),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            progress_min_delta: self.progress_min_delta,
        }
    }

    #[must_use]
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            concurrency: self.search_concurrency,
            debounce: Duration::from_millis(self.search_debounce_ms),
            hide_empty_results: self.hide_empty_results,
            call_timeout: Duration::from_secs(self.source_call_timeout_secs),
        }
    }
}

fn validate_concurrency(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if !(1..=100).contains(&value) {
        return Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
            expected: "1..=100",
        });
    }
    Ok(())
}
