//! Registry of installed content sources.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::ContentSource;
use crate::error::AppError;

/// Plugin id → source lookup.
///
/// Registration order is kept so hosts can list sources the way the user
/// installed them; the search engine applies its own alphabetical order.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn ContentSource>>,
    order: Vec<String>,
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.order)
            .finish()
    }
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source, replacing any previous source with the same id.
    #[tracing::instrument(skip(self, source), fields(plugin_id = source.id()))]
    pub fn register(&mut self, source: Arc<dyn ContentSource>) {
        let id = source.id().to_string();
        debug!(name = source.name(), "registering content source");
        if self.sources.insert(id.clone(), source).is_none() {
            self.order.push(id);
        }
    }

    /// Builds a registry from a list of sources.
    #[must_use]
    pub fn from_sources(sources: impl IntoIterator<Item = Arc<dyn ContentSource>>) -> Self {
        let mut registry = Self::new();
        for source in sources {
            registry.register(source);
        }
        registry
    }

    #[must_use]
    pub fn get(&self, plugin_id: &str) -> Option<Arc<dyn ContentSource>> {
        self.sources.get(plugin_id).cloned()
    }

    /// Looks up a source, failing with a plugin error when it is not installed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Plugin`] for unknown plugin ids.
    pub fn require(&self, plugin_id: &str) -> Result<Arc<dyn ContentSource>, AppError> {
        self.get(plugin_id)
            .ok_or_else(|| AppError::plugin(plugin_id, format!("Unknown plugin: {plugin_id}")))
    }

    /// Sources in registration order.
    #[must_use]
    pub fn sources(&self) -> Vec<Arc<dyn ContentSource>> {
        self.order
            .iter()
            .filter_map(|id| self.sources.get(id).cloned())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::source::{NovelItem, PopularOptions, SourceNovel};

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl ContentSource for Named {
        fn id(&self) -> &str {
            self.0
        }

        fn name(&self) -> &str {
            self.1
        }

        async fn fetch_novel(&self, _path: &str) -> Result<SourceNovel, AppError> {
            Ok(SourceNovel::default())
        }

        async fn search_novels(&self, _query: &str, _page: u32) -> Result<Vec<NovelItem>, AppError> {
            Ok(Vec::new())
        }

        async fn popular_novels(
            &self,
            _page: u32,
            _options: &PopularOptions,
        ) -> Result<Vec<NovelItem>, AppError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_register_keeps_insertion_order() {
        let registry = SourceRegistry::from_sources([
            Arc::new(Named("b", "Bravo")) as Arc<dyn ContentSource>,
            Arc::new(Named("a", "Alpha")),
        ]);
        let ids: Vec<String> = registry.sources().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(Named("a", "Alpha")));
        registry.register(Arc::new(Named("a", "Alpha v2")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().name(), "Alpha v2");
    }

    #[test]
    fn test_require_unknown_plugin() {
        let registry = SourceRegistry::new();
        let error = registry.require("missing").err().unwrap();
        assert_eq!(error.plugin_id(), Some("missing"));
        assert!(error.message().contains("Unknown plugin"));
    }
}
