//! Search session state: slots, ordering and the display filter.

use std::cmp::Ordering;

use serde::Serialize;

use crate::source::{NovelItem, PluginItem};

/// Results of one source for the active query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSlot {
    pub plugin: PluginItem,
    pub novels: Vec<NovelItem>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Position of the source in the session's query order. Stable across
    /// re-sorts, unlike the plugin id which two sources may share.
    #[serde(skip)]
    pub(crate) source_index: usize,
}

impl SearchSlot {
    #[must_use]
    pub(crate) fn loading(source_index: usize, plugin: PluginItem) -> Self {
        Self {
            source_index,
            plugin,
            novels: Vec::new(),
            is_loading: true,
            error: None,
        }
    }

    /// True once the source answered with at least one novel.
    #[must_use]
    pub fn has_results(&self) -> bool {
        !self.is_loading && self.error.is_none() && !self.novels.is_empty()
    }
}

/// Observable state of the search engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSnapshot {
    /// Token of the session these slots belong to.
    pub token: u64,
    /// Active query; `None` before the first search and after cancellation.
    pub query: Option<String>,
    pub slots: Vec<SearchSlot>,
    pub completed: usize,
    pub total: usize,
    /// `completed / total`, or 1 for a session without sources.
    pub progress: f64,
}

impl SearchSnapshot {
    /// Slots shown to the user, optionally hiding those without results.
    #[must_use]
    pub fn visible_slots(&self, hide_empty: bool) -> Vec<SearchSlot> {
        if hide_empty {
            self.slots
                .iter()
                .filter(|slot| slot.has_results())
                .cloned()
                .collect()
        } else {
            self.slots.clone()
        }
    }
}

pub(crate) fn compare_names(a: &PluginItem, b: &PluginItem) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
}

/// Slots with results first, alphabetical within each group.
pub(crate) fn sort_slots(slots: &mut [SearchSlot]) {
    slots.sort_by(|a, b| {
        a.novels
            .is_empty()
            .cmp(&b.novels.is_empty())
            .then_with(|| compare_names(&a.plugin, &b.plugin))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(name: &str, results: usize) -> SearchSlot {
        SearchSlot {
            plugin: PluginItem::new(name.to_lowercase(), name),
            novels: (0..results)
                .map(|i| NovelItem::new(format!("{name} {i}"), format!("/{i}")))
                .collect(),
            is_loading: false,
            error: None,
            source_index: 0,
        }
    }

    fn names(slots: &[SearchSlot]) -> Vec<&str> {
        slots.iter().map(|slot| slot.plugin.name.as_str()).collect()
    }

    #[test]
    fn test_sort_puts_results_first_then_alphabetical() {
        let mut slots = vec![
            slot("delta", 0),
            slot("Charlie", 2),
            slot("bravo", 0),
            slot("alpha", 1),
        ];
        sort_slots(&mut slots);
        assert_eq!(names(&slots), vec!["alpha", "Charlie", "bravo", "delta"]);
    }

    #[test]
    fn test_visible_slots_hides_loading_errors_and_empty() {
        let mut failed = slot("echo", 0);
        failed.error = Some("boom".to_string());
        let snapshot = SearchSnapshot {
            slots: vec![
                slot("alpha", 1),
                SearchSlot::loading(0, PluginItem::new("b", "bravo")),
                slot("charlie", 0),
                failed,
            ],
            ..SearchSnapshot::default()
        };
        assert_eq!(names(&snapshot.visible_slots(true)), vec!["alpha"]);
        assert_eq!(snapshot.visible_slots(false).len(), 4);
    }
}
