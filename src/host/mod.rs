// src/host/mod.rs

//! Host-page adapter for the library site.
//!
//! The page extractor never touches the DOM directly; it goes through
//! the `HostPage` trait, which owns every selector heuristic and the
//! simulated interactions (collection activation, toolbar injection).
//! `DomHost` is the production implementation; tests script their own.

mod dom;
mod selectors;

pub use dom::DomHost;
pub use selectors::HostSelectors;

use async_trait::async_trait;

use crate::error::Result;

/// A collection node read from the host's collection tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNode {
    /// Id the page exposes, when it exposes one
    pub id: Option<String>,
    pub name: String,
    pub item_count: usize,
    /// Activation target (resolved on click simulation)
    pub href: String,
}

/// A raw item row as rendered in the host's item list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemRow {
    pub title: String,
    /// Unparsed creator string, e.g. "Doe, Jane; Einstein"
    pub creators: String,
    pub date: String,
    /// Host-side type label, e.g. "journalArticle" or "Journal Article"
    pub type_label: String,
    pub url: String,
    pub selected: bool,
}

/// The details panel rendered for the focused item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailsPanel {
    pub abstract_text: String,
    pub tags: Vec<String>,
    /// Labelled fields in DOM order
    pub fields: Vec<(String, String)>,
}

impl DetailsPanel {
    /// First field whose label matches any candidate, case-insensitively.
    pub fn field_by_candidates(&self, candidates: &[&str]) -> Option<&str> {
        for candidate in candidates {
            if let Some((_, value)) = self
                .fields
                .iter()
                .find(|(label, _)| label.eq_ignore_ascii_case(candidate))
            {
                return Some(value.as_str());
            }
        }
        None
    }
}

/// Read/interact surface over the library site's rendered page.
///
/// Reads reflect whatever the page currently shows; `generation()` is a
/// monotonic counter the implementation bumps whenever the page content
/// it reports may have changed, standing in for a DOM mutation observer.
#[async_trait]
pub trait HostPage: Send + Sync {
    /// True when both landmark elements (collection tree and item list)
    /// are present.
    async fn landmarks_present(&self) -> bool;

    /// Display name of the library being shown.
    async fn library_name(&self) -> String;

    /// All collection nodes visible in the tree.
    async fn collection_nodes(&self) -> Result<Vec<CollectionNode>>;

    /// The currently active collection node, if any.
    async fn current_collection(&self) -> Result<Option<CollectionNode>>;

    /// All currently rendered item rows.
    async fn item_rows(&self) -> Result<Vec<ItemRow>>;

    /// Item rows currently marked selected.
    async fn selected_rows(&self) -> Result<Vec<ItemRow>>;

    /// The details panel for the focused item, when rendered.
    async fn details_panel(&self) -> Result<Option<DetailsPanel>>;

    /// Simulate activating (clicking) a collection node.
    async fn activate_collection(&self, node: &CollectionNode) -> Result<()>;

    /// True while the item list is still repopulating.
    async fn is_loading(&self) -> bool;

    /// Inject the connector's toolbar marker. Idempotent: returns false
    /// when the marker is already present.
    async fn inject_toolbar(&self) -> Result<bool>;

    /// Remove the injected toolbar marker. Harmless when absent.
    async fn remove_toolbar(&self);

    /// Monotonic counter of observed page mutations.
    fn generation(&self) -> u64;
}

#[cfg(test)]
pub mod testing {
    //! Scripted host for extractor and coordinator tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{CollectionNode, DetailsPanel, HostPage, ItemRow};
    use crate::error::Result;

    /// Convenience row constructor.
    pub fn row(title: &str, creators: &str, date: &str) -> ItemRow {
        ItemRow {
            title: title.to_string(),
            creators: creators.to_string(),
            date: date.to_string(),
            type_label: "journalArticle".to_string(),
            url: format!("https://library.example/items/{title}"),
            selected: false,
        }
    }

    /// Convenience node constructor.
    pub fn node(id: Option<&str>, name: &str, count: usize) -> CollectionNode {
        CollectionNode {
            id: id.map(str::to_string),
            name: name.to_string(),
            item_count: count,
            href: format!("/collections/{name}"),
        }
    }

    /// A host whose behavior is fully scripted by the test.
    #[derive(Default)]
    pub struct ScriptedHost {
        /// `landmarks_present` turns true starting at this poll attempt
        /// (1-based); 0 means never.
        pub ready_at_attempt: u32,
        readiness_polls: AtomicU32,

        pub collections: Vec<CollectionNode>,
        /// Rows rendered per collection name once activated
        pub rows_by_collection: HashMap<String, Vec<ItemRow>>,
        /// Rows rendered before any activation
        pub initial_rows: Vec<ItemRow>,
        pub panel: Option<DetailsPanel>,

        /// How many `is_loading` polls report true after each activation
        pub loading_polls_per_activation: u32,
        loading_left: AtomicU32,

        active: Mutex<Option<String>>,
        generation: AtomicU64,
        toolbar: AtomicBool,
        inject_calls: AtomicU32,
        rows_calls: AtomicU32,
    }

    impl ScriptedHost {
        pub fn ready() -> Self {
            Self::ready_at(1)
        }

        pub fn ready_at(attempt: u32) -> Self {
            Self {
                ready_at_attempt: attempt,
                ..Self::default()
            }
        }

        pub fn readiness_polls(&self) -> u32 {
            self.readiness_polls.load(Ordering::SeqCst)
        }

        pub fn inject_calls(&self) -> u32 {
            self.inject_calls.load(Ordering::SeqCst)
        }

        pub fn rows_calls(&self) -> u32 {
            self.rows_calls.load(Ordering::SeqCst)
        }

        pub fn toolbar_present(&self) -> bool {
            self.toolbar.load(Ordering::SeqCst)
        }

        pub fn bump_generation(&self) {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        fn active_rows(&self) -> Vec<ItemRow> {
            let active = self.active.lock().expect("host poisoned");
            match active.as_deref() {
                Some(name) => self
                    .rows_by_collection
                    .get(name)
                    .cloned()
                    .unwrap_or_default(),
                None => self.initial_rows.clone(),
            }
        }
    }

    #[async_trait]
    impl HostPage for ScriptedHost {
        async fn landmarks_present(&self) -> bool {
            let polls = self.readiness_polls.fetch_add(1, Ordering::SeqCst) + 1;
            self.ready_at_attempt != 0 && polls >= self.ready_at_attempt
        }

        async fn library_name(&self) -> String {
            "Scripted Library".to_string()
        }

        async fn collection_nodes(&self) -> Result<Vec<CollectionNode>> {
            Ok(self.collections.clone())
        }

        async fn current_collection(&self) -> Result<Option<CollectionNode>> {
            let active = self.active.lock().expect("host poisoned");
            Ok(active.as_deref().and_then(|name| {
                self.collections.iter().find(|c| c.name == name).cloned()
            }))
        }

        async fn item_rows(&self) -> Result<Vec<ItemRow>> {
            self.rows_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.active_rows())
        }

        async fn selected_rows(&self) -> Result<Vec<ItemRow>> {
            Ok(self.active_rows().into_iter().filter(|r| r.selected).collect())
        }

        async fn details_panel(&self) -> Result<Option<DetailsPanel>> {
            Ok(self.panel.clone())
        }

        async fn activate_collection(&self, node: &CollectionNode) -> Result<()> {
            *self.active.lock().expect("host poisoned") = Some(node.name.clone());
            self.loading_left
                .store(self.loading_polls_per_activation, Ordering::SeqCst);
            self.bump_generation();
            Ok(())
        }

        async fn is_loading(&self) -> bool {
            let left = self.loading_left.load(Ordering::SeqCst);
            if left > 0 {
                self.loading_left.store(left - 1, Ordering::SeqCst);
                true
            } else {
                false
            }
        }

        async fn inject_toolbar(&self) -> Result<bool> {
            self.inject_calls.fetch_add(1, Ordering::SeqCst);
            Ok(!self.toolbar.swap(true, Ordering::SeqCst))
        }

        async fn remove_toolbar(&self) {
            self.toolbar.store(false, Ordering::SeqCst);
        }

        fn generation(&self) -> u64 {
            self.generation.load(Ordering::SeqCst)
        }
    }
}
