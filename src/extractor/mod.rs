// src/extractor/mod.rs

//! Page extractor embedded against the library site.
//!
//! Owns DOM-readiness polling, collection traversal and item extraction,
//! and serves data requests routed through the coordinator. All page
//! access goes through the `HostPage` adapter.

pub mod record;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::host::{DetailsPanel, HostPage, ItemRow};
use crate::models::{
    fallback_collection_id, BibliographicItem, Collection, ExtractorSettings,
};

/// Extractor lifecycle across one page lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorState {
    Uninitialized,
    WaitingForHost,
    /// Integrated and observing; the idle face between extractions
    Integrated,
    Extracting,
    Destroyed,
}

/// Snapshot of what the page currently shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentData {
    pub current_collection: Option<Collection>,
    /// All rendered rows of the current view, unenriched
    pub items: Vec<BibliographicItem>,
    pub selected_items: Vec<BibliographicItem>,
    pub total_items_count: usize,
    pub library_info: LibraryInfo,
}

/// Library-level display info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub name: String,
}

/// Full-library extraction result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryExport {
    pub items: Vec<BibliographicItem>,
    pub collections: Vec<Collection>,
    pub total_count: usize,
    pub export_date: DateTime<Utc>,
}

/// Seam for forwarding extractor-initiated exports up to the
/// coordinator without a network dependency in this component.
#[async_trait]
pub trait ExportUplink: Send + Sync {
    /// Stage items for a later user-driven export.
    async fn stage_export(&self, items: Vec<BibliographicItem>) -> Result<()>;
}

/// The page extractor.
pub struct PageExtractor {
    host: Arc<dyn HostPage>,
    settings: ExtractorSettings,
    uplink: Option<Arc<dyn ExportUplink>>,
    state: Mutex<ExtractorState>,
    // Cached current-data snapshot keyed by host generation; any page
    // mutation invalidates it.
    cache: Mutex<Option<(u64, CurrentData)>>,
}

impl PageExtractor {
    pub fn new(host: Arc<dyn HostPage>, settings: ExtractorSettings) -> Self {
        Self {
            host,
            settings,
            uplink: None,
            state: Mutex::new(ExtractorState::Uninitialized),
            cache: Mutex::new(None),
        }
    }

    /// Attach the coordinator-side uplink for `export_to_remote`.
    pub fn with_uplink(mut self, uplink: Arc<dyn ExportUplink>) -> Self {
        self.uplink = Some(uplink);
        self
    }

    pub fn state(&self) -> ExtractorState {
        *self.state.lock().expect("extractor state poisoned")
    }

    fn set_state(&self, state: ExtractorState) {
        *self.state.lock().expect("extractor state poisoned") = state;
    }

    fn ensure_integrated(&self) -> Result<()> {
        match self.state() {
            ExtractorState::Integrated | ExtractorState::Extracting => Ok(()),
            other => Err(AppError::extraction(format!(
                "page extractor is not integrated (state: {other:?})"
            ))),
        }
    }

    /// Wait for the host landmarks and integrate into the page.
    ///
    /// Polls for the collection tree and item list at a fixed interval
    /// within the attempt budget. On success the control toolbar is
    /// injected (idempotently) and the extractor starts observing; on
    /// exhaustion the extractor is destroyed and nothing on this page
    /// becomes available.
    pub async fn initialize(&self) -> Result<()> {
        match self.state() {
            ExtractorState::Uninitialized => {}
            ExtractorState::Integrated | ExtractorState::Extracting => {
                // Re-entry after navigation re-injection: just make sure
                // the toolbar is still there.
                self.host.inject_toolbar().await?;
                return Ok(());
            }
            ExtractorState::WaitingForHost => {
                return Err(AppError::extraction("host wait already in progress"));
            }
            ExtractorState::Destroyed => {
                return Err(AppError::extraction("page extractor was destroyed"));
            }
        }

        self.set_state(ExtractorState::WaitingForHost);
        let attempts = self.settings.host_poll_attempts;
        let interval = Duration::from_millis(self.settings.host_poll_interval_ms);

        for attempt in 1..=attempts {
            if self.host.landmarks_present().await {
                self.host.inject_toolbar().await?;
                self.set_state(ExtractorState::Integrated);
                log::info!("Host page ready after {attempt} attempt(s); extractor integrated");
                return Ok(());
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        self.set_state(ExtractorState::Destroyed);
        log::warn!("Host landmarks never appeared within {attempts} attempts");
        Err(AppError::HostTimeout { attempts })
    }

    /// Snapshot of the current collection, selection and counts.
    pub async fn current_data(&self) -> Result<CurrentData> {
        self.ensure_integrated()?;

        let generation = self.host.generation();
        if let Some((cached_gen, cached)) =
            self.cache.lock().expect("extractor cache poisoned").clone()
        {
            if cached_gen == generation {
                return Ok(cached);
            }
        }

        let current_collection = self
            .host
            .current_collection()
            .await?
            .map(|node| Collection {
                id: node.id.unwrap_or_else(fallback_collection_id),
                name: node.name,
                item_count: node.item_count,
            });
        let selected_items = self.selected_items().await?;
        let rows = self.host.item_rows().await?;
        let total_items_count = rows.len();
        let items = build_rows(&rows, None);
        let library_info = LibraryInfo {
            name: self.host.library_name().await,
        };

        let data = CurrentData {
            current_collection,
            items,
            selected_items,
            total_items_count,
            library_info,
        };
        *self.cache.lock().expect("extractor cache poisoned") = Some((generation, data.clone()));
        Ok(data)
    }

    /// Items currently marked selected in the page.
    ///
    /// A single selection is enriched from the details panel.
    pub async fn selected_items(&self) -> Result<Vec<BibliographicItem>> {
        self.ensure_integrated()?;
        let rows = self.host.selected_rows().await?;
        let panel = if rows.len() == 1 {
            self.host.details_panel().await?
        } else {
            None
        };
        Ok(build_rows(&rows, panel.as_ref()))
    }

    /// Traverse every visible collection and extract the whole library.
    pub async fn full_library(&self) -> Result<LibraryExport> {
        self.ensure_integrated()?;
        {
            let mut state = self.state.lock().expect("extractor state poisoned");
            if *state == ExtractorState::Extracting {
                return Err(AppError::extraction("library extraction already running"));
            }
            *state = ExtractorState::Extracting;
        }
        let result = self.collect_library().await;
        // Only flip back if teardown didn't race us
        {
            let mut state = self.state.lock().expect("extractor state poisoned");
            if *state == ExtractorState::Extracting {
                *state = ExtractorState::Integrated;
            }
        }
        result
    }

    async fn collect_library(&self) -> Result<LibraryExport> {
        let nodes = self.host.collection_nodes().await?;
        let mut items = Vec::new();
        let mut collections = Vec::new();

        for node in &nodes {
            if let Err(e) = self.host.activate_collection(node).await {
                log::warn!("Skipping collection '{}': activation failed: {e}", node.name);
                continue;
            }
            self.wait_for_items_loaded().await;

            let rows = match self.host.item_rows().await {
                Ok(rows) => rows,
                Err(e) => {
                    log::warn!("Skipping collection '{}': row read failed: {e}", node.name);
                    continue;
                }
            };

            let collection_id = node.id.clone().unwrap_or_else(fallback_collection_id);
            let mut built = build_rows(&rows, None);
            for item in &mut built {
                item.collections = vec![collection_id.clone()];
            }
            collections.push(Collection {
                id: collection_id,
                name: node.name.clone(),
                item_count: built.len(),
            });
            items.extend(built);
        }

        let items = record::dedupe(items);
        log::info!(
            "Extracted {} unique items across {} collections",
            items.len(),
            collections.len()
        );
        Ok(LibraryExport {
            total_count: items.len(),
            items,
            collections,
            export_date: Utc::now(),
        })
    }

    /// Bounded wait for the item list to finish repopulating.
    ///
    /// Proceeds optimistically when the budget runs out; a slow page
    /// yields whatever rows are rendered rather than a failure.
    async fn wait_for_items_loaded(&self) {
        let interval = Duration::from_millis(self.settings.load_poll_interval_ms);
        for _ in 0..self.settings.load_poll_attempts {
            if !self.host.is_loading().await {
                return;
            }
            tokio::time::sleep(interval).await;
        }
        log::debug!("Item list still loading after poll budget; using rendered rows");
    }

    /// Forward items upward for a user-driven export.
    pub async fn export_to_remote(&self, items: Vec<BibliographicItem>) -> Result<()> {
        self.ensure_integrated()?;
        match &self.uplink {
            Some(uplink) => uplink.stage_export(items).await,
            None => Err(AppError::config("no export uplink attached")),
        }
    }

    /// Tear down page integration. Deterministic and idempotent.
    pub async fn teardown(&self) {
        self.host.remove_toolbar().await;
        self.cache.lock().expect("extractor cache poisoned").take();
        self.set_state(ExtractorState::Destroyed);
    }
}

/// Build items from rows, dropping unreadable fragments. The details
/// panel only applies to rows flagged selected.
fn build_rows(rows: &[ItemRow], panel: Option<&DetailsPanel>) -> Vec<BibliographicItem> {
    rows.iter()
        .filter_map(|row| {
            let panel = if row.selected { panel } else { None };
            match record::build_item(row, panel) {
                Ok(item) => Some(item),
                Err(e) => {
                    log::warn!("Dropping unreadable item row: {e}");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{node, row, ScriptedHost};
    use crate::host::ItemRow;

    fn settings() -> ExtractorSettings {
        ExtractorSettings::default()
    }

    fn extractor(host: ScriptedHost) -> (Arc<ScriptedHost>, PageExtractor) {
        let host = Arc::new(host);
        let ex = PageExtractor::new(host.clone(), settings());
        (host, ex)
    }

    async fn integrated(host: ScriptedHost) -> (Arc<ScriptedHost>, PageExtractor) {
        let mut host = host;
        host.ready_at_attempt = 1;
        let (host, ex) = extractor(host);
        ex.initialize().await.unwrap();
        (host, ex)
    }

    #[tokio::test(start_paused = true)]
    async fn host_timeout_after_attempt_budget() {
        let (host, ex) = extractor(ScriptedHost::default()); // never ready
        let err = ex.initialize().await.unwrap_err();
        assert!(matches!(err, AppError::HostTimeout { attempts: 30 }));
        assert_eq!(host.readiness_polls(), 30);
        assert_eq!(ex.state(), ExtractorState::Destroyed);

        // Nothing on this page is available afterwards
        assert!(ex.current_data().await.is_err());
        assert!(ex.initialize().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn integrates_when_landmarks_appear_mid_budget() {
        let (host, ex) = extractor(ScriptedHost::ready_at(3));
        ex.initialize().await.unwrap();
        assert_eq!(ex.state(), ExtractorState::Integrated);
        assert_eq!(host.readiness_polls(), 3);
        assert!(host.toolbar_present());

        // Re-initialization keeps the toolbar without duplicating it
        ex.initialize().await.unwrap();
        assert_eq!(host.inject_calls(), 2);
        assert!(host.toolbar_present());
    }

    #[tokio::test(start_paused = true)]
    async fn full_library_dedupes_across_collections() {
        let mut host = ScriptedHost::ready();
        host.collections = vec![node(Some("C1"), "Papers", 3), node(None, "Drafts", 2)];
        host.rows_by_collection.insert(
            "Papers".to_string(),
            vec![
                row("A", "Doe, Jane", "2020"),
                row("B", "Curie, Marie", "2019"),
                row("C", "Einstein", "1950"),
            ],
        );
        host.rows_by_collection.insert(
            "Drafts".to_string(),
            vec![row("A", "Doe, Jane", "2020"), row("D", "Doe, Jane", "2022")],
        );

        let (_, ex) = integrated(host).await;
        let export = ex.full_library().await.unwrap();

        assert_eq!(export.total_count, 4); // 5 raw - 1 duplicate
        assert_eq!(export.items.len(), 4);
        assert_eq!(export.collections.len(), 2);
        assert_eq!(export.collections[0].id, "C1");
        assert!(export.collections[1].id.starts_with("col-"));
        assert_eq!(export.collections[0].item_count, 3);

        // First-seen wins: the duplicate "A" stays tagged with C1
        let a = export.items.iter().find(|i| i.title == "A").unwrap();
        assert_eq!(a.collections, vec!["C1".to_string()]);
        assert_eq!(ex.state(), ExtractorState::Integrated);
    }

    #[tokio::test(start_paused = true)]
    async fn full_library_proceeds_past_slow_loading() {
        let mut host = ScriptedHost::ready();
        host.collections = vec![node(Some("C1"), "Papers", 1)];
        host.rows_by_collection
            .insert("Papers".to_string(), vec![row("A", "Doe, J", "2020")]);
        // Indicator never clears within the 10-attempt budget
        host.loading_polls_per_activation = 50;

        let (_, ex) = integrated(host).await;
        let export = ex.full_library().await.unwrap();
        assert_eq!(export.total_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn selected_single_item_enriched_from_panel() {
        let mut host = ScriptedHost::ready();
        let mut selected = row("A Paper", "Doe, Jane", "2021");
        selected.selected = true;
        host.initial_rows = vec![selected, row("Other", "X", "2000")];
        host.panel = Some(DetailsPanel {
            abstract_text: "Summary.".to_string(),
            tags: vec!["physics".to_string()],
            fields: vec![("DOI".to_string(), "10.1/x".to_string())],
        });

        let (_, ex) = integrated(host).await;
        let items = ex.selected_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].abstract_note, "Summary.");
        assert_eq!(items[0].extra.get("doi").map(String::as_str), Some("10.1/x"));
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_rows_are_dropped_not_fatal() {
        let mut host = ScriptedHost::ready();
        host.initial_rows = vec![row("Good", "Doe, J", "2020"), ItemRow::default()];

        let (_, ex) = integrated(host).await;
        let data = ex.current_data().await.unwrap();
        assert_eq!(data.total_items_count, 2); // raw rows counted as rendered
        let items = ex.selected_items().await.unwrap();
        assert!(items.is_empty()); // nothing selected

        let export_rows = build_rows(
            &[row("Good", "Doe, J", "2020"), ItemRow::default()],
            None,
        );
        assert_eq!(export_rows.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn current_data_cache_invalidated_by_mutation() {
        let mut host = ScriptedHost::ready();
        host.initial_rows = vec![row("A", "Doe, J", "2020")];

        let (host, ex) = integrated(host).await;
        let first = ex.current_data().await.unwrap();
        let second = ex.current_data().await.unwrap();
        assert_eq!(first, second);
        let calls_after_cached = host.rows_calls();

        // A page mutation invalidates the snapshot
        host.bump_generation();
        let _third = ex.current_data().await.unwrap();
        assert!(host.rows_calls() > calls_after_cached);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_is_idempotent() {
        let (host, ex) = integrated(ScriptedHost::ready()).await;
        ex.teardown().await;
        ex.teardown().await;
        assert!(!host.toolbar_present());
        assert_eq!(ex.state(), ExtractorState::Destroyed);
        assert!(ex.current_data().await.is_err());
    }
}
