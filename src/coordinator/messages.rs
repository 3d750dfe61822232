// src/coordinator/messages.rs

//! Typed request/response messages for the coordinator.
//!
//! `Request` mirrors the wire protocol's `action`-tagged messages; the
//! tolerant JSON boundary lives in `CoordinatorHandle::dispatch_value`,
//! which resolves unknown actions as structured failures instead of
//! letting anything cross the message boundary as a panic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extractor::{CurrentData, LibraryExport};
use crate::models::{
    BibliographicItem, ConnectorConfig, ExportType, HealthProbe, ImportOutcome, ImportType,
    PendingExport, Project, SyncHistoryEntry,
};

/// A request routed through the coordinator's message loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// Probe a server and, per settings, commit it as active config
    TestConnection {
        #[serde(rename = "serverUrl")]
        server_url: String,
        #[serde(rename = "apiKey", default)]
        api_key: String,
    },
    GetProjects,
    UpdateConfig {
        config: ConnectorConfig,
    },
    ImportToRemote {
        #[serde(rename = "projectId")]
        project_id: String,
        items: Vec<BibliographicItem>,
        #[serde(rename = "importType")]
        import_type: ImportType,
    },
    ExportFromRemote {
        #[serde(rename = "projectId")]
        project_id: String,
        #[serde(rename = "exportType")]
        export_type: ExportType,
    },
    /// Stage items extracted in-page for a later user-driven export
    OpenPopupForExport {
        items: Vec<BibliographicItem>,
    },
    /// Read-once pickup of the staged export
    TakePendingExport,
    ViewItemInRemote {
        item: BibliographicItem,
    },
    /// Current page snapshot from the extractor
    #[serde(rename = "getZoteroData", alias = "getLibraryData")]
    GetLibraryData,
    GetSelectedItems,
    GetFullLibrary,
    GetConfig,
    GetSyncHistory,
    RunCleanup,
}

impl Request {
    /// Wire action names, for distinguishing unknown actions from
    /// malformed payloads at the JSON boundary.
    pub const KNOWN_ACTIONS: &'static [&'static str] = &[
        "testConnection",
        "getProjects",
        "updateConfig",
        "importToRemote",
        "exportFromRemote",
        "openPopupForExport",
        "takePendingExport",
        "viewItemInRemote",
        "getZoteroData",
        "getLibraryData",
        "getSelectedItems",
        "getFullLibrary",
        "getConfig",
        "getSyncHistory",
        "runCleanup",
    ];
}

/// A successful reply; the wire boundary folds `success: true` in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Probe(HealthProbe),
    Projects { projects: Vec<Project> },
    Imported(ImportOutcome),
    Exported { exported: Value },
    Pending { pending: Option<PendingExport> },
    CurrentData(CurrentData),
    Items { items: Vec<BibliographicItem> },
    Library(LibraryExport),
    Config { config: ConnectorConfig },
    History { history: Vec<SyncHistoryEntry> },
    Cleanup { removed: usize },
    Ack,
}
