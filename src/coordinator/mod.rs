// src/coordinator/mod.rs

//! Background coordinator.
//!
//! Sole owner of the user configuration and sync history, sole network
//! caller for authenticated server operations, and message router
//! between the page extractor and the sync controller. All state
//! mutations flow through one mpsc loop, so read/modify/write cycles
//! never race.

pub mod messages;

pub use messages::{Request, Response};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::extractor::{ExportUplink, PageExtractor};
use crate::models::{
    BibliographicItem, ConnectorConfig, ExportType, HealthProbe, ImportType, PendingExport,
    Settings, SyncAction, SyncHistory, SyncHistoryEntry,
};
use crate::notify::{NotificationKind, NotificationSink};
use crate::remote::RemoteClient;
use crate::store::{read_typed, write_typed, Scope, StateStore};

/// Persisted state keys.
mod keys {
    pub const CONFIG: &str = "config";
    pub const FIRST_VISIT: &str = "firstVisitTimestamp";
    pub const SYNC_HISTORY: &str = "syncHistory";
    pub const PENDING_EXPORT: &str = "pendingExport";
}

/// Install/update lifecycle signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    Install,
    Update,
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupOutcome {
    pub history_removed: usize,
    pub pending_dropped: bool,
}

enum Command {
    Request(Request, oneshot::Sender<Result<Response>>),
    Installed(InstallKind, oneshot::Sender<()>),
    Navigation(String, oneshot::Sender<bool>),
    AttachExtractor(Arc<PageExtractor>, oneshot::Sender<()>),
    Cleanup(i64, oneshot::Sender<CleanupOutcome>),
}

/// Cloneable entry point into the coordinator's message loop.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    async fn command<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| AppError::channel("coordinator stopped"))?;
        reply_rx
            .await
            .map_err(|_| AppError::channel("coordinator dropped the reply"))
    }

    /// Send a request and wait for its reply.
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.command(|reply| Command::Request(request, reply))
            .await?
    }

    /// Tolerant JSON boundary: any well-formed value gets a structured
    /// `{success, ...}` reply; unknown actions never throw across it.
    pub async fn dispatch_value(&self, value: Value) -> Value {
        let action_known = value
            .get("action")
            .and_then(Value::as_str)
            .is_some_and(|action| Request::KNOWN_ACTIONS.contains(&action));
        let request: Request = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                let error = if action_known {
                    format!("bad request: {e}")
                } else {
                    "unknown action".to_string()
                };
                return json!({ "success": false, "error": error });
            }
        };

        match self.send(request).await {
            Ok(response) => {
                match serde_json::to_value(&response).unwrap_or(Value::Null) {
                    Value::Object(mut map) => {
                        map.insert("success".to_string(), Value::Bool(true));
                        Value::Object(map)
                    }
                    Value::Null => json!({ "success": true }),
                    other => json!({ "success": true, "data": other }),
                }
            }
            Err(e) => json!({ "success": false, "error": e.to_string() }),
        }
    }

    /// Signal an install or update of the connector.
    pub async fn installed(&self, kind: InstallKind) -> Result<()> {
        self.command(|reply| Command::Installed(kind, reply)).await
    }

    /// Signal a completed host navigation. Returns true when the URL is
    /// the library site and the extractor should be (re)injected.
    pub async fn navigation_completed(&self, url: &str) -> Result<bool> {
        self.command(|reply| Command::Navigation(url.to_string(), reply))
            .await
    }

    /// Attach the page extractor serving the data requests.
    pub async fn attach_extractor(&self, extractor: Arc<PageExtractor>) -> Result<()> {
        self.command(|reply| Command::AttachExtractor(extractor, reply))
            .await
    }

    /// Run the cleanup pass against an explicit clock.
    pub async fn run_cleanup_at(&self, now_ms: i64) -> Result<CleanupOutcome> {
        self.command(|reply| Command::Cleanup(now_ms, reply)).await
    }
}

#[async_trait]
impl ExportUplink for CoordinatorHandle {
    async fn stage_export(&self, items: Vec<BibliographicItem>) -> Result<()> {
        self.send(Request::OpenPopupForExport { items }).await?;
        Ok(())
    }
}

/// The long-lived coordinator service.
///
/// Constructed once per session with injected dependencies; `spawn`
/// moves it onto its message loop.
pub struct Coordinator {
    settings: Settings,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn NotificationSink>,
    extractor: Option<Arc<PageExtractor>>,
    library_url: Regex,
    config: ConnectorConfig,
    history: SyncHistory,
    pending_export: Option<PendingExport>,
}

impl Coordinator {
    /// Create a coordinator, loading persisted state from the store.
    pub async fn new(
        settings: Settings,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        settings.validate()?;
        let library_url = Regex::new(&settings.coordinator.library_url_pattern)
            .map_err(|e| AppError::config(format!("bad library URL pattern: {e}")))?;

        let config = read_typed(store.as_ref(), Scope::Synced, keys::CONFIG)
            .await
            .unwrap_or_else(|e| {
                log::warn!("Saved configuration unreadable: {e}. Starting fresh.");
                None
            })
            .unwrap_or_default();
        let history = read_typed(store.as_ref(), Scope::Local, keys::SYNC_HISTORY)
            .await
            .unwrap_or_else(|e| {
                log::warn!("Saved history unreadable: {e}. Starting fresh.");
                None
            })
            .unwrap_or_default();
        let pending_export = read_typed(store.as_ref(), Scope::Local, keys::PENDING_EXPORT)
            .await
            .unwrap_or_else(|e| {
                log::warn!("Pending export unreadable: {e}. Dropping it.");
                None
            });

        Ok(Self {
            settings,
            store,
            notifier,
            extractor: None,
            library_url,
            config,
            history,
            pending_export,
        })
    }

    /// Move the coordinator onto its message loop.
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let join = tokio::spawn(self.run(rx));
        (CoordinatorHandle { tx }, join)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Request(request, reply) => {
                    let response = self.handle_request(request).await;
                    if reply.send(response).is_err() {
                        log::debug!("Caller went away before the reply");
                    }
                }
                Command::Installed(kind, reply) => {
                    self.on_installed(kind);
                    let _ = reply.send(());
                }
                Command::Navigation(url, reply) => {
                    let inject = self.on_navigation(&url).await;
                    let _ = reply.send(inject);
                }
                Command::AttachExtractor(extractor, reply) => {
                    self.extractor = Some(extractor);
                    let _ = reply.send(());
                }
                Command::Cleanup(now_ms, reply) => {
                    let outcome = self.run_cleanup(now_ms).await;
                    let _ = reply.send(outcome);
                }
            }
        }
        log::info!("Coordinator stopped");
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn client(&self) -> Result<RemoteClient> {
        RemoteClient::from_config(&self.settings.http, &self.config)
    }

    /// Raise a failure notification and hand the error back for the
    /// caller's own state handling.
    fn fail(&self, title: &str, error: AppError) -> AppError {
        self.notifier
            .notify(NotificationKind::Failure, title, &error.to_string());
        error
    }

    fn extractor(&self) -> Result<&Arc<PageExtractor>> {
        self.extractor
            .as_ref()
            .ok_or_else(|| AppError::extraction("no page extractor attached"))
    }

    async fn save_config(&self) -> Result<()> {
        write_typed(self.store.as_ref(), Scope::Synced, keys::CONFIG, &self.config).await
    }

    async fn save_history(&self) -> Result<()> {
        write_typed(
            self.store.as_ref(),
            Scope::Local,
            keys::SYNC_HISTORY,
            &self.history,
        )
        .await
    }

    async fn handle_request(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::TestConnection {
                server_url,
                api_key,
            } => self.test_connection(server_url, api_key).await,
            Request::GetProjects => self.get_projects().await,
            Request::UpdateConfig { config } => self.update_config(config).await,
            Request::ImportToRemote {
                project_id,
                items,
                import_type,
            } => self.import_to_remote(project_id, items, import_type).await,
            Request::ExportFromRemote {
                project_id,
                export_type,
            } => self.export_from_remote(project_id, export_type).await,
            Request::OpenPopupForExport { items } => self.open_popup_for_export(items).await,
            Request::TakePendingExport => self.take_pending_export().await,
            Request::ViewItemInRemote { item } => self.view_item_in_remote(&item),
            Request::GetLibraryData => {
                Ok(Response::CurrentData(self.extractor()?.current_data().await?))
            }
            Request::GetSelectedItems => Ok(Response::Items {
                items: self.extractor()?.selected_items().await?,
            }),
            Request::GetFullLibrary => {
                Ok(Response::Library(self.extractor()?.full_library().await?))
            }
            Request::GetConfig => Ok(Response::Config {
                config: self.config.clone(),
            }),
            Request::GetSyncHistory => Ok(Response::History {
                history: self.history.entries().to_vec(),
            }),
            Request::RunCleanup => {
                let outcome = self.run_cleanup(Self::now_ms()).await;
                Ok(Response::Cleanup {
                    removed: outcome.history_removed,
                })
            }
        }
    }

    /// Probe a server; a reachable healthy server commits the probed
    /// URL/key as the active configuration when settings say so.
    async fn test_connection(&mut self, server_url: String, api_key: String) -> Result<Response> {
        let client = match RemoteClient::new(&self.settings.http, &server_url, &api_key) {
            Ok(client) => client,
            Err(e) => return Ok(Response::Probe(HealthProbe::failed(0, e.to_string()))),
        };

        let probe = client.health().await;
        if probe.connected && self.settings.coordinator.commit_probed_config {
            self.config.server_url = server_url.trim_end_matches('/').to_string();
            self.config.api_key = api_key;
            self.save_config().await?;
            log::info!("Connection verified; server configuration committed");
        }
        Ok(Response::Probe(probe))
    }

    async fn get_projects(&self) -> Result<Response> {
        let client = self
            .client()
            .map_err(|e| self.fail("Loading projects failed", e))?;
        match client.projects().await {
            Ok(projects) => Ok(Response::Projects { projects }),
            Err(e) => Err(self.fail("Loading projects failed", e)),
        }
    }

    async fn update_config(&mut self, mut config: ConnectorConfig) -> Result<Response> {
        config.server_url = config.normalized_server_url().to_string();
        self.config = config;
        self.save_config().await?;
        self.notifier.notify(
            NotificationKind::Success,
            "Settings saved",
            "AnalyLit connection settings updated",
        );
        Ok(Response::Ack)
    }

    async fn import_to_remote(
        &mut self,
        project_id: String,
        items: Vec<BibliographicItem>,
        import_type: ImportType,
    ) -> Result<Response> {
        let client = self.client().map_err(|e| self.fail("Import failed", e))?;
        let sent = items.len();

        match client.import_items(&project_id, &items, import_type).await {
            Ok(outcome) => {
                let count = if outcome.imported > 0 {
                    outcome.imported
                } else {
                    sent
                };
                self.record(SyncAction::Import, import_type.label(), count)
                    .await?;
                self.config.last_project_id = Some(project_id);
                self.save_config().await?;
                Ok(Response::Imported(outcome))
            }
            Err(e) => Err(self.fail("Import failed", e)),
        }
    }

    async fn export_from_remote(
        &mut self,
        project_id: String,
        export_type: ExportType,
    ) -> Result<Response> {
        let client = self.client().map_err(|e| self.fail("Export failed", e))?;
        match client.export(&project_id, export_type).await {
            Ok(data) => {
                let count = RemoteClient::exported_count(&data);
                self.record(SyncAction::Export, export_type.label(), count)
                    .await?;
                self.config.last_project_id = Some(project_id);
                self.save_config().await?;
                Ok(Response::Exported { exported: data })
            }
            Err(e) => Err(self.fail("Export failed", e)),
        }
    }

    /// Append a history entry and raise the success notification.
    async fn record(&mut self, action: SyncAction, kind: &str, count: usize) -> Result<()> {
        let entry = SyncHistoryEntry::new(action, kind, count, Self::now_ms());
        let description = entry.description.clone();
        self.history.push(entry);
        self.save_history().await?;
        let title = match action {
            SyncAction::Import => "Import complete",
            SyncAction::Export => "Export complete",
        };
        self.notifier
            .notify(NotificationKind::Success, title, &description);
        Ok(())
    }

    async fn open_popup_for_export(&mut self, items: Vec<BibliographicItem>) -> Result<Response> {
        let pending = PendingExport::new(items, Self::now_ms());
        let count = pending.items.len();
        write_typed(
            self.store.as_ref(),
            Scope::Local,
            keys::PENDING_EXPORT,
            &pending,
        )
        .await?;
        self.pending_export = Some(pending);
        self.notifier.notify(
            NotificationKind::Info,
            "Export ready",
            &format!("{count} items staged for export"),
        );
        Ok(Response::Ack)
    }

    /// Read-once pickup: taking the staged export removes it.
    async fn take_pending_export(&mut self) -> Result<Response> {
        let pending = self.pending_export.take();
        if pending.is_some() {
            self.store
                .remove(Scope::Local, keys::PENDING_EXPORT)
                .await?;
        }
        Ok(Response::Pending { pending })
    }

    fn view_item_in_remote(&self, item: &BibliographicItem) -> Result<Response> {
        let client = self
            .client()
            .map_err(|e| self.fail("Opening AnalyLit failed", e))?;
        self.notifier
            .open_surface(&client.search_view_url(&item.title));
        Ok(Response::Ack)
    }

    /// One-shot install/update notifications, keyed off the explicit
    /// signal.
    fn on_installed(&self, kind: InstallKind) {
        match kind {
            InstallKind::Install => {
                self.notifier.notify(
                    NotificationKind::Welcome,
                    "Welcome to AnalyLit Connector",
                    "Open your library to start sending items for analysis.",
                );
                if self.config.is_configured() {
                    self.notifier.open_surface(&format!(
                        "{}/welcome",
                        self.config.normalized_server_url()
                    ));
                }
            }
            InstallKind::Update => {
                self.notifier.notify(
                    NotificationKind::Info,
                    "AnalyLit Connector updated",
                    "The connector was updated to a new version.",
                );
            }
        }
    }

    /// React to a completed host navigation: report whether the
    /// extractor should be (re)injected and raise the first-visit
    /// notification exactly once per profile.
    async fn on_navigation(&mut self, url: &str) -> bool {
        if !self.library_url.is_match(url) {
            return false;
        }

        let first_visit: Option<i64> =
            read_typed(self.store.as_ref(), Scope::Local, keys::FIRST_VISIT)
                .await
                .unwrap_or_else(|e| {
                    log::warn!("First-visit flag unreadable: {e}");
                    None
                });
        if first_visit.is_none() {
            if let Err(e) = write_typed(
                self.store.as_ref(),
                Scope::Local,
                keys::FIRST_VISIT,
                &Self::now_ms(),
            )
            .await
            {
                log::warn!("Could not persist first-visit flag: {e}");
            }
            self.notifier.notify(
                NotificationKind::Info,
                "AnalyLit found your library",
                "Use the toolbar button to send items for analysis.",
            );
        }
        true
    }

    /// Periodic cleanup: garbage-collect a stale pending export and
    /// prune old history. A no-op when nothing qualifies.
    async fn run_cleanup(&mut self, now_ms: i64) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();

        outcome.history_removed = self.history.prune_older_than(now_ms);
        if outcome.history_removed > 0 {
            if let Err(e) = self.save_history().await {
                log::warn!("Could not persist pruned history: {e}");
            }
        }

        if let Some(pending) = &self.pending_export {
            if pending.is_expired(now_ms) {
                self.pending_export = None;
                if let Err(e) = self.store.remove(Scope::Local, keys::PENDING_EXPORT).await {
                    log::warn!("Could not remove expired pending export: {e}");
                }
                outcome.pending_dropped = true;
            }
        }

        if outcome.history_removed > 0 || outcome.pending_dropped {
            log::info!(
                "Cleanup: {} history entries pruned, pending export dropped: {}",
                outcome.history_removed,
                outcome.pending_dropped
            );
        }
        outcome
    }
}

/// Schedule the daily cleanup pass on a spawned task.
pub fn spawn_cleanup_task(handle: CoordinatorHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so the cadence
        // starts one interval from now.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match handle.run_cleanup_at(Coordinator::now_ms()).await {
                Ok(_) => {}
                Err(_) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExtractorState;
    use crate::host::testing::{node, row, ScriptedHost};
    use crate::models::ItemType;
    use crate::notify::MemoryNotifier;
    use crate::store::MemoryStore;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        handle: CoordinatorHandle,
        store: Arc<MemoryStore>,
        notifier: Arc<MemoryNotifier>,
    }

    async fn fixture_with(settings: Settings, store: Arc<MemoryStore>) -> Fixture {
        let notifier = Arc::new(MemoryNotifier::new());
        let coordinator = Coordinator::new(settings, store.clone(), notifier.clone())
            .await
            .unwrap();
        let (handle, _join) = coordinator.spawn();
        Fixture {
            handle,
            store,
            notifier,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Settings::default(), Arc::new(MemoryStore::new())).await
    }

    async fn configured_fixture(server: &MockServer) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        write_typed(
            store.as_ref(),
            Scope::Synced,
            keys::CONFIG,
            &ConnectorConfig::new(server.uri(), "key"),
        )
        .await
        .unwrap();
        fixture_with(Settings::default(), store).await
    }

    fn items(n: usize) -> Vec<BibliographicItem> {
        (0..n)
            .map(|i| BibliographicItem::new(format!("Item {i}"), ItemType::Document))
            .collect()
    }

    #[tokio::test]
    async fn unknown_action_resolves_failure_without_panicking() {
        let fx = fixture().await;
        let reply = fx
            .handle
            .dispatch_value(json!({"action": "selfDestruct"}))
            .await;
        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"], "unknown action");

        // Malformed payload of a known action is a failure too, but a
        // distinguishable one
        let reply = fx
            .handle
            .dispatch_value(json!({"action": "importToRemote"}))
            .await;
        assert_eq!(reply["success"], false);
        assert_ne!(reply["error"], "unknown action");

        // And no action at all
        let reply = fx.handle.dispatch_value(json!({"items": []})).await;
        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"], "unknown action");
    }

    #[tokio::test]
    async fn test_connection_commits_config_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fx = fixture().await;
        let url = format!("{}/", server.uri());
        let response = fx
            .handle
            .send(Request::TestConnection {
                server_url: url,
                api_key: "key".to_string(),
            })
            .await
            .unwrap();
        let Response::Probe(probe) = response else {
            panic!("expected probe");
        };
        assert!(probe.connected);

        let saved: Option<ConnectorConfig> =
            read_typed(fx.store.as_ref(), Scope::Synced, keys::CONFIG)
                .await
                .unwrap();
        let saved = saved.unwrap();
        assert_eq!(saved.server_url, server.uri());
        assert_eq!(saved.api_key, "key");
    }

    #[tokio::test]
    async fn test_connection_does_not_commit_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fx = fixture().await;
        let response = fx
            .handle
            .send(Request::TestConnection {
                server_url: server.uri(),
                api_key: "key".to_string(),
            })
            .await
            .unwrap();
        let Response::Probe(probe) = response else {
            panic!("expected probe");
        };
        assert!(!probe.connected);
        assert_eq!(probe.status, 500);

        let saved: Option<ConnectorConfig> =
            read_typed(fx.store.as_ref(), Scope::Synced, keys::CONFIG)
                .await
                .unwrap();
        assert!(saved.is_none());
    }

    #[tokio::test]
    async fn test_connection_commit_can_be_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut settings = Settings::default();
        settings.coordinator.commit_probed_config = false;
        let fx = fixture_with(settings, Arc::new(MemoryStore::new())).await;

        let response = fx
            .handle
            .send(Request::TestConnection {
                server_url: server.uri(),
                api_key: "key".to_string(),
            })
            .await
            .unwrap();
        let Response::Probe(probe) = response else {
            panic!("expected probe");
        };
        assert!(probe.connected);

        // Probe succeeded, but nothing was committed
        let saved: Option<ConnectorConfig> =
            read_typed(fx.store.as_ref(), Scope::Synced, keys::CONFIG)
                .await
                .unwrap();
        assert!(saved.is_none());
    }

    #[tokio::test]
    async fn import_records_history_and_notifies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/projects/p1/import-zotero"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"imported": 3})))
            .mount(&server)
            .await;

        let fx = configured_fixture(&server).await;
        let response = fx
            .handle
            .send(Request::ImportToRemote {
                project_id: "p1".to_string(),
                items: items(3),
                import_type: ImportType::Selected,
            })
            .await
            .unwrap();
        let Response::Imported(outcome) = response else {
            panic!("expected outcome");
        };
        assert_eq!(outcome.imported, 3);

        let Response::History { history } =
            fx.handle.send(Request::GetSyncHistory).await.unwrap()
        else {
            panic!("expected history");
        };
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].description, "Imported 3 selected items");

        let notifications = fx.notifier.notifications();
        assert!(notifications
            .iter()
            .any(|(kind, title, _)| *kind == NotificationKind::Success
                && title == "Import complete"));

        // A successful import remembers the project
        let Response::Config { config } = fx.handle.send(Request::GetConfig).await.unwrap()
        else {
            panic!("expected config");
        };
        assert_eq!(config.last_project_id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn import_failure_notifies_and_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/projects/p1/import-zotero"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let fx = configured_fixture(&server).await;
        let err = fx
            .handle
            .send(Request::ImportToRemote {
                project_id: "p1".to_string(),
                items: items(1),
                import_type: ImportType::Library,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Http { status: 502, .. }));

        let notifications = fx.notifier.notifications();
        assert!(notifications
            .iter()
            .any(|(kind, title, _)| *kind == NotificationKind::Failure
                && title == "Import failed"));

        // Nothing recorded on failure
        let Response::History { history } =
            fx.handle.send(Request::GetSyncHistory).await.unwrap()
        else {
            panic!("expected history");
        };
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn network_ops_blocked_without_config() {
        let fx = fixture().await;
        let err = fx.handle.send(Request::GetProjects).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(fx
            .notifier
            .notifications()
            .iter()
            .any(|(kind, _, _)| *kind == NotificationKind::Failure));
    }

    #[tokio::test]
    async fn staged_export_is_read_once() {
        let fx = fixture().await;
        fx.handle.stage_export(items(2)).await.unwrap();

        let Response::Pending { pending } =
            fx.handle.send(Request::TakePendingExport).await.unwrap()
        else {
            panic!("expected pending");
        };
        assert_eq!(pending.unwrap().items.len(), 2);

        let Response::Pending { pending } =
            fx.handle.send(Request::TakePendingExport).await.unwrap()
        else {
            panic!("expected pending");
        };
        assert!(pending.is_none());
    }

    #[tokio::test]
    async fn view_item_opens_search_surface() {
        let server = MockServer::start().await;
        let fx = configured_fixture(&server).await;
        let mut item = BibliographicItem::new("deep learning", ItemType::Document);
        item.date = "2024".to_string();

        fx.handle
            .send(Request::ViewItemInRemote { item })
            .await
            .unwrap();
        let surfaces = fx.notifier.surfaces();
        assert_eq!(surfaces.len(), 1);
        assert_eq!(surfaces[0], format!("{}/search?q=deep+learning", server.uri()));
    }

    #[tokio::test]
    async fn cleanup_drops_expired_pending_and_old_history() {
        let store = Arc::new(MemoryStore::new());
        let now = 10 * SyncHistory::RETENTION_MS;

        let mut history = SyncHistory::default();
        history.push(SyncHistoryEntry::new(SyncAction::Import, "x", 1, 1000)); // ancient
        history.push(SyncHistoryEntry::new(SyncAction::Import, "x", 1, now - 1000));
        write_typed(store.as_ref(), Scope::Local, keys::SYNC_HISTORY, &history)
            .await
            .unwrap();
        write_typed(
            store.as_ref(),
            Scope::Local,
            keys::PENDING_EXPORT,
            &PendingExport::new(items(1), now - PendingExport::EXPIRY_MS - 1),
        )
        .await
        .unwrap();

        let fx = fixture_with(Settings::default(), store).await;
        let outcome = fx.handle.run_cleanup_at(now).await.unwrap();
        assert_eq!(outcome.history_removed, 1);
        assert!(outcome.pending_dropped);

        // A second pass is a no-op
        let outcome = fx.handle.run_cleanup_at(now).await.unwrap();
        assert_eq!(outcome, CleanupOutcome::default());

        // The fresh pending export from a later staging survives
        fx.handle.stage_export(items(1)).await.unwrap();
        let outcome = fx
            .handle
            .run_cleanup_at(Coordinator::now_ms() + 1000)
            .await
            .unwrap();
        assert!(!outcome.pending_dropped);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_cleanup_keeps_ticking() {
        let fx = fixture().await;
        let task = spawn_cleanup_task(fx.handle.clone(), Duration::from_secs(86_400));

        // Two full days of paused time; the pass is a no-op on an empty
        // profile and the task must survive it
        tokio::time::sleep(Duration::from_secs(2 * 86_400 + 60)).await;
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn navigation_detects_library_and_notifies_first_visit_once() {
        let fx = fixture().await;
        assert!(!fx
            .handle
            .navigation_completed("https://news.example.org/")
            .await
            .unwrap());

        assert!(fx
            .handle
            .navigation_completed("https://www.zotero.org/mylib/library")
            .await
            .unwrap());
        assert!(fx
            .handle
            .navigation_completed("https://www.zotero.org/mylib/library")
            .await
            .unwrap());

        let first_visits = fx
            .notifier
            .notifications()
            .iter()
            .filter(|(_, title, _)| title == "AnalyLit found your library")
            .count();
        assert_eq!(first_visits, 1);
    }

    #[tokio::test]
    async fn install_and_update_signals_are_one_shot_notifications() {
        let fx = fixture().await;
        fx.handle.installed(InstallKind::Install).await.unwrap();
        fx.handle.installed(InstallKind::Update).await.unwrap();

        let notifications = fx.notifier.notifications();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].0, NotificationKind::Welcome);
        assert_eq!(notifications[1].0, NotificationKind::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn extraction_requests_route_to_attached_extractor() {
        let mut host = ScriptedHost::ready();
        host.collections = vec![node(Some("C1"), "Papers", 1)];
        host.rows_by_collection
            .insert("Papers".to_string(), vec![row("A", "Doe, J", "2020")]);
        let extractor = Arc::new(crate::extractor::PageExtractor::new(
            Arc::new(host),
            Default::default(),
        ));
        extractor.initialize().await.unwrap();
        assert_eq!(extractor.state(), ExtractorState::Integrated);

        let fx = fixture().await;

        // Without an extractor the request fails across the boundary,
        // structured, not a panic
        let reply = fx
            .handle
            .dispatch_value(json!({"action": "getFullLibrary"}))
            .await;
        assert_eq!(reply["success"], false);

        fx.handle.attach_extractor(extractor).await.unwrap();
        let Response::Library(export) =
            fx.handle.send(Request::GetFullLibrary).await.unwrap()
        else {
            panic!("expected library");
        };
        assert_eq!(export.total_count, 1);
    }
}
