// src/controller/mod.rs

//! User-facing sync controller.
//!
//! Orchestrates user-triggered import/export operations against the
//! coordinator, drives the connection indicator and progress state, and
//! holds the abortable handle for the in-flight operation. Every
//! operation is stamped with a sequence number; responses landing after
//! the sequence moved (project switch, cancel) are discarded instead of
//! clobbering state.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::future;
use serde_json::Value;
use tokio::task::AbortHandle;

use crate::coordinator::{CoordinatorHandle, Request, Response};
use crate::error::{AppError, Result};
use crate::extractor::CurrentData;
use crate::models::{
    ConnectorConfig, ExportType, HealthProbe, ImportOutcome, ImportType, Project,
    SyncHistoryEntry,
};
use crate::notify::{NotificationKind, NotificationSink};

/// Three-state connection indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionIndicator {
    #[default]
    Pending,
    Connected,
    Disconnected,
}

/// Seam for the confirmation prompt an import presents.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    /// Ask the user to confirm; false abandons the operation.
    async fn confirm(&self, message: &str) -> bool;
}

/// Prompt that always answers the same way (headless runs, tests).
pub struct AutoConfirm(pub bool);

#[async_trait]
impl ConfirmPrompt for AutoConfirm {
    async fn confirm(&self, _message: &str) -> bool {
        self.0
    }
}

#[derive(Default)]
struct ControllerState {
    config: ConnectorConfig,
    indicator: ConnectionIndicator,
    projects: Vec<Project>,
    active_project: Option<Project>,
    page_data: Option<CurrentData>,
    history: Vec<SyncHistoryEntry>,
    /// Advances on every started operation, project switch and cancel;
    /// an operation whose stamp no longer matches is stale.
    op_seq: u64,
    /// The in-flight operation's stamp and abort handle
    current_op: Option<(u64, AbortHandle)>,
    progress_visible: bool,
}

/// The sync controller.
pub struct SyncController {
    coordinator: CoordinatorHandle,
    notifier: Arc<dyn NotificationSink>,
    prompt: Arc<dyn ConfirmPrompt>,
    downloads_dir: PathBuf,
    state: Mutex<ControllerState>,
}

impl SyncController {
    pub fn new(
        coordinator: CoordinatorHandle,
        notifier: Arc<dyn NotificationSink>,
        prompt: Arc<dyn ConfirmPrompt>,
        downloads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            coordinator,
            notifier,
            prompt,
            downloads_dir: downloads_dir.into(),
            state: Mutex::new(ControllerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        self.state.lock().expect("controller state poisoned")
    }

    pub fn indicator(&self) -> ConnectionIndicator {
        self.lock().indicator
    }

    pub fn projects(&self) -> Vec<Project> {
        self.lock().projects.clone()
    }

    pub fn active_project(&self) -> Option<Project> {
        self.lock().active_project.clone()
    }

    pub fn page_data(&self) -> Option<CurrentData> {
        self.lock().page_data.clone()
    }

    pub fn history(&self) -> Vec<SyncHistoryEntry> {
        self.lock().history.clone()
    }

    pub fn progress_visible(&self) -> bool {
        self.lock().progress_visible
    }

    fn set_indicator(&self, indicator: ConnectionIndicator) {
        self.lock().indicator = indicator;
    }

    /// Probe the server and, when it answers, unlock the operating view.
    ///
    /// This is the single entry point that makes the data-dependent
    /// actions available.
    pub async fn test_connection(&self, server_url: &str, api_key: &str) -> Result<HealthProbe> {
        self.set_indicator(ConnectionIndicator::Pending);
        let response = self
            .coordinator
            .send(Request::TestConnection {
                server_url: server_url.to_string(),
                api_key: api_key.to_string(),
            })
            .await?;
        let Response::Probe(probe) = response else {
            return Err(AppError::channel("unexpected reply to testConnection"));
        };

        if probe.connected {
            self.set_indicator(ConnectionIndicator::Connected);
            self.initialize_view().await?;
        } else {
            self.set_indicator(ConnectionIndicator::Disconnected);
        }
        Ok(probe)
    }

    /// Load projects, current page data and history after a successful
    /// probe.
    async fn initialize_view(&self) -> Result<()> {
        let (projects_reply, config_reply, history_reply, page_reply) = future::join4(
            self.coordinator.send(Request::GetProjects),
            self.coordinator.send(Request::GetConfig),
            self.coordinator.send(Request::GetSyncHistory),
            self.coordinator.send(Request::GetLibraryData),
        )
        .await;

        let Response::Projects { projects } = projects_reply? else {
            return Err(AppError::channel("unexpected reply to getProjects"));
        };
        let Response::Config { config } = config_reply? else {
            return Err(AppError::channel("unexpected reply to getConfig"));
        };
        let Response::History { history } = history_reply? else {
            return Err(AppError::channel("unexpected reply to getSyncHistory"));
        };

        // The page may simply not be open; that only disables the
        // page-sourced imports.
        let page_data = match page_reply {
            Ok(Response::CurrentData(data)) => Some(data),
            Ok(_) => None,
            Err(e) => {
                log::debug!("No page data available: {e}");
                None
            }
        };

        let active_project = config.last_project_id.as_ref().and_then(|id| {
            projects.iter().find(|p| &p.id == id).cloned()
        });

        let mut state = self.lock();
        state.projects = projects;
        state.active_project = active_project;
        state.page_data = page_data;
        state.history = history;
        state.config = config;
        Ok(())
    }

    /// Make a project the target of subsequent operations. Switching
    /// projects invalidates any in-flight operation's response.
    pub fn select_project(&self, project: Project) {
        let mut state = self.lock();
        state.active_project = Some(project);
        state.op_seq += 1;
    }

    /// Re-pull history and the config mirror after a completed
    /// operation.
    async fn refresh_after_operation(&self) -> Result<()> {
        let Response::History { history } =
            self.coordinator.send(Request::GetSyncHistory).await?
        else {
            return Err(AppError::channel("unexpected reply to getSyncHistory"));
        };
        let Response::Config { config } = self.coordinator.send(Request::GetConfig).await? else {
            return Err(AppError::channel("unexpected reply to getConfig"));
        };
        let mut state = self.lock();
        state.history = history;
        state.config = config;
        Ok(())
    }

    /// Start a tracked operation: show progress, advance the sequence,
    /// and remember the abort handle.
    fn begin_operation(&self, abort: AbortHandle) -> u64 {
        let mut state = self.lock();
        state.op_seq += 1;
        let seq = state.op_seq;
        state.current_op = Some((seq, abort));
        state.progress_visible = true;
        seq
    }

    /// Close out an operation. Returns false when the sequence moved
    /// while it ran, in which case the caller discards the result.
    fn finish_operation(&self, seq: u64) -> bool {
        let mut state = self.lock();
        if state
            .current_op
            .as_ref()
            .is_some_and(|(stored, _)| *stored == seq)
        {
            state.current_op = None;
            state.progress_visible = false;
        }
        state.op_seq == seq
    }

    /// Abort the in-flight operation, hide progress, and say so.
    ///
    /// The abandoned operation leaves no partial state behind.
    pub fn cancel(&self) {
        let handle = {
            let mut state = self.lock();
            let handle = state.current_op.take();
            if handle.is_some() {
                state.op_seq += 1;
                state.progress_visible = false;
            }
            handle
        };
        if let Some((_, handle)) = handle {
            handle.abort();
            self.notifier.notify(
                NotificationKind::Info,
                "Operation cancelled",
                "The running operation was abandoned",
            );
        }
    }

    /// Run a user-triggered import.
    ///
    /// Returns `Ok(None)` when the user declined the confirmation, the
    /// operation was cancelled, or its response went stale.
    pub async fn import(&self, import_type: ImportType) -> Result<Option<ImportOutcome>> {
        let (project, items, count_hint) = {
            let state = self.lock();
            let project = state
                .active_project
                .clone()
                .ok_or_else(|| AppError::config("select a project before importing"))?;

            match import_type {
                ImportType::Collection => {
                    let data = state
                        .page_data
                        .as_ref()
                        .filter(|d| d.current_collection.is_some() && !d.items.is_empty())
                        .ok_or_else(|| {
                            AppError::config("no collection data extracted from the page")
                        })?;
                    let items = data.items.clone();
                    let count = items.len();
                    (project, items, count)
                }
                ImportType::Selected => {
                    let data = state
                        .page_data
                        .as_ref()
                        .filter(|d| !d.selected_items.is_empty())
                        .ok_or_else(|| AppError::config("no items selected on the page"))?;
                    let items = data.selected_items.clone();
                    let count = items.len();
                    (project, items, count)
                }
                ImportType::Library => {
                    let count = state
                        .page_data
                        .as_ref()
                        .map(|d| d.total_items_count)
                        .unwrap_or(0);
                    (project, Vec::new(), count)
                }
                ImportType::Extension => (project, Vec::new(), 0),
            }
        };

        let message = match import_type {
            ImportType::Library => format!(
                "Import the entire library (about {count_hint} items) into '{}'?",
                project.name
            ),
            ImportType::Extension => {
                format!("Import the staged items into '{}'?", project.name)
            }
            _ => format!(
                "Import {count_hint} {} into '{}'?",
                import_type.label(),
                project.name
            ),
        };
        if !self.prompt.confirm(&message).await {
            log::info!("Import declined by the user");
            return Ok(None);
        }

        let coordinator = self.coordinator.clone();
        let project_id = project.id.clone();
        let task = tokio::spawn(async move {
            let items = match import_type {
                ImportType::Library => {
                    let Response::Library(export) =
                        coordinator.send(Request::GetFullLibrary).await?
                    else {
                        return Err(AppError::channel("unexpected reply to getFullLibrary"));
                    };
                    export.items
                }
                ImportType::Extension => {
                    let Response::Pending { pending } =
                        coordinator.send(Request::TakePendingExport).await?
                    else {
                        return Err(AppError::channel("unexpected reply to takePendingExport"));
                    };
                    pending
                        .ok_or_else(|| AppError::config("nothing staged for export"))?
                        .items
                }
                _ => items,
            };
            let Response::Imported(outcome) = coordinator
                .send(Request::ImportToRemote {
                    project_id,
                    items,
                    import_type,
                })
                .await?
            else {
                return Err(AppError::channel("unexpected reply to importToRemote"));
            };
            Ok(outcome)
        });

        let seq = self.begin_operation(task.abort_handle());
        let joined = task.await;
        if !self.finish_operation(seq) {
            log::info!("Discarding stale import response");
            return Ok(None);
        }

        match joined {
            Ok(Ok(outcome)) => {
                self.refresh_after_operation().await?;
                Ok(Some(outcome))
            }
            Ok(Err(e)) => Err(e),
            Err(join_error) if join_error.is_cancelled() => Ok(None),
            Err(join_error) => Err(AppError::channel(join_error.to_string())),
        }
    }

    /// Pull a server-side export and materialize it as a downloadable
    /// artifact. Returns the written path, or `None` when cancelled or
    /// stale.
    pub async fn export(&self, export_type: ExportType) -> Result<Option<PathBuf>> {
        let project = self
            .lock()
            .active_project
            .clone()
            .ok_or_else(|| AppError::config("select a project before exporting"))?;

        let coordinator = self.coordinator.clone();
        let project_id = project.id.clone();
        let task = tokio::spawn(async move {
            let Response::Exported { exported } = coordinator
                .send(Request::ExportFromRemote {
                    project_id,
                    export_type,
                })
                .await?
            else {
                return Err(AppError::channel("unexpected reply to exportFromRemote"));
            };
            Ok(exported)
        });

        let seq = self.begin_operation(task.abort_handle());
        let joined = task.await;
        if !self.finish_operation(seq) {
            log::info!("Discarding stale export response");
            return Ok(None);
        }

        match joined {
            Ok(Ok(exported)) => {
                let path = self.write_artifact(export_type, &exported).await?;
                self.refresh_after_operation().await?;
                Ok(Some(path))
            }
            Ok(Err(e)) => Err(e),
            Err(join_error) if join_error.is_cancelled() => Ok(None),
            Err(join_error) => Err(AppError::channel(join_error.to_string())),
        }
    }

    async fn write_artifact(&self, export_type: ExportType, data: &Value) -> Result<PathBuf> {
        let slug = match export_type {
            ExportType::Results => "results",
            ExportType::Bibliography => "bibliography",
        };
        let file_name = format!(
            "analylit-{slug}-{}.json",
            Utc::now().format("%Y%m%d-%H%M%S")
        );
        let path = self.downloads_dir.join(file_name);
        tokio::fs::create_dir_all(&self.downloads_dir).await?;
        tokio::fs::write(&path, serde_json::to_vec_pretty(data)?).await?;
        log::info!("Export written to {}", path.display());
        Ok(path)
    }
}
