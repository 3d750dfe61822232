//! AnalyLit Connector CLI
//!
//! Headless driver wiring the same coordinator/controller composition a
//! host runtime would: probe and save a server connection, extract items
//! from the library page, and move records both ways.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use analylit_connector::controller::{AutoConfirm, ConfirmPrompt, SyncController};
use analylit_connector::coordinator::{Coordinator, CoordinatorHandle, Request, Response};
use analylit_connector::error::{AppError, Result};
use analylit_connector::extractor::PageExtractor;
use analylit_connector::host::DomHost;
use analylit_connector::models::{ExportType, ImportType, Settings};
use analylit_connector::notify::LogNotifier;
use analylit_connector::store::JsonFileStore;

/// AnalyLit Connector - library-to-server sync
#[derive(Parser, Debug)]
#[command(
    name = "analylit-connector",
    version,
    about = "Sync bibliographic records between your web library and AnalyLit"
)]
struct Cli {
    /// Path to storage directory containing settings and state
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe a server and save it as the active connection
    Probe {
        server_url: String,

        #[arg(long, default_value = "")]
        api_key: String,
    },

    /// List projects on the configured server
    Projects,

    /// Import items from the library page into a project
    Import {
        /// What to import
        #[arg(value_enum)]
        what: ImportArg,

        /// Target project id
        #[arg(long)]
        project: String,

        /// URL of the library page to extract from
        #[arg(long)]
        page: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Pull a server-side export into a file
    Export {
        #[arg(value_enum)]
        what: ExportArg,

        /// Source project id
        #[arg(long)]
        project: String,

        /// Output directory
        #[arg(long, default_value = "downloads")]
        out: PathBuf,
    },

    /// Show the sync history
    History,

    /// Run the retention cleanup pass now
    Cleanup,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ImportArg {
    Collection,
    Selected,
    Library,
}

impl From<ImportArg> for ImportType {
    fn from(arg: ImportArg) -> Self {
        match arg {
            ImportArg::Collection => ImportType::Collection,
            ImportArg::Selected => ImportType::Selected,
            ImportArg::Library => ImportType::Library,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportArg {
    Results,
    Bibliography,
}

impl From<ExportArg> for ExportType {
    fn from(arg: ExportArg) -> Self {
        match arg {
            ExportArg::Results => ExportType::Results,
            ExportArg::Bibliography => ExportType::Bibliography,
        }
    }
}

/// Confirmation prompt over stdin.
struct StdinConfirm;

#[async_trait::async_trait]
impl ConfirmPrompt for StdinConfirm {
    async fn confirm(&self, message: &str) -> bool {
        println!("{message} [y/N]");
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "y" | "Y" | "yes")
    }
}

fn prompt(yes: bool) -> Arc<dyn ConfirmPrompt> {
    if yes {
        Arc::new(AutoConfirm(true))
    } else {
        Arc::new(StdinConfirm)
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Connect a controller using the saved configuration.
async fn connected_controller(
    handle: &CoordinatorHandle,
    yes: bool,
    downloads: &PathBuf,
) -> Result<SyncController> {
    let Response::Config { config } = handle.send(Request::GetConfig).await? else {
        return Err(AppError::channel("unexpected reply to getConfig"));
    };
    if !config.is_configured() {
        return Err(AppError::config(
            "no server configured; run 'probe <server-url>' first",
        ));
    }

    let controller = SyncController::new(
        handle.clone(),
        Arc::new(LogNotifier),
        prompt(yes),
        downloads,
    );
    let probe = controller
        .test_connection(&config.server_url, &config.api_key)
        .await?;
    if !probe.connected {
        return Err(AppError::config(format!(
            "server not reachable: {}",
            probe.message
        )));
    }
    Ok(controller)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load_or_default(cli.storage_dir.join("settings.toml"));
    settings.validate()?;

    let store = Arc::new(JsonFileStore::new(&cli.storage_dir));
    let notifier = Arc::new(LogNotifier);
    let coordinator = Coordinator::new(settings.clone(), store, notifier).await?;
    let (handle, _join) = coordinator.spawn();

    match cli.command {
        Command::Probe {
            server_url,
            api_key,
        } => {
            let controller = SyncController::new(
                handle.clone(),
                Arc::new(LogNotifier),
                Arc::new(AutoConfirm(true)),
                "downloads",
            );
            let probe = controller.test_connection(&server_url, &api_key).await?;
            if probe.connected {
                log::info!("Connected ({})", probe.status);
                for project in controller.projects() {
                    log::info!("  {}  {}", project.id, project.name);
                }
            } else {
                log::error!("Not connected: {}", probe.message);
            }
        }

        Command::Projects => {
            let Response::Projects { projects } = handle.send(Request::GetProjects).await?
            else {
                return Err(AppError::channel("unexpected reply to getProjects"));
            };
            for project in projects {
                log::info!("{}  {}", project.id, project.name);
            }
        }

        Command::Import {
            what,
            project,
            page,
            yes,
        } => {
            if !handle.navigation_completed(&page).await? {
                log::warn!("URL does not look like the library site; extracting anyway");
            }

            let host = Arc::new(DomHost::with_selectors(
                &settings.http,
                page,
                settings.selectors.clone(),
            )?);
            let extractor = Arc::new(
                PageExtractor::new(host, settings.extractor.clone())
                    .with_uplink(Arc::new(handle.clone())),
            );
            extractor.initialize().await?;
            handle.attach_extractor(extractor.clone()).await?;

            let controller =
                connected_controller(&handle, yes, &PathBuf::from("downloads")).await?;
            let target = controller
                .projects()
                .into_iter()
                .find(|p| p.id == project)
                .ok_or_else(|| AppError::config(format!("unknown project id: {project}")))?;
            controller.select_project(target);

            match controller.import(what.into()).await? {
                Some(outcome) => log::info!("Imported {} items", outcome.imported),
                None => log::info!("Import abandoned"),
            }
            extractor.teardown().await;
        }

        Command::Export { what, project, out } => {
            let controller = connected_controller(&handle, true, &out).await?;
            let target = controller
                .projects()
                .into_iter()
                .find(|p| p.id == project)
                .ok_or_else(|| AppError::config(format!("unknown project id: {project}")))?;
            controller.select_project(target);

            match controller.export(what.into()).await? {
                Some(path) => log::info!("Export written to {}", path.display()),
                None => log::info!("Export abandoned"),
            }
        }

        Command::History => {
            let Response::History { history } = handle.send(Request::GetSyncHistory).await?
            else {
                return Err(AppError::channel("unexpected reply to getSyncHistory"));
            };
            if history.is_empty() {
                log::info!("No sync history yet");
            }
            for entry in history {
                let when = chrono::DateTime::from_timestamp_millis(entry.timestamp_ms)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "unknown time".to_string());
                log::info!("{when}  {}", entry.description);
            }
        }

        Command::Cleanup => {
            let outcome = handle
                .run_cleanup_at(chrono::Utc::now().timestamp_millis())
                .await?;
            log::info!(
                "Cleanup done: {} history entries pruned, pending export dropped: {}",
                outcome.history_removed,
                outcome.pending_dropped
            );
        }
    }

    Ok(())
}
