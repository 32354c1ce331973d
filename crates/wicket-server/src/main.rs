use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};
use wicket_core::{ArtifactStore, FsKvStore, WidgetId};
use wicket_pipeline::WicketConfig;
use wicket_pipeline::config::StorageConfig;
use wicket_server::{AppState, WidgetService, router};

#[derive(Parser)]
#[command(
    name = "wicket",
    version,
    about = "Wicket: generate, store and run AI-authored widgets"
)]
struct Cli {
    /// Path to wicket.toml (default: ./wicket.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on, overriding server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// List stored widgets, newest first
    List,
    /// Print one widget record as JSON
    Show {
        /// Widget id
        id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json);

    match cli.command {
        Command::Serve { bind } => serve(cli.config.as_deref(), bind).await,
        Command::List => list(cli.config.as_deref()).await,
        Command::Show { id } => show(cli.config.as_deref(), WidgetId(id)).await,
    }
}

/// Logs go to stderr so `list`/`show` output stays clean on stdout.
fn init_logging(json: bool) {
    let builder = fmt()
        .with_env_filter(EnvFilter::from_env("WICKET_LOG"))
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(config_path: Option<&Path>, bind: Option<String>) -> Result<()> {
    let (path, config) = WicketConfig::discover(config_path)
        .with_context(|| match config_path {
            Some(p) => format!("cannot load config {}", p.display()),
            None => "cannot load wicket.toml".to_string(),
        })?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    tracing::info!(
        config = %path.display(),
        widgets_dir = %config.storage.widgets_dir.display(),
        uploads_dir = %config.storage.uploads_dir.display(),
        database = %config.data.database.display(),
        timeout_secs = config.execution.timeout_secs,
        "Starting Wicket"
    );

    let service = WidgetService::from_config(&config).await?;
    let app = router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("cannot bind {bind}"))?;
    tracing::info!(addr = %listener.local_addr()?, "Wicket listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Wicket shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// `list` and `show` only need storage, so they fall back to the default
/// layout when no config file exists.
fn storage_config(config_path: Option<&Path>) -> Result<StorageConfig> {
    match WicketConfig::locate(config_path) {
        Some(path) => {
            let config = WicketConfig::from_file(&path)
                .with_context(|| format!("cannot load config {}", path.display()))?;
            Ok(config.storage)
        }
        None => Ok(StorageConfig::default()),
    }
}

async fn open_store(config_path: Option<&Path>) -> Result<ArtifactStore> {
    let storage = storage_config(config_path)?;
    let kv = FsKvStore::new(storage.widgets_dir);
    Ok(ArtifactStore::open(Arc::new(kv)).await?)
}

async fn list(config_path: Option<&Path>) -> Result<()> {
    let store = open_store(config_path).await?;
    let widgets = store.list().await?;
    if widgets.is_empty() {
        println!("No widgets stored.");
        return Ok(());
    }
    for widget in widgets {
        println!(
            "{:<15} {:<10} {:>6}  {}",
            widget.id.to_string(),
            widget.category.as_str(),
            widget.usage_count,
            widget.name
        );
    }
    Ok(())
}

async fn show(config_path: Option<&Path>, id: WidgetId) -> Result<()> {
    let store = open_store(config_path).await?;
    let widget = store
        .get(id)
        .await?
        .with_context(|| format!("widget {id} not found"))?;
    println!("{}", serde_json::to_string_pretty(&widget)?);
    Ok(())
}
