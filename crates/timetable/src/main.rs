use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use timetable::config::AppConfig;
use timetable::db::ScheduleStore;
use timetable::server::create_router;
use timetable::source::SourceFetcher;
use timetable::types::AppState;

#[derive(Debug, Parser)]
#[command(name = "timetable", version, about = "Timetable scraper and API")]
struct Cli {
    /// JSON configuration file; defaults are used when it doesn't exist
    #[arg(
        short,
        long,
        global = true,
        env = "TIMETABLE_CONFIG",
        default_value = "config.json"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Run one sync and exit, for cron
    Sync {
        /// Re-parse even if the file is unchanged
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("timetable=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config)?;
    let store = Arc::new(
        ScheduleStore::open(&config.database_path)
            .with_context(|| format!("opening database {}", config.database_path))?,
    );
    let source = Arc::new(SourceFetcher::new(&config.source)?);
    let state = Arc::new(AppState::new(&config, store, source));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, state).await,
        Command::Sync { force } => {
            let report = state.sync.run(force).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_stale() {
                anyhow::bail!(
                    "sync failed: {}",
                    report.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            Ok(())
        }
    }
}

async fn serve(config: &AppConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let address = format!("{}:{}", config.server.address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {}", address))?;
    info!("Listening on {}", address);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
