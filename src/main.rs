//! tg_drive_backup CLI - main entry point
//!
//! Exports the direct conversations of every Telegram session to Google
//! Drive and uploads the run log afterwards.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use tracing::{error, info, warn};

use tg_drive_backup::commands::{self, Exporter};
use tg_drive_backup::prompt::{Prompt, StdinPrompt};
use tg_drive_backup::run_log::{init_tracing, RunLog};
use tg_drive_backup::{discover_sessions, metrics, Config, DriveClient, TelegramConnector};

#[derive(Parser)]
#[command(name = "tg_drive_backup")]
#[command(about = "Back up Telegram direct conversations to Google Drive", long_about = None)]
#[command(version)]
struct Cli {
    /// Register sessions interactively instead of using the existing ones
    #[arg(long = "ask-phones", default_value_t = false)]
    ask_phones: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load();

    let run_log = RunLog::create(&config.log_dir, Local::now())?;
    init_tracing(Some(&run_log))?;

    if let Some(addr) = config.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => {
                if let Err(err) = metrics::spawn_metrics_server(socket).await {
                    warn!(%addr, "Metrics endpoint not started: {}", err);
                }
            }
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let result = run(cli, &config, &run_log).await;
    if let Err(err) = &result {
        error!("Run failed: {:#}", err);
    }
    result
}

async fn run(cli: Cli, config: &Config, run_log: &RunLog) -> anyhow::Result<()> {
    config.validate()?;

    let prompt: Arc<dyn Prompt> = Arc::new(StdinPrompt);
    let connector = TelegramConnector::new(config, Arc::clone(&prompt));

    let sessions = if cli.ask_phones {
        commands::register_run(&config.sessions_dir, &connector, prompt.as_ref()).await?
    } else {
        discover_sessions(&config.sessions_dir)?
    };
    info!(
        count = sessions.len(),
        dir = %config.sessions_dir.display(),
        "Sessions to export"
    );

    let storage = DriveClient::authenticate(config).await?;
    let exporter = Exporter::new(&connector, &storage, config.drive_folder_id.clone());
    let summary = exporter.run(&sessions, run_log.path()).await?;

    info!(
        sessions = summary.sessions,
        exported = summary.exported,
        skipped = summary.skipped,
        "Backup finished"
    );
    Ok(())
}
