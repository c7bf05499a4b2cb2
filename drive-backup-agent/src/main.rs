//! Drive Backup Agent - Main entry point
//!
//! Runs a single backup pass and exits. Scheduling is left to cron or a
//! systemd timer.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use drive_backup_agent::{config::Config, remote::drive::DriveClient, utils, BackupExecutor};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Directory whose subfolders are backed up (overrides config)
    #[arg(long, value_name = "DIR")]
    source_dir: Option<PathBuf>,

    /// Retention window in days, 0 deletes every existing backup (overrides config)
    #[arg(long)]
    retention_days: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env();
    if let Some(dir) = args.source_dir {
        config.backup.source_dir = dir;
    }
    if let Some(days) = args.retention_days {
        config.retention.days = days;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level, config.log.debug)?;

    tracing::info!("Starting drive-backup-agent v{}", env!("CARGO_PKG_VERSION"));

    let settings = config.resolve();
    let credentials = config.credentials().context("loading Drive credentials")?;
    let store = DriveClient::new(credentials, &config.drive.api_base, &config.drive.upload_base)
        .context("creating Drive client")?;

    let executor = BackupExecutor::new(Arc::new(store), settings);
    let report = executor.run_pass(Utc::now()).await?;

    if let Ok(summary) = serde_json::to_string(&report) {
        tracing::debug!(report = %summary, "Pass report");
    }
    tracing::info!(
        uploaded = report.uploaded(),
        failed = report.failed(),
        "Backup pass finished"
    );

    Ok(())
}
