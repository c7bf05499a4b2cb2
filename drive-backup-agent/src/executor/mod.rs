//! Backup pass executor - orchestrates one run of the agent.
//!
//! A pass is strictly sequential:
//! - retention sweep over the destination folder
//! - for each source folder: build archive, upload it, remove it locally
//!
//! Per-folder failures are logged and recorded; the pass always visits
//! every folder.

use crate::archive::build_archive;
use crate::config::RunSettings;
use crate::naming::{archive_name, format_timestamp};
use crate::remote::RemoteStore;
use crate::retention::{sweep, SweepStats};
use crate::transfer::upload::upload_archive;
use crate::utils::{AgentError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A directory under the source root that gets its own archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFolder {
    pub name: String,
    pub path: PathBuf,
}

/// Step of the per-folder pipeline that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Build,
    Upload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FolderStatus {
    Uploaded { ids: Vec<String> },
    Failed { stage: Stage, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderOutcome {
    pub folder: String,
    pub archive: String,
    #[serde(flatten)]
    pub status: FolderStatus,
}

/// Everything that happened during one pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub sweep: Option<SweepStats>,
    pub sweep_error: Option<String>,
    pub folders: Vec<FolderOutcome>,
    pub duration_secs: u64,
}

impl PassReport {
    pub fn uploaded(&self) -> usize {
        self.folders
            .iter()
            .filter(|f| matches!(f.status, FolderStatus::Uploaded { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.folders.len() - self.uploaded()
    }
}

/// List the immediate subdirectories of `root`, sorted by name.
pub fn discover_folders(root: &Path) -> Result<Vec<BackupFolder>> {
    let mut folders = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        folders.push(BackupFolder {
            name: entry.file_name().to_string_lossy().to_string(),
            path: entry.path(),
        });
    }
    folders.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(folders)
}

/// Main backup executor
pub struct BackupExecutor {
    store: Arc<dyn RemoteStore>,
    settings: RunSettings,
}

impl BackupExecutor {
    pub fn new(store: Arc<dyn RemoteStore>, settings: RunSettings) -> Self {
        Self { store, settings }
    }

    /// Run one pass. `now` stamps the archives and anchors the retention
    /// cutoff. Only setup failures (temp dir, source listing) are returned.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassReport> {
        let start_time = std::time::Instant::now();
        let settings = &self.settings;

        info!(
            source = %settings.source_dir.display(),
            destination = %settings.folder_id,
            "Starting backup pass"
        );

        tokio::fs::create_dir_all(&settings.temp_dir).await.map_err(|e| {
            AgentError::Config(format!(
                "unable to create temp dir {}: {}",
                settings.temp_dir.display(),
                e
            ))
        })?;

        let folders = discover_folders(&settings.source_dir).map_err(|e| {
            AgentError::Config(format!(
                "failed to list backup dir {}: {}",
                settings.source_dir.display(),
                e
            ))
        })?;
        info!(count = folders.len(), "Discovered folders");

        let mut report = PassReport::default();

        match sweep(
            self.store.as_ref(),
            &settings.folder_id,
            settings.retention_days,
            now,
        )
        .await
        {
            Ok(stats) => report.sweep = Some(stats),
            Err(e) => {
                error!(error = %e, "Retention sweep failed");
                report.sweep_error = Some(e.to_string());
            }
        }

        for folder in &folders {
            let outcome = self.back_up_folder(folder, now).await;
            report.folders.push(outcome);
        }

        report.duration_secs = start_time.elapsed().as_secs();
        info!(
            uploaded = report.uploaded(),
            failed = report.failed(),
            duration_secs = report.duration_secs,
            "All folders processed"
        );

        Ok(report)
    }

    async fn back_up_folder(&self, folder: &BackupFolder, now: DateTime<Utc>) -> FolderOutcome {
        let settings = &self.settings;
        let timestamp = format_timestamp(now, &settings.timezone, settings.filename_safe);
        let name = archive_name(&folder.name, &timestamp);
        let archive_path = settings.temp_dir.join(&name);

        let outcome = |status| FolderOutcome {
            folder: folder.name.clone(),
            archive: name.clone(),
            status,
        };

        let source = folder.path.clone();
        let dest = archive_path.clone();
        let built = tokio::task::spawn_blocking(move || build_archive(&source, &dest))
            .await
            .map_err(AgentError::from)
            .and_then(|r| r);

        if let Err(e) = built {
            error!(folder = %folder.name, path = %folder.path.display(), error = %e, "Compressing failed");
            remove_local_archive(&archive_path).await;
            return outcome(FolderStatus::Failed {
                stage: Stage::Build,
                error: e.to_string(),
            });
        }

        let uploaded = upload_archive(
            self.store.as_ref(),
            &archive_path,
            &name,
            &settings.folder_id,
            &settings.upload,
        )
        .await;

        remove_local_archive(&archive_path).await;

        match uploaded {
            Ok(ids) => outcome(FolderStatus::Uploaded { ids }),
            Err(e) => {
                error!(folder = %folder.name, path = %archive_path.display(), error = %e, "Uploading failed");
                outcome(FolderStatus::Failed {
                    stage: Stage::Upload,
                    error: e.to_string(),
                })
            }
        }
    }
}

async fn remove_local_archive(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "Deleted archive"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Deleting archive failed"),
    }
}
