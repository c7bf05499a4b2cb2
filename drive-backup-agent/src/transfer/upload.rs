//! Upload coordinator - ships one archive (whole or split) to the remote store.

use crate::archive::partition::{needs_partition, remove_parts, split_archive};
use crate::remote::{NewObject, RemoteStore};
use crate::transfer::progress::format_bytes;
use crate::utils::{AgentError, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Transfer settings shared by every upload of a pass
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Archives larger than this are split into parts
    pub split_size: Option<u64>,

    /// Bytes per network request; `None` keeps the store default
    pub chunk_size: Option<u64>,

    /// Where split parts are written
    pub temp_dir: PathBuf,
}

/// One file to upload and the remote name it gets
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedPart {
    path: PathBuf,
    name: String,
}

/// Upload `archive` under the logical name `name` into `parent`.
///
/// Returns the remote identifiers in part order. The first failing part
/// aborts the rest; parts already uploaded stay on the remote.
pub async fn upload_archive(
    store: &dyn RemoteStore,
    archive: &Path,
    name: &str,
    parent: &str,
    options: &UploadOptions,
) -> Result<Vec<String>> {
    info!(name = %name, "Starting upload");

    let archive_size = tokio::fs::metadata(archive)
        .await
        .map_err(|e| upload_failure(name, e.into()))?
        .len();

    let parts = plan_parts(archive, archive_size, name, options).await?;
    let split = parts.len() > 1;

    match options.chunk_size {
        Some(chunk) => info!(name = %name, chunk_size = chunk, "Using custom chunk size"),
        None => info!(name = %name, "Using default chunk size"),
    }

    let mut ids = Vec::with_capacity(parts.len());
    for (index, part) in parts.iter().enumerate() {
        info!(name = %part.name, part = index + 1, total = parts.len(), "Uploading");

        match upload_part(store, part, parent, options.chunk_size).await {
            Ok(id) => {
                info!(name = %part.name, id = %id, "Finished upload");
                ids.push(id);
            }
            Err(e) => {
                error!(name = %part.name, error = %e, "Upload failed");
                if split {
                    discard_parts(&parts[index..]).await;
                }
                return Err(e);
            }
        }

        if split {
            match tokio::fs::remove_file(&part.path).await {
                Ok(()) => info!(path = %part.path.display(), "Removed part file"),
                Err(e) => warn!(path = %part.path.display(), error = %e, "Failed to remove part file"),
            }
        }
    }

    if split {
        info!(name = %name, parts = ids.len(), ids = ?ids, "Uploaded all parts");
    }

    Ok(ids)
}

async fn plan_parts(
    archive: &Path,
    archive_size: u64,
    name: &str,
    options: &UploadOptions,
) -> Result<Vec<PlannedPart>> {
    let split_size = match options.split_size {
        Some(split) if needs_partition(archive_size, Some(split)) => split,
        _ => {
            return Ok(vec![PlannedPart {
                path: archive.to_path_buf(),
                name: name.to_string(),
            }])
        }
    };

    info!(
        name = %name,
        size = %format_bytes(archive_size),
        split_size = %format_bytes(split_size),
        "Archive exceeds split size"
    );

    let archive_owned = archive.to_path_buf();
    let temp_dir = options.temp_dir.clone();
    let base_name = name.to_string();
    let paths = tokio::task::spawn_blocking(move || {
        split_archive(&archive_owned, &temp_dir, &base_name, split_size).inspect_err(|_| {
            let removed = remove_parts(&temp_dir, &base_name);
            warn!(name = %base_name, removed, "Removed parts of failed split");
        })
    })
    .await??;

    Ok(paths
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            PlannedPart { path, name }
        })
        .collect())
}

async fn upload_part(
    store: &dyn RemoteStore,
    part: &PlannedPart,
    parent: &str,
    chunk_size: Option<u64>,
) -> Result<String> {
    let file = tokio::fs::File::open(&part.path)
        .await
        .map_err(|e| upload_failure(&part.name, e.into()))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| upload_failure(&part.name, e.into()))?
        .len();

    let object = NewObject {
        name: &part.name,
        parent,
        size,
    };

    store
        .create_object(object, file, chunk_size)
        .await
        .map_err(|e| upload_failure(&part.name, e))
}

/// Local parts that will never be uploaded are removed; remote copies of
/// earlier parts are left for the retention sweeper.
async fn discard_parts(parts: &[PlannedPart]) {
    for part in parts {
        if let Err(e) = tokio::fs::remove_file(&part.path).await {
            warn!(path = %part.path.display(), error = %e, "Failed to remove unsent part file");
        }
    }
}

fn upload_failure(name: &str, err: AgentError) -> AgentError {
    match err {
        AgentError::Upload { .. } => err,
        other => AgentError::Upload {
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}
