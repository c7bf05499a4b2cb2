//! Archive builder - streams a folder into a single `.tar.gz` on disk.
//!
//! Entries are rewritten under the folder's own base name, so extracting
//! `photos_<ts>.tar.gz` yields `photos/...`. File bodies are copied straight
//! from disk into the gzip stream; nothing is buffered whole.

pub mod partition;

use crate::fs::walker::walk_entries;
use crate::utils::{AgentError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::Builder;
use tracing::{debug, info};

/// What ended up in a finished archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Number of tar entries written (directories included)
    pub entries: usize,
    /// Uncompressed bytes of regular file contents
    pub source_bytes: u64,
    /// Size of the compressed archive on disk
    pub archive_bytes: u64,
}

/// Build a gzip-compressed tar of `source` at `dest`.
///
/// On failure the walk stops and whatever was written to `dest` is left
/// behind; the caller must not upload it.
pub fn build_archive(source: &Path, dest: &Path) -> Result<ArchiveSummary> {
    info!(source = %source.display(), dest = %dest.display(), "Compressing folder");

    let archive_err = |source: std::io::Error| AgentError::Archive {
        path: dest.to_path_buf(),
        source,
    };

    let root_name = source
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| AgentError::Config(format!("{} has no folder name", source.display())))?;

    let out = File::create(dest).map_err(archive_err)?;
    let encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut entries = 0usize;
    let mut source_bytes = 0u64;

    walk_entries(source, |entry| {
        let name = root_name.join(&entry.relative_path);
        builder.append_path_with_name(&entry.path, &name)?;
        entries += 1;
        if !entry.is_dir && !entry.is_symlink {
            source_bytes += entry.size;
        }
        debug!(entry = %name.display(), size = entry.size, "Archived entry");
        Ok(())
    })
    .map_err(archive_err)?;

    let encoder = builder.into_inner().map_err(archive_err)?;
    let mut writer = encoder.finish().map_err(archive_err)?;
    writer.flush().map_err(archive_err)?;
    drop(writer);

    let archive_bytes = std::fs::metadata(dest).map_err(archive_err)?.len();

    info!(
        dest = %dest.display(),
        entries,
        source_bytes,
        archive_bytes,
        "Archive complete"
    );

    Ok(ArchiveSummary {
        path: dest.to_path_buf(),
        entries,
        source_bytes,
        archive_bytes,
    })
}
