//! Artifact partitioner - slices a finished archive into fixed-size parts.

use crate::naming::part_name;
use crate::utils::{AgentError, Result};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// True when an archive of `archive_size` bytes must be split.
///
/// Splitting needs a configured size and an archive strictly larger than it.
pub fn needs_partition(archive_size: u64, split_size: Option<u64>) -> bool {
    matches!(split_size, Some(split) if split > 0 && archive_size > split)
}

/// Copy `archive` into `<base_name>.part001`, `.part002`, ... under `output_dir`.
///
/// Every part except the last holds exactly `split_size` bytes. A trailing
/// empty part is never emitted. On failure the part being written is removed;
/// parts finished earlier stay on disk.
pub fn split_archive(
    archive: &Path,
    output_dir: &Path,
    base_name: &str,
    split_size: u64,
) -> Result<Vec<PathBuf>> {
    info!(archive = %archive.display(), split_size, "Splitting archive");

    if split_size == 0 {
        return Err(AgentError::Config("split size must be greater than 0".into()));
    }

    let input = File::open(archive).map_err(|source| AgentError::Partition {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut input = BufReader::new(input);

    let mut parts = Vec::new();
    for index in 1.. {
        let part_path = output_dir.join(part_name(base_name, index));

        let written = match write_part(&mut input, &part_path, split_size) {
            Ok(written) => written,
            Err(source) => {
                let _ = std::fs::remove_file(&part_path);
                return Err(AgentError::Partition {
                    path: part_path,
                    source,
                });
            }
        };

        if written == 0 {
            let _ = std::fs::remove_file(&part_path);
            debug!(index, "Skipped empty part");
            break;
        }

        debug!(part = %part_path.display(), bytes = written, "Created part");
        parts.push(part_path);

        if written < split_size {
            break;
        }
    }

    info!(archive = %archive.display(), parts = parts.len(), "Split complete");
    Ok(parts)
}

/// Remove `<base_name>.part001`, `.part002`, ... from `output_dir`, stopping
/// at the first index with no file. Returns how many parts were removed.
pub fn remove_parts(output_dir: &Path, base_name: &str) -> usize {
    let mut removed = 0;
    for index in 1.. {
        let part_path = output_dir.join(part_name(base_name, index));
        match std::fs::remove_file(&part_path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => warn!(part = %part_path.display(), error = %e, "Failed to remove part"),
        }
    }
    removed
}

fn write_part<R: Read>(input: &mut R, part_path: &Path, split_size: u64) -> io::Result<u64> {
    let mut output = File::create(part_path)?;
    let written = io::copy(&mut input.by_ref().take(split_size), &mut output)?;
    output.flush()?;
    Ok(written)
}
