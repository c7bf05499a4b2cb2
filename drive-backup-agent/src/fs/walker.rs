//! Directory traversal for archiving.
//!
//! Yields every entry below a root (directories included, the root itself
//! excluded) in a stable order, with paths relative to the root.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// Size in bytes (0 for directories)
    pub size: u64,

    /// Is this a directory?
    pub is_dir: bool,

    /// Is this a symlink? Symlinks are never followed.
    pub is_symlink: bool,
}

impl WalkEntry {
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Self> {
        let metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let is_dir = metadata.is_dir();

        Ok(Self {
            path,
            relative_path,
            size: if is_dir { 0 } else { metadata.len() },
            is_dir,
            is_symlink: entry.path_is_symlink(),
        })
    }
}

/// Walk `root` and hand each entry to `callback`, parents before children.
///
/// The first walk error or callback error stops the walk and is returned.
pub fn walk_entries<F>(root: &Path, mut callback: F) -> std::io::Result<()>
where
    F: FnMut(&WalkEntry) -> std::io::Result<()>,
{
    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        let walk_entry = WalkEntry::from_entry(&entry, root)?;
        callback(&walk_entry)?;
    }

    Ok(())
}
