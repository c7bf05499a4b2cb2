//! Backup artifact naming.
//!
//! Archives are named `<folder>_<timestamp>.tar.gz`, split parts append
//! `.partNNN`. The retention sweeper reverses this with [`group_key`], so the
//! two directions have to stay in sync.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use std::fmt::Display;
use std::sync::LazyLock;

/// Suffix of a whole (unsplit) archive.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Marker shared by every split part name.
pub const PART_MARKER: &str = ".part";

// Accepts both `.tar.gz.partNNN` and the older `.tar.partNNN` layout.
static PART_SUFFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.tar(?:\.gz)?\.part\d+$").expect("part pattern is valid"));

/// Render `at` as RFC3339 (second precision) in `zone`.
///
/// With `filename_safe` every `:` becomes `-`, so
/// `2025-07-19T21:10:56-03:00` turns into `2025-07-19T21-10-56-03-00`.
pub fn format_timestamp<Z>(at: DateTime<Utc>, zone: &Z, filename_safe: bool) -> String
where
    Z: TimeZone,
    Z::Offset: Display,
{
    let timestamp = at.with_timezone(zone).to_rfc3339_opts(SecondsFormat::Secs, true);
    if filename_safe {
        timestamp.replace(':', "-")
    } else {
        timestamp
    }
}

/// Logical archive name for one folder at one timestamp.
pub fn archive_name(folder: &str, timestamp: &str) -> String {
    format!("{folder}_{timestamp}{ARCHIVE_SUFFIX}")
}

/// Name of the `index`-th (1-based) part of `base`.
pub fn part_name(base: &str, index: usize) -> String {
    format!("{base}{PART_MARKER}{index:03}")
}

/// Identity key of the backup group a remote artifact belongs to.
///
/// Only a trailing archive or part suffix is stripped; a folder whose own
/// name contains `.tar.gz` keeps it in the key. Returns `None` for names
/// that are not backup artifacts at all.
pub fn group_key(name: &str) -> Option<&str> {
    if let Some(found) = PART_SUFFIX_REGEX.find(name) {
        return Some(&name[..found.start()]);
    }
    name.strip_suffix(ARCHIVE_SUFFIX)
}
