//! Retention sweeper - deletes remote backups older than the retention window.
//!
//! Remote artifacts are grouped back into logical backups by [`group_key`],
//! so a split archive ages and is deleted as one unit. A group's age is the
//! creation time of its earliest member.

use crate::naming::group_key;
use crate::remote::{ListQuery, RemoteArtifact, RemoteStore};
use crate::utils::{AgentError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Remote artifacts that together make up one backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupGroup {
    pub key: String,
    /// Members ordered by name, so parts come out in sequence
    pub members: Vec<RemoteArtifact>,
}

impl BackupGroup {
    /// Earliest member creation time. Fails if any member's timestamp is
    /// unparseable, since the group's age is then unknown.
    pub fn created_at(&self) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
        let mut earliest: Option<DateTime<Utc>> = None;
        for member in &self.members {
            let created = DateTime::parse_from_rfc3339(&member.created_time)?.with_timezone(&Utc);
            earliest = Some(earliest.map_or(created, |e| e.min(created)));
        }
        // Groups are never built empty.
        Ok(earliest.unwrap_or(DateTime::<Utc>::MIN_UTC))
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Backup groups found at the remote
    pub groups: usize,
    /// Groups past the retention window
    pub expired_groups: usize,
    /// Artifacts deleted
    pub deleted: usize,
    /// Artifacts whose deletion failed
    pub failed: usize,
}

/// Group listed artifacts by backup identity. Names that carry no archive
/// or part suffix are ignored.
pub fn group_artifacts(artifacts: Vec<RemoteArtifact>) -> Vec<BackupGroup> {
    let mut groups: BTreeMap<String, Vec<RemoteArtifact>> = BTreeMap::new();

    for artifact in artifacts {
        match group_key(&artifact.name) {
            Some(key) => groups.entry(key.to_string()).or_default().push(artifact),
            None => debug!(name = %artifact.name, "Ignoring non-backup artifact"),
        }
    }

    groups
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by(|a, b| a.name.cmp(&b.name));
            BackupGroup { key, members }
        })
        .collect()
}

/// `now - retention_days`, or `None` when that instant is before the
/// earliest representable date.
pub fn retention_cutoff(retention_days: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(retention_days)).and_then(|window| now.checked_sub_signed(window))
}

/// Zero retention days keeps nothing; otherwise a group expires once it is
/// strictly older than `now - retention_days`. A window reaching past the
/// earliest representable date expires nothing.
pub fn is_expired(created: DateTime<Utc>, retention_days: u32, now: DateTime<Utc>) -> bool {
    retention_days == 0 || retention_cutoff(retention_days, now).is_some_and(|cutoff| created < cutoff)
}

/// List backup artifacts in `container` and delete every expired group.
///
/// A listing failure aborts the sweep. Individual delete failures are
/// logged and counted; the sweep carries on with the remaining artifacts.
pub async fn sweep(
    store: &dyn RemoteStore,
    container: &str,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<SweepStats> {
    match retention_cutoff(retention_days, now) {
        Some(cutoff) => info!(
            retention_days,
            cutoff = %cutoff.to_rfc3339(),
            "Checking for backups older than the retention window"
        ),
        None => info!(retention_days, "Retention window exceeds the calendar, keeping every backup"),
    }

    let query = ListQuery::backup_artifacts(container);
    let artifacts = store.list_objects(&query).await.map_err(|e| match e {
        AgentError::List(_) => e,
        other => AgentError::List(other.to_string()),
    })?;
    debug!(count = artifacts.len(), "Found artifacts for retention check");

    let groups = group_artifacts(artifacts);
    let mut stats = SweepStats {
        groups: groups.len(),
        ..SweepStats::default()
    };

    for group in &groups {
        let created = match group.created_at() {
            Ok(created) => created,
            Err(e) => {
                warn!(group = %group.key, error = %e, "Could not parse creation time, keeping backup");
                continue;
            }
        };

        if !is_expired(created, retention_days, now) {
            debug!(group = %group.key, created = %created.to_rfc3339(), "Retaining backup");
            continue;
        }

        stats.expired_groups += 1;
        info!(
            group = %group.key,
            created = %created.to_rfc3339(),
            members = group.members.len(),
            "Deleting old backup group"
        );

        for member in &group.members {
            match store.delete_object(&member.id).await {
                Ok(()) => {
                    info!(name = %member.name, id = %member.id, "Deleted artifact");
                    stats.deleted += 1;
                }
                Err(e) => {
                    warn!(name = %member.name, id = %member.id, error = %e, "Error deleting artifact");
                    stats.failed += 1;
                }
            }
        }
    }

    info!(
        groups = stats.groups,
        expired = stats.expired_groups,
        deleted = stats.deleted,
        failed = stats.failed,
        "Retention sweep complete"
    );
    Ok(stats)
}
