//! Remote object store abstraction.
//!
//! The agent only needs three primitives from the store: create an object
//! from a local file, list objects matching a name filter, delete by id.

pub mod auth;
pub mod drive;
#[cfg(test)]
pub(crate) mod memory;

use crate::utils::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An object as reported by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteArtifact {
    pub id: String,
    pub name: String,
    /// RFC3339 creation instant as reported by the store
    pub created_time: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

/// Metadata for an object about to be created
#[derive(Debug, Clone, Copy)]
pub struct NewObject<'a> {
    pub name: &'a str,
    /// Destination container
    pub parent: &'a str,
    /// Exact byte length of the body
    pub size: u64,
}

/// Listing filter: objects in `container` whose name contains any of
/// `name_contains`. Trashed objects are always excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub container: String,
    pub name_contains: Vec<String>,
}

impl ListQuery {
    /// Everything a backup pass may have produced: whole archives and parts.
    pub fn backup_artifacts(container: &str) -> Self {
        Self {
            container: container.to_string(),
            name_contains: vec![
                crate::naming::ARCHIVE_SUFFIX.to_string(),
                crate::naming::PART_MARKER.to_string(),
            ],
        }
    }

    /// Does `name` pass the name filter?
    pub fn matches_name(&self, name: &str) -> bool {
        self.name_contains.iter().any(|needle| name.contains(needle.as_str()))
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload `body` as a new object and return its remote identifier.
    ///
    /// `chunk_size` overrides the store's default bytes-per-request.
    async fn create_object(
        &self,
        object: NewObject<'_>,
        body: tokio::fs::File,
        chunk_size: Option<u64>,
    ) -> Result<String>;

    /// List non-trashed objects matching `query`, following pagination.
    async fn list_objects(&self, query: &ListQuery) -> Result<Vec<RemoteArtifact>>;

    /// Delete one object by identifier.
    async fn delete_object(&self, id: &str) -> Result<()>;
}
