//! In-memory store used by the tests.

use super::{ListQuery, NewObject, RemoteArtifact, RemoteStore};
use crate::utils::{AgentError, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub artifact: RemoteArtifact,
    pub data: Vec<u8>,
    pub chunk_size: Option<u64>,
}

#[derive(Default)]
struct State {
    objects: Vec<StoredObject>,
    next_id: usize,
    deleted: Vec<String>,
    fail_creates: HashSet<String>,
    fail_deletes: HashSet<String>,
    fail_list: bool,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing object with a fixed creation time.
    pub fn seed(&self, name: &str, parent: &str, created_time: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("obj-{}", state.next_id);
        state.objects.push(StoredObject {
            artifact: RemoteArtifact {
                id: id.clone(),
                name: name.to_string(),
                created_time: created_time.to_string(),
                parents: vec![parent.to_string()],
            },
            data: Vec::new(),
            chunk_size: None,
        });
        id
    }

    pub fn fail_create(&self, name: &str) {
        self.state.lock().unwrap().fail_creates.insert(name.to_string());
    }

    pub fn fail_delete(&self, id: &str) {
        self.state.lock().unwrap().fail_deletes.insert(id.to_string());
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn objects(&self) -> Vec<StoredObject> {
        self.state.lock().unwrap().objects.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects().into_iter().map(|o| o.artifact.name).collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Every call in order, as `create:<name>`, `list`, `delete:<id>`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn create_object(
        &self,
        object: NewObject<'_>,
        mut body: tokio::fs::File,
        chunk_size: Option<u64>,
    ) -> Result<String> {
        self.state.lock().unwrap().calls.push(format!("create:{}", object.name));

        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;

        let mut state = self.state.lock().unwrap();
        if state.fail_creates.contains(object.name) {
            return Err(AgentError::Upload {
                name: object.name.to_string(),
                reason: "injected failure".into(),
            });
        }
        assert_eq!(data.len() as u64, object.size, "declared size must match body");

        state.next_id += 1;
        let id = format!("obj-{}", state.next_id);
        state.objects.push(StoredObject {
            artifact: RemoteArtifact {
                id: id.clone(),
                name: object.name.to_string(),
                created_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                parents: vec![object.parent.to_string()],
            },
            data,
            chunk_size,
        });
        Ok(id)
    }

    async fn list_objects(&self, query: &ListQuery) -> Result<Vec<RemoteArtifact>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list".into());
        if state.fail_list {
            return Err(AgentError::List("injected failure".into()));
        }
        Ok(state
            .objects
            .iter()
            .filter(|o| o.artifact.parents.iter().any(|p| *p == query.container))
            .filter(|o| query.matches_name(&o.artifact.name))
            .map(|o| o.artifact.clone())
            .collect())
    }

    async fn delete_object(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("delete:{id}"));
        if state.fail_deletes.contains(id) {
            return Err(AgentError::Delete {
                id: id.to_string(),
                reason: "injected failure".into(),
            });
        }
        state.objects.retain(|o| o.artifact.id != id);
        state.deleted.push(id.to_string());
        Ok(())
    }
}
