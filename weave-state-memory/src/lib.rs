#![deny(missing_docs)]
//! In-memory implementation of `weave_types::SnapshotStore`.
//!
//! Uses a `HashMap` behind a `RwLock` for concurrent access. Suitable for
//! tests and single-process use where persistence across restarts is not
//! required.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use weave_types::{SessionId, Snapshot, SnapshotError, SnapshotStore};

/// In-memory snapshot store backed by a `HashMap` behind a `RwLock`.
pub struct MemoryStore {
    data: RwLock<HashMap<SessionId, Snapshot>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self { data: RwLock::new(HashMap::new()) }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn put(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let mut data = self.data.write().await;
        data.insert(snapshot.session_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<Snapshot>, SnapshotError> {
        let data = self.data.read().await;
        Ok(data.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), SnapshotError> {
        let mut data = self.data.write().await;
        data.remove(session_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionId>, SnapshotError> {
        let data = self.data.read().await;
        Ok(data.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::ComState;

    fn snapshot(session_id: &str) -> Snapshot {
        Snapshot {
            version: 1,
            session_id: SessionId::new(session_id),
            tick: 0,
            timeline: vec![],
            com_state: ComState::default(),
            data_cache: serde_json::json!({}),
            created_at: chrono::Utc::now(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = MemoryStore::new();
        store.put(&snapshot("s1")).await.unwrap();
        let got = store.get(&SessionId::new("s1")).await.unwrap();
        assert_eq!(got.unwrap().session_id, SessionId::new("s1"));
    }

    #[tokio::test]
    async fn missing_session_reads_as_none() {
        let store = MemoryStore::new();
        assert!(store.get(&SessionId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_the_prior_snapshot_for_the_same_session() {
        let store = MemoryStore::new();
        store.put(&snapshot("s1")).await.unwrap();
        let mut second = snapshot("s1");
        second.tick = 5;
        store.put(&second).await.unwrap();
        assert_eq!(store.get(&SessionId::new("s1")).await.unwrap().unwrap().tick, 5);
    }

    #[tokio::test]
    async fn delete_removes_and_is_idempotent_on_missing() {
        let store = MemoryStore::new();
        store.put(&snapshot("s1")).await.unwrap();
        store.delete(&SessionId::new("s1")).await.unwrap();
        assert!(store.get(&SessionId::new("s1")).await.unwrap().is_none());
        store.delete(&SessionId::new("s1")).await.unwrap();
    }

    #[tokio::test]
    async fn list_returns_every_stored_session_id() {
        let store = MemoryStore::new();
        store.put(&snapshot("s1")).await.unwrap();
        store.put(&snapshot("s2")).await.unwrap();
        let mut ids = store.list().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec![SessionId::new("s1"), SessionId::new("s2")]);
    }
}
