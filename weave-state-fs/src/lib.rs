#![deny(missing_docs)]
//! Filesystem-backed implementation of `weave_types::SnapshotStore`.
//!
//! Each session's snapshot is a single percent-encoded `.json` file under
//! the store's root directory, giving true persistence across process
//! restarts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use weave_types::{SessionId, Snapshot, SnapshotError, SnapshotStore};

/// Filesystem-backed snapshot store.
///
/// Directory layout:
/// ```text
/// root/
///   <url-encoded-session-id>.json
/// ```
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a new filesystem store rooted at the given directory. The
    /// directory is created lazily on first write.
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }
}

/// Encode a session id into a safe filename.
fn key_to_filename(key: &str) -> String {
    let mut encoded = String::new();
    for ch in key.chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => encoded.push(ch),
            _ => {
                for byte in ch.to_string().as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    format!("{encoded}.json")
}

/// Decode a filename back to a session id.
fn filename_to_key(filename: &str) -> Option<String> {
    let name = filename.strip_suffix(".json")?;
    let mut result = Vec::new();
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()?;
            let byte = u8::from_str_radix(hex, 16).ok()?;
            result.push(byte);
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(result).ok()
}

#[async_trait]
impl SnapshotStore for FsStore {
    async fn put(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| SnapshotError::Io(e.to_string()))?;
        let path = self.root.join(key_to_filename(snapshot.session_id.as_str()));
        let contents = serde_json::to_string_pretty(snapshot).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        tokio::fs::write(&path, contents).await.map_err(|e| SnapshotError::Io(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<Snapshot>, SnapshotError> {
        let path = self.root.join(key_to_filename(session_id.as_str()));
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let snapshot = serde_json::from_str(&contents).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
                Ok(Some(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SnapshotError::Io(e.to_string())),
        }
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), SnapshotError> {
        let path = self.root.join(key_to_filename(session_id.as_str()));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SnapshotError::Io(e.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<SessionId>, SnapshotError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(SnapshotError::Io(e.to_string())),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| SnapshotError::Io(e.to_string()))? {
            if let Some(filename) = entry.file_name().to_str() {
                if let Some(key) = filename_to_key(filename) {
                    ids.push(SessionId::new(key));
                }
            }
        }
        Ok(ids)
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

    #[test]
    fn key_encoding_roundtrip() {
        let keys = ["simple", "session:1", "path/to/id", "has spaces", "emoji🎉"];
        for key in &keys {
            let filename = key_to_filename(key);
            let decoded = filename_to_key(&filename).unwrap();
            assert_eq!(*key, decoded, "roundtrip failed for {key}");
        }
    }

    #[test]
    fn filename_to_key_rejects_non_json() {
        assert!(filename_to_key("test.txt").is_none());
    }

    #[tokio::test]
    async fn write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.put(&snapshot("s1")).await.unwrap();
        let got = store.get(&SessionId::new("s1")).await.unwrap();
        assert_eq!(got.unwrap().session_id, SessionId::new("s1"));
    }

    #[tokio::test]
    async fn read_nonexistent_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(store.get(&SessionId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_file_and_is_idempotent_on_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.put(&snapshot("s1")).await.unwrap();
        store.delete(&SessionId::new("s1")).await.unwrap();
        assert!(store.get(&SessionId::new("s1")).await.unwrap().is_none());
        store.delete(&SessionId::new("s1")).await.unwrap();
    }

    #[tokio::test]
    async fn list_on_nonexistent_dir_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("does-not-exist-yet");
        let store = FsStore::new(&root);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_returns_every_stored_session_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.put(&snapshot("s1")).await.unwrap();
        store.put(&snapshot("s2")).await.unwrap();
        let mut ids = store.list().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec![SessionId::new("s1"), SessionId::new("s2")]);
    }

    #[test]
    fn fs_store_implements_snapshot_store() {
        fn _assert_snapshot_store<T: SnapshotStore>() {}
        _assert_snapshot_store::<FsStore>();
    }
}
