//! Hibernation snapshots (SPEC_FULL.md §4.H "Hibernation"): the wire shape
//! a `Session` serializes itself into and restores itself from, plus the
//! storage trait that persists them. Lives here rather than in
//! `weave-session` so `weave-state-memory`/`weave-state-fs` can implement
//! it without depending upward on the orchestration crate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compiled::TimelineEntry;
use crate::id::SessionId;

/// Snapshot format version. Bumped on any incompatible change to this
/// struct's shape; `hydrate` rejects anything else.
pub const SNAPSHOT_VERSION: u32 = 1;

/// The persisted shape of a `Com`'s durable state: everything that survives
/// `Com::clear()` (state, metadata, model options) plus queued and injected
/// messages. Tools, sections, ephemeral content and refs are not included —
/// they are rebuilt by the component tree on the next compile.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ComState {
    pub state: HashMap<String, serde_json::Value>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub model_options: Option<serde_json::Value>,
    pub queued_messages: Vec<crate::compiled::Message>,
    pub injected_history: Vec<TimelineEntry>,
}

/// A point-in-time capture of a session, suitable for persisting and later
/// restoring via `hydrate` (SPEC_FULL.md §4.H).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub version: u32,
    pub session_id: SessionId,
    pub tick: u32,
    pub timeline: Vec<TimelineEntry>,
    pub com_state: ComState,
    /// Opaque compiler-owned cache (knob values, state-cell data) that
    /// doesn't have a crate-level type here; stored as a JSON blob.
    pub data_cache: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Error returned by a `SnapshotStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(String),
    #[error("snapshot serialization error: {0}")]
    Serialization(String),
}

/// Persists and retrieves `Snapshot`s by session id: a read/write/delete/list
/// store narrowed to the one key type a session snapshot needs.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist `snapshot`, overwriting any snapshot previously stored under
    /// the same session id.
    async fn put(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;

    /// Fetch the snapshot stored under `session_id`, if any.
    async fn get(&self, session_id: &SessionId) -> Result<Option<Snapshot>, SnapshotError>;

    /// Remove the snapshot stored under `session_id`. A no-op if absent.
    async fn delete(&self, session_id: &SessionId) -> Result<(), SnapshotError>;

    /// List every session id with a stored snapshot.
    async fn list(&self) -> Result<Vec<SessionId>, SnapshotError>;
}
