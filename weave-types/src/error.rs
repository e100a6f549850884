//! Top-level runtime errors (SPEC_FULL.md §7).
//!
//! Tool-scoped error kinds live on `ToolError` (`weave-types::tool`) since
//! they are contained at the tool boundary and never escape as a Rust
//! `Result::Err` across a tick. `WeaveError` covers the kinds that *do*
//! propagate: compile failures, spawn-tree failures, and stream-level
//! failures that abort an execution.

use thiserror::Error;

use crate::tool::ToolError;

/// Errors that can abort a tick or an execution (as opposed to tool errors,
/// which are contained — see `ToolError`).
#[non_exhaustive]
#[derive(Debug, Error, Clone)]
pub enum WeaveError {
    /// The compiler's recompile loop did not stabilize within the
    /// iteration budget (`RECOMPILE_UNSTABLE`).
    #[error("recompile did not stabilize after {iterations} iterations")]
    RecompileUnstable { iterations: usize },

    /// A spawn was attempted at or beyond `maxSpawnDepth` (`SPAWN_DEPTH_EXCEEDED`).
    #[error("spawn depth limit of {limit} exceeded")]
    SpawnDepthExceeded { limit: u32 },

    /// The model stream itself reported an error; terminates the tick as
    /// aborted.
    #[error("model stream error: {0}")]
    StreamError(String),

    /// A hibernation snapshot carried an incompatible `version`.
    #[error("incompatible snapshot version: expected {expected}, got {actual}")]
    IncompatibleSnapshot { expected: u32, actual: u32 },

    /// Execution was aborted (`abort(reason)` was called).
    #[error("aborted: {0}")]
    Aborted(String),

    /// A tool error propagated where the caller chose not to contain it
    /// (e.g. confirmation coordinator plumbing failures).
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Catch-all.
    #[error("{0}")]
    Other(String),
}

impl WeaveError {
    /// Whether a caller might reasonably retry the operation that raised
    /// this error. Abort and spawn-depth errors are never retryable.
    pub fn recoverable(&self) -> bool {
        match self {
            WeaveError::Tool(e) => e.recoverable(),
            WeaveError::StreamError(_) => true,
            _ => false,
        }
    }
}
