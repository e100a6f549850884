//! COM change events (SPEC_FULL.md §4.A).
//!
//! Published on a `tokio::sync::broadcast` channel rather than a
//! callback-per-event API: observers get a stream they can
//! drop without the mutation path waiting on them. A lagging subscriber sees
//! `RecvError::Lagged` on its next `recv()`; it never blocks `Com`'s mutation
//! methods.

use weave_types::ToolDefinition;

/// A change to the COM, published synchronously with the mutation that
/// caused it.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum ComEvent {
    /// A message was appended to the timeline or system prelude.
    MessageAdded,
    /// The timeline changed shape (added to, cleared, compacted).
    TimelineModified,
    /// A tool was registered.
    ToolRegistered {
        /// The registered tool's canonical name.
        name: String,
        /// Its provider-facing definition, if the tool is model-visible.
        definition: Option<ToolDefinition>,
    },
    /// A tool (and its aliases) was removed.
    ToolRemoved {
        /// The removed tool's canonical name.
        name: String,
    },
    /// A section was created or merged.
    SectionUpdated {
        /// The section id.
        id: String,
    },
    /// A state key changed.
    StateChanged {
        /// The changed key.
        key: String,
    },
    /// `clear()` reset per-tick state.
    StateCleared,
    /// `model_options` changed.
    ModelChanged,
    /// `model_options` was reset to `None`.
    ModelUnset,
    /// Free-form metadata changed.
    MetadataChanged {
        /// The changed key.
        key: String,
    },
    /// A message was queued for the next execution via `queue_message`.
    ExecutionMessage,
}
