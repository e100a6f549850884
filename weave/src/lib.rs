#![deny(missing_docs)]
//! # weave — umbrella crate
//!
//! A single import surface for the weave agent runtime. Re-exports each
//! constituent crate behind a feature flag, plus a `prelude` for the happy
//! path of building and driving a `Session`.

#[cfg(feature = "core")]
pub use weave_budget;
#[cfg(feature = "core")]
pub use weave_com;
#[cfg(feature = "core")]
pub use weave_compile;
#[cfg(feature = "core")]
pub use weave_confirm;
#[cfg(feature = "core")]
pub use weave_exec;
#[cfg(feature = "hooks")]
pub use weave_hooks;
#[cfg(feature = "mcp")]
pub use weave_mcp;
#[cfg(feature = "core")]
pub use weave_provider;
#[cfg(feature = "session")]
pub use weave_session;
#[cfg(feature = "state-fs")]
pub use weave_state_fs;
#[cfg(feature = "state-memory")]
pub use weave_state_memory;
#[cfg(feature = "core")]
pub use weave_stream;
#[cfg(feature = "core")]
pub use weave_tick;
#[cfg(feature = "core")]
pub use weave_types;

/// Happy-path imports for composing weave agents.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use weave_types::{
        CallId, Content, ContentBlock, ExecutionId, Message, SessionId, SpawnId, StreamEvent,
        StreamEventKind, ToolDefinition, WeaveError,
    };

    #[cfg(feature = "core")]
    pub use weave_com::{Com, AddMessageOpts};

    #[cfg(feature = "core")]
    pub use weave_compile::{Component, ComponentNode, Compiler};

    #[cfg(feature = "core")]
    pub use weave_provider::{Provider, ProviderError, MockProvider};

    #[cfg(feature = "core")]
    pub use weave_tick::{TickEngine, TickEngineConfig, TickOutcome};

    #[cfg(feature = "hooks")]
    pub use weave_hooks::{Hook, HookAction, HookPoint};

    #[cfg(feature = "session")]
    pub use weave_session::{ChildHandle, ExecutionHandle, Session, SessionBuilder};

    #[cfg(feature = "mcp")]
    pub use weave_mcp::{McpConfig, McpToolSource, register_mcp_tools};

    #[cfg(feature = "state-memory")]
    pub use weave_state_memory::MemoryStore;

    #[cfg(feature = "state-fs")]
    pub use weave_state_fs::FsStore;
}
