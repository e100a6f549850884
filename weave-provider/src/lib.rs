#![deny(missing_docs)]
//! The model adapter contract (SPEC_FULL.md §6).
//!
//! [`Provider`] is an RPITIT-shaped trait, intentionally *not* object-safe.
//! `weave-tick`'s tick engine is generic over `P: Provider` — there is no
//! dynamic dispatch boundary here, only one concrete provider type per
//! session.

use std::future::Future;

use futures::Stream;
use weave_types::{AdapterDelta, CompiledStructure, ToolDefinition};

mod mock;
pub use mock::MockProvider;

/// Errors raised by a model adapter (SPEC_FULL.md §7's stream-level errors).
///
/// Carries an `.recoverable()` convention (renamed from the more common
/// `is_retryable` spelling to match this workspace's other error types).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The request to the backend failed (network, HTTP, transport).
    #[error("request failed: {0}")]
    RequestFailed(String),
    /// The backend rate-limited the request.
    #[error("rate limited")]
    RateLimited,
    /// Authentication or authorization failed.
    #[error("auth failed: {0}")]
    AuthFailed(String),
    /// The backend's response could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Catch-all for anything else.
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Whether retrying the request might succeed.
    pub fn recoverable(&self) -> bool {
        matches!(self, ProviderError::RateLimited | ProviderError::RequestFailed(_))
    }
}

/// How a capability affects rendering of events/ephemerals for this
/// provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredRenderer {
    /// Render collapsible/structured content as Markdown.
    Markdown,
    /// Render collapsible/structured content as XML-like tags.
    Xml,
}

/// A named capability a provider declares, optionally carrying rendering
/// guidance for events/ephemerals.
#[derive(Debug, Clone)]
pub struct Capability {
    /// Capability name (e.g. `"tool_use"`, `"reasoning"`, `"vision"`).
    pub name: String,
    /// Preferred renderer for collapsible content, if this capability cares.
    pub preferred_renderer: Option<PreferredRenderer>,
}

/// Static metadata describing a model adapter (SPEC_FULL.md §6).
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    /// Adapter identifier, e.g. `"claude-sonnet"`.
    pub id: String,
    /// Provider/vendor name, e.g. `"anthropic"`.
    pub provider: String,
    /// Declared capabilities.
    pub capabilities: Vec<Capability>,
    /// Maximum context window in tokens, if known.
    pub context_window: Option<u32>,
    /// Maximum output tokens per generation, if known.
    pub max_output_tokens: Option<u32>,
}

/// The provider-facing request built from a tick's `CompiledStructure`.
#[derive(Debug, Clone)]
pub struct ModelInput {
    /// System-prelude entries.
    pub system: Vec<weave_types::TimelineEntry>,
    /// Conversation timeline entries.
    pub timeline: Vec<weave_types::TimelineEntry>,
    /// Tool definitions available to the model this tick.
    pub tools: Vec<ToolDefinition>,
    /// Provider-specific passthrough options, if any.
    pub provider_options: Option<serde_json::Value>,
}

/// The non-streamed result of a `generate` call.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// The reconstructed assistant message.
    pub message: weave_types::ReconstructedMessage,
}

/// A model adapter. Generic callers hold a concrete `P: Provider`; this
/// trait is intentionally not object-safe (RPITIT).
pub trait Provider: Send + Sync {
    /// Static metadata about this adapter.
    fn metadata(&self) -> &ProviderMetadata;

    /// Derive the provider-facing request from a tick's compiled structure.
    fn from_engine_state(&self, compiled: &CompiledStructure) -> ModelInput {
        ModelInput {
            system: compiled.system.clone(),
            timeline: compiled.timeline_entries.clone(),
            tools: compiled.tools.clone(),
            provider_options: None,
        }
    }

    /// Non-streaming completion.
    fn generate(&self, input: ModelInput) -> impl Future<Output = Result<ModelOutput, ProviderError>> + Send;

    /// Streaming completion, yielding normalized `AdapterDelta` chunks that
    /// `weave-stream`'s accumulator turns into `StreamEvent`s.
    fn stream(&self, input: ModelInput) -> impl Stream<Item = AdapterDelta> + Send;
}
