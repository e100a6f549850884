//! The tool contract (SPEC_FULL.md §6, §4.E).
//!
//! `ExecutableTool` is the object-safe trait every tool implements —
//! object-safety matters here because the COM stores heterogeneous tools
//! behind `Arc<dyn ExecutableTool>` in a single registry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::content::{Content, ContentBlock};
use crate::id::CallId;

/// How a tool call is routed for execution.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Executed in-process by the runtime.
    Server,
    /// Executed by the client (UI); may or may not expect a response.
    Client,
    /// Discovered and proxied through MCP.
    Mcp,
    /// Handled inside the model adapter itself (e.g. provider-native tools).
    Provider,
}

/// What a tool call is "for" — informs rendering/collapsing decisions the
/// compiler applies to its result, not enforced here.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolIntent {
    /// Produces content meant to be displayed.
    Render,
    /// Performs a side effect.
    Action,
    /// Pure computation.
    Compute,
}

/// Who can see a tool. `User`-only tools are dispatchable but hidden from
/// the model's tool list (SPEC_FULL.md §3 invariant).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Visible to the model and dispatchable.
    Model,
    /// Dispatchable only; hidden from `toolDefinitions`.
    User,
    /// Visible and dispatchable.
    All,
}

/// Provider-facing tool definition — the JSON-schema form the compiler
/// derives from a registered `ExecutableTool` exactly once per compile pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Canonical tool name.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON-schema for the input shape.
    pub input_schema: serde_json::Value,
    /// JSON-schema for the output shape, if declared.
    pub output_schema: Option<serde_json::Value>,
    /// Alternate names that resolve to this tool.
    pub aliases: Vec<String>,
    /// Provider-specific passthrough options.
    pub provider_options: Option<serde_json::Value>,
}

/// Per-call execution context handed to `ExecutableTool::run`.
#[derive(Clone)]
pub struct ToolContext {
    /// The call this invocation is answering.
    pub call_id: CallId,
    /// Cooperative cancellation — tool handlers should poll this at
    /// suspension points (SPEC_FULL.md §5).
    pub cancellation: CancellationToken,
    /// Free-form per-call metadata (`{toolCallId}` at minimum).
    pub metadata: serde_json::Value,
}

/// A function that cleans up after a sandbox-access recovery retry.
pub type CleanupFn = Box<dyn FnOnce() + Send>;

/// A function that attempts sandbox-access recovery; returns an optional
/// cleanup to run after the retried handler completes (SPEC_FULL.md §4.E.4).
pub type RecoverFn = Arc<
    dyn Fn(bool) -> Pin<Box<dyn Future<Output = Result<Option<CleanupFn>, ToolError>> + Send>>
        + Send
        + Sync,
>;

/// Raised by a tool handler when it hits a sandboxed-path violation it can
/// recover from given user approval.
#[derive(Clone)]
pub struct SandboxError {
    /// The path as requested by the caller.
    pub requested_path: String,
    /// The path after resolution (symlinks, chroot, etc.).
    pub resolved_path: String,
    /// Access mode that was denied (`"read"`, `"write"`, ...).
    pub mode: String,
    /// Recovery closure, if the handler can recover given approval.
    pub recover: Option<RecoverFn>,
}

impl std::fmt::Debug for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxError")
            .field("requested_path", &self.requested_path)
            .field("resolved_path", &self.resolved_path)
            .field("mode", &self.mode)
            .field("recover", &self.recover.is_some())
            .finish()
    }
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sandbox access denied: {} ({} -> {})",
            self.mode, self.requested_path, self.resolved_path
        )
    }
}

impl std::error::Error for SandboxError {}

/// Error categories a tool handler (or the executor) can raise.
///
/// Maps 1:1 onto SPEC_FULL.md §7's error kinds that are tool-scoped.
/// `.recoverable()` implements the NETWORK|TIMEOUT|RATE_LIMIT rule.
#[non_exhaustive]
#[derive(Debug, thiserror::Error, Clone)]
pub enum ToolError {
    /// No tool registered under this name (`TOOL_NOT_FOUND`).
    #[error("tool not found: {0}")]
    NotFound(String),
    /// A `Provider`-kind tool was routed to the executor (`INVALID_EXECUTION_TYPE`).
    #[error("tool {0} has execution type PROVIDER and must be handled by the model adapter")]
    InvalidExecutionType(String),
    /// Tool is registered but has no `run` handler (`TOOL_NO_HANDLER`).
    #[error("tool {0} has no handler")]
    NoHandler(String),
    /// Handler did not return a content block array (`INVALID_RETURN_TYPE`).
    #[error("tool {0} returned a non-array result")]
    InvalidReturnType(String),
    /// A returned block lacked a recognizable `.type` (`INVALID_CONTENT_BLOCK`).
    #[error("tool {0} returned an invalid content block")]
    InvalidContentBlock(String),
    /// Client tool timed out or errored (`CLIENT_TOOL_ERROR`).
    #[error("client tool error: {0}")]
    ClientToolError(String),
    /// Sandboxed path access was denied (`SANDBOX_ACCESS`).
    #[error(transparent)]
    SandboxAccess(#[from] SandboxErrorWrapper),
    /// Transient network failure (`NETWORK_ERROR`, recoverable).
    #[error("network error: {0}")]
    Network(String),
    /// Provider rate limit (`RATE_LIMIT_ERROR`, recoverable).
    #[error("rate limited: {0}")]
    RateLimit(String),
    /// Denied by a guard/policy hook (`GUARD_DENIED`, never recoverable).
    #[error("denied: {0}")]
    GuardDenied(String),
    /// Authentication/authorization failure (`AUTH_ERROR`).
    #[error("auth error: {0}")]
    Auth(String),
    /// Input failed validation (`VALIDATION_ERROR`).
    #[error("validation error: {0}")]
    Validation(String),
    /// Handler exceeded its timeout (`TIMEOUT_ERROR`, recoverable).
    #[error("timeout: {0}")]
    Timeout(String),
    /// Execution was aborted (`ABORT_ERROR`, never retried).
    #[error("aborted: {0}")]
    Abort(String),
    /// Application-level failure raised by the handler itself.
    #[error("application error: {0}")]
    Application(String),
    /// Anything that doesn't classify.
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Newtype so `SandboxError` (which carries a non-`Eq`, non-serializable
/// closure) can participate in `#[from]` without forcing `ToolError` itself
/// to carry the closure inline in its `Display` impl.
#[derive(Debug, Clone)]
pub struct SandboxErrorWrapper(pub SandboxError);

impl std::fmt::Display for SandboxErrorWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SandboxErrorWrapper {}

impl ToolError {
    /// Whether the executor should consider this error retryable by the
    /// caller (SPEC_FULL.md §4.E.6): network, timeout, and rate-limit only.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            ToolError::Network(_) | ToolError::Timeout(_) | ToolError::RateLimit(_)
        )
    }

    /// Extract the underlying `SandboxError`, if this is a sandbox-access
    /// failure with a recovery closure attached.
    pub fn as_sandbox(&self) -> Option<&SandboxError> {
        match self {
            ToolError::SandboxAccess(w) => Some(&w.0),
            _ => None,
        }
    }
}

/// Outcome of a tool call, structurally identical whether it succeeded,
/// was denied, or errored (SPEC_FULL.md §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The `callId` this result answers.
    pub tool_use_id: CallId,
    /// Tool name (post-alias-resolution).
    pub name: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Result content (empty on failure unless the handler attached detail).
    pub content: Vec<ContentBlock>,
    /// Human-readable error description, set iff `!success`.
    pub error: Option<String>,
}

impl ToolResult {
    /// Build the canonical denial result text.
    pub fn denied(tool_use_id: CallId, name: impl Into<String>) -> Self {
        Self {
            tool_use_id,
            name: name.into(),
            success: false,
            content: vec![ContentBlock::Text {
                text: "Tool execution was denied by user.".to_string(),
            }],
            error: Some("denied".to_string()),
        }
    }

    /// Build an error result from a classified `ToolError`.
    pub fn failed(tool_use_id: CallId, name: impl Into<String>, err: &ToolError) -> Self {
        Self {
            tool_use_id,
            name: name.into(),
            success: false,
            content: vec![ContentBlock::Text {
                text: err.to_string(),
            }],
            error: Some(err.to_string()),
        }
    }

    /// Build a success result from handler output.
    pub fn ok(tool_use_id: CallId, name: impl Into<String>, content: Vec<ContentBlock>) -> Self {
        Self {
            tool_use_id,
            name: name.into(),
            success: true,
            content,
            error: None,
        }
    }

    /// Convert to the nested `Content` shape used by `ContentBlock::ToolResult`
    /// when the result is fed back into the timeline.
    pub fn as_content(&self) -> Content {
        Content::Blocks(self.content.clone())
    }
}

/// Whether a tool requires confirmation — either a fixed answer or a
/// per-input predicate (SPEC_FULL.md §4.E.2).
#[derive(Clone)]
pub enum RequiresConfirmation {
    /// Always/never requires confirmation.
    Fixed(bool),
    /// Evaluated against the call input at dispatch time.
    Dynamic(Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>),
}

impl Default for RequiresConfirmation {
    fn default() -> Self {
        RequiresConfirmation::Fixed(false)
    }
}

impl RequiresConfirmation {
    /// Evaluate against a call's input.
    pub fn evaluate(&self, input: &serde_json::Value) -> bool {
        match self {
            RequiresConfirmation::Fixed(b) => *b,
            RequiresConfirmation::Dynamic(f) => f(input),
        }
    }
}

/// An executable tool, object-safe so the COM can store heterogeneous tools
/// behind `Arc<dyn ExecutableTool>`.
#[async_trait::async_trait]
pub trait ExecutableTool: Send + Sync {
    /// Canonical tool name.
    fn name(&self) -> &str;
    /// Description shown to the model.
    fn description(&self) -> &str;
    /// JSON-schema for the input shape.
    fn input_schema(&self) -> serde_json::Value;
    /// JSON-schema for the output shape, if declared.
    fn output_schema(&self) -> Option<serde_json::Value> {
        None
    }
    /// How this tool is routed for execution.
    fn kind(&self) -> ToolKind {
        ToolKind::Server
    }
    /// What the tool call is "for".
    fn intent(&self) -> ToolIntent {
        ToolIntent::Action
    }
    /// Alternate names.
    fn aliases(&self) -> &[String] {
        &[]
    }
    /// Who can see/dispatch this tool.
    fn audience(&self) -> Audience {
        Audience::All
    }
    /// For `Client` tools: whether the caller must wait for a response.
    fn requires_response(&self) -> bool {
        true
    }
    /// Execution timeout, if any (client tools default to 30s per §4.E.3).
    fn timeout(&self) -> Option<Duration> {
        None
    }
    /// Synchronous result returned for `Client` tools with
    /// `requires_response() == false`.
    fn default_result(&self) -> Option<Vec<ContentBlock>> {
        None
    }
    /// Whether this call requires user confirmation before dispatch.
    fn requires_confirmation(&self) -> RequiresConfirmation {
        RequiresConfirmation::default()
    }
    /// Human-readable confirmation prompt.
    fn confirmation_message(&self, _input: &serde_json::Value) -> Option<String> {
        None
    }
    /// Build a preview of the call for the confirmation prompt. Errors are
    /// swallowed by the caller, which falls back to the raw input.
    fn preview(&self, input: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        Ok(input.clone())
    }
    /// Invoke the tool.
    async fn run(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<Vec<ContentBlock>, ToolError>;
}

/// Provider-facing definition derived from a registered tool, used by
/// `weave-com` to build `toolDefinitions`.
pub fn definition_of(tool: &dyn ExecutableTool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: tool.input_schema(),
        output_schema: tool.output_schema(),
        aliases: tool.aliases().to_vec(),
        provider_options: None,
    }
}
