#![deny(missing_docs)]
//! The tool executor (SPEC_FULL.md §4.E): resolves a tool call, runs
//! pre-execution confirmation, routes by `ToolKind`, retries once through
//! sandbox recovery, and classifies failures into `ToolError`.
//!
//! Combines a confirm-then-run-then-classify dispatch shape, a `Next`
//! middleware chain (`middleware.rs`), and `futures::future::join_all` for
//! parallel tool-call dispatch.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use weave_com::Com;
use weave_confirm::{ConfirmationCoordinator, ConfirmationResolution};
use weave_types::{ContentBlock, ExecutableTool, ToolContext, ToolError, ToolKind, ToolResult};

mod client;
mod middleware;

pub use client::{ClientToolCoordinator, DEFAULT_CLIENT_TOOL_TIMEOUT};
pub use middleware::{Next, ToolCall, ToolMiddleware};

/// Runs tool calls to completion: confirmation, routing, sandbox recovery,
/// and parallel-or-sequential dispatch across a batch.
pub struct ToolExecutor {
    middleware: Vec<Arc<dyn ToolMiddleware>>,
    confirm: Arc<ConfirmationCoordinator>,
    client_tools: Arc<ClientToolCoordinator>,
}

impl ToolExecutor {
    /// Build an executor sharing the given confirmation coordinator (the
    /// same instance the session's confirmation-response API resolves
    /// against) and a fresh client-tool coordinator.
    pub fn new(confirm: Arc<ConfirmationCoordinator>) -> Self {
        Self { middleware: Vec::new(), confirm, client_tools: Arc::new(ClientToolCoordinator::new()) }
    }

    /// Share access to the client-tool coordinator, e.g. so a session's
    /// `submit_client_tool_result` API can resolve waiting calls.
    pub fn client_tools(&self) -> Arc<ClientToolCoordinator> {
        self.client_tools.clone()
    }

    /// Append a middleware to the end of the chain (runs closest to the
    /// tool itself).
    pub fn with_middleware(mut self, mw: Arc<dyn ToolMiddleware>) -> Self {
        self.middleware.push(mw);
        self
    }

    /// Run the full `processToolWithConfirmation` pipeline for one call.
    pub async fn process_tool_with_confirmation(&self, com: &Com, call: ToolCall, cancellation: CancellationToken) -> ToolResult {
        let tool = match com.get_tool(&call.name).or_else(|| com.get_tool_by_alias(&call.name)) {
            Some(tool) => tool,
            None => return ToolResult::failed(call.id, call.name, &ToolError::NotFound(String::new())),
        };

        if tool.requires_confirmation().evaluate(&call.input) {
            match self.await_confirmation(&call).await {
                ConfirmationResolution::Denied | ConfirmationResolution::Cancelled => {
                    return ToolResult::denied(call.id, call.name);
                }
                ConfirmationResolution::Approved { .. } => {}
            }
        }

        let ctx = ToolContext {
            call_id: call.id.clone(),
            cancellation,
            metadata: serde_json::json!({ "toolCallId": call.id.as_str() }),
        };

        match self.dispatch(tool.as_ref(), &call, &ctx).await {
            Ok(content) => ToolResult::ok(call.id, call.name, content),
            Err(err) => match err.as_sandbox().cloned() {
                Some(sandbox) => match self.recover_from_sandbox_error(tool.as_ref(), &call, &ctx, &sandbox).await {
                    Some(result) => result,
                    None => ToolResult::failed(call.id, call.name, &err),
                },
                None => ToolResult::failed(call.id, call.name, &err),
            },
        }
    }

    /// Dispatch every call in a batch, concurrently if `parallel` (opt-in
    /// per SPEC_FULL.md §5), sequentially otherwise.
    pub async fn dispatch_batch(&self, com: &Com, calls: Vec<ToolCall>, cancellation: CancellationToken, parallel: bool) -> Vec<ToolResult> {
        if parallel {
            let futures = calls.into_iter().map(|call| self.process_tool_with_confirmation(com, call, cancellation.clone()));
            futures::future::join_all(futures).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.process_tool_with_confirmation(com, call, cancellation.clone()).await);
            }
            results
        }
    }

    async fn await_confirmation(&self, call: &ToolCall) -> ConfirmationResolution {
        let rx = self.confirm.wait_for_confirmation(call.id.clone(), &call.name);
        rx.await.unwrap_or(ConfirmationResolution::Cancelled)
    }

    async fn dispatch(&self, tool: &dyn ExecutableTool, call: &ToolCall, ctx: &ToolContext) -> Result<Vec<ContentBlock>, ToolError> {
        match tool.kind() {
            ToolKind::Provider => Err(ToolError::InvalidExecutionType(call.name.clone())),
            ToolKind::Client => self.dispatch_client(tool, call).await,
            ToolKind::Server | ToolKind::Mcp => Next::new(tool, &self.middleware).run(call, ctx).await,
        }
    }

    async fn dispatch_client(&self, tool: &dyn ExecutableTool, call: &ToolCall) -> Result<Vec<ContentBlock>, ToolError> {
        if !tool.requires_response() {
            return Ok(tool.default_result().unwrap_or_default());
        }
        let rx = self.client_tools.wait_for_result(call.id.clone());
        let timeout = tool.timeout().unwrap_or(DEFAULT_CLIENT_TOOL_TIMEOUT);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ToolError::ClientToolError(format!("client disconnected before answering {}", call.name))),
            Err(_) => Err(ToolError::ClientToolError(format!("client tool {} timed out after {:?}", call.name, timeout))),
        }
    }

    /// Sandbox-access recovery (SPEC_FULL.md §4.E.4): confirm with the user,
    /// run the handler's `recover` closure, retry the call exactly once, run
    /// any cleanup it returned.
    async fn recover_from_sandbox_error(
        &self,
        tool: &dyn ExecutableTool,
        call: &ToolCall,
        ctx: &ToolContext,
        sandbox: &weave_types::SandboxError,
    ) -> Option<ToolResult> {
        let recover = sandbox.recover.clone()?;

        let always = match self.await_confirmation(call).await {
            ConfirmationResolution::Approved { always } => always,
            _ => return Some(ToolResult::denied(call.id.clone(), call.name.clone())),
        };

        let cleanup = match recover(always).await {
            Ok(cleanup) => cleanup,
            Err(err) => return Some(ToolResult::failed(call.id.clone(), call.name.clone(), &err)),
        };

        let retried = self.dispatch(tool, call, ctx).await;
        if let Some(cleanup) = cleanup {
            cleanup();
        }

        Some(match retried {
            Ok(content) => ToolResult::ok(call.id.clone(), call.name.clone(), content),
            Err(err) => ToolResult::failed(call.id.clone(), call.name.clone(), &err),
        })
    }
}
