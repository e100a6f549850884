//! Tool middleware chain: an axum-`from_fn`-style `ToolMiddleware`/`Next`
//! chain wrapping `ExecutableTool::run`.

use std::sync::Arc;

use async_trait::async_trait;
use weave_types::{ContentBlock, ExecutableTool, ToolContext, ToolError};

/// A tool call in flight through the middleware chain.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// The call id (shared with confirmation/result events).
    pub id: weave_types::CallId,
    /// Name of the tool being called (post-alias-resolution).
    pub name: String,
    /// JSON input arguments.
    pub input: serde_json::Value,
}

/// Middleware that wraps tool execution: inspect/modify the call, short
/// circuit, or inspect/modify the result.
#[async_trait]
pub trait ToolMiddleware: Send + Sync {
    /// Process a call, optionally delegating to the next middleware/tool via
    /// `next.run(...)`.
    async fn process(&self, call: &ToolCall, ctx: &ToolContext, next: Next<'_>) -> Result<Vec<ContentBlock>, ToolError>;
}

/// The remaining middleware chain plus the underlying tool. Consumed on
/// `run` to prevent double-invoke.
pub struct Next<'a> {
    tool: &'a dyn ExecutableTool,
    middleware: &'a [Arc<dyn ToolMiddleware>],
}

impl<'a> Next<'a> {
    /// Build a `Next` over the given tool and remaining middleware slice.
    pub fn new(tool: &'a dyn ExecutableTool, middleware: &'a [Arc<dyn ToolMiddleware>]) -> Self {
        Self { tool, middleware }
    }

    /// Continue the chain, eventually invoking the tool itself.
    pub async fn run(self, call: &ToolCall, ctx: &ToolContext) -> Result<Vec<ContentBlock>, ToolError> {
        if let Some((head, tail)) = self.middleware.split_first() {
            let next = Next::new(self.tool, tail);
            head.process(call, ctx, next).await
        } else {
            self.tool.run(call.input.clone(), ctx).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use weave_types::{Audience, ToolKind};

    struct EchoTool;

    #[async_trait]
    impl ExecutableTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn kind(&self) -> ToolKind {
            ToolKind::Server
        }
        fn audience(&self) -> Audience {
            Audience::All
        }
        async fn run(&self, input: serde_json::Value, _ctx: &ToolContext) -> Result<Vec<ContentBlock>, ToolError> {
            Ok(vec![ContentBlock::Text { text: input.to_string() }])
        }
    }

    struct CountingMiddleware(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    #[async_trait]
    impl ToolMiddleware for CountingMiddleware {
        async fn process(&self, call: &ToolCall, ctx: &ToolContext, next: Next<'_>) -> Result<Vec<ContentBlock>, ToolError> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            next.run(call, ctx).await
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl ToolMiddleware for ShortCircuit {
        async fn process(&self, _call: &ToolCall, _ctx: &ToolContext, _next: Next<'_>) -> Result<Vec<ContentBlock>, ToolError> {
            Err(ToolError::GuardDenied("blocked by policy".to_string()))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext { call_id: weave_types::CallId::new("c1"), cancellation: CancellationToken::new(), metadata: serde_json::json!({}) }
    }

    #[tokio::test]
    async fn chain_runs_middleware_in_order_then_the_tool() {
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let chain: Vec<Arc<dyn ToolMiddleware>> = vec![Arc::new(CountingMiddleware(count.clone())), Arc::new(CountingMiddleware(count.clone()))];
        let tool = EchoTool;
        let call = ToolCall { id: weave_types::CallId::new("c1"), name: "echo".into(), input: serde_json::json!({"x": 1}) };
        let result = Next::new(&tool, &chain).run(&call, &ctx()).await.unwrap();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(!result.is_empty());
    }

    #[tokio::test]
    async fn a_middleware_can_short_circuit_before_the_tool_runs() {
        let chain: Vec<Arc<dyn ToolMiddleware>> = vec![Arc::new(ShortCircuit)];
        let tool = EchoTool;
        let call = ToolCall { id: weave_types::CallId::new("c1"), name: "echo".into(), input: serde_json::json!({}) };
        let err = Next::new(&tool, &chain).run(&call, &ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::GuardDenied(_)));
    }
}
