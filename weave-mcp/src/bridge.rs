//! Bridges a discovered MCP tool to `weave_types::ExecutableTool` and
//! registers it into a `Com`, honoring an `McpConfig`'s filters.

use std::sync::Arc;

use async_trait::async_trait;
use weave_com::Com;
use weave_types::{Audience, ContentBlock, ExecutableTool, ToolContext, ToolDefinition, ToolError, ToolKind};

use crate::client::{McpConfig, McpToolSource};
use crate::error::McpError;

/// Wraps one discovered MCP tool, forwarding `run` to its owning source's
/// `call`. The tool's registered name may differ from its server-side name
/// once an `McpConfig` prefix is applied; `server_name` preserves the
/// original for the `call` round-trip.
pub struct McpToolBridge {
    source: Arc<dyn McpToolSource>,
    server_name: String,
    definition: ToolDefinition,
}

impl McpToolBridge {
    /// Wrap `definition` (as registered under `registered_name`) for calls
    /// back through `source`.
    pub fn new(source: Arc<dyn McpToolSource>, server_name: String, mut definition: ToolDefinition, registered_name: String) -> Self {
        definition.name = registered_name;
        Self { source, server_name, definition }
    }
}

#[async_trait]
impl ExecutableTool for McpToolBridge {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.definition.input_schema.clone()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Mcp
    }

    fn audience(&self) -> Audience {
        Audience::Model
    }

    fn aliases(&self) -> &[String] {
        &self.definition.aliases
    }

    async fn run(&self, input: serde_json::Value, _ctx: &ToolContext) -> Result<Vec<ContentBlock>, ToolError> {
        self.source
            .call(&self.server_name, input)
            .await
            .map_err(|e| ToolError::Application(e.to_string()))
    }
}

/// Discover `source`'s tools and register the ones `config` allows into
/// `com`, via the same `add_tool` path components use. Returns the number
/// of tools registered.
pub async fn register_mcp_tools(com: &mut Com, source: Arc<dyn McpToolSource>, config: &McpConfig) -> Result<usize, McpError> {
    let discovered = source.discover(config).await?;
    let mut registered = 0;
    for definition in discovered {
        if !config.allows(&definition.name) {
            continue;
        }
        let server_name = definition.name.clone();
        let registered_name = config.registered_name(&server_name);
        let bridge = McpToolBridge::new(Arc::clone(&source), server_name, definition, registered_name);
        com.add_tool(Arc::new(bridge));
        registered += 1;
    }
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockMcpToolSource;

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: serde_json::json!({}),
            output_schema: None,
            aliases: vec![],
            provider_options: None,
        }
    }

    #[tokio::test]
    async fn registers_every_discovered_tool_with_no_filters() {
        let source: Arc<dyn McpToolSource> = Arc::new(MockMcpToolSource::new(vec![def("search"), def("fetch")]));
        let mut com = Com::new();
        let n = register_mcp_tools(&mut com, source, &McpConfig::default()).await.unwrap();
        assert_eq!(n, 2);
        assert!(com.get_tool("search").is_some());
        assert!(com.get_tool("fetch").is_some());
    }

    #[tokio::test]
    async fn prefix_is_applied_to_registered_names() {
        let source: Arc<dyn McpToolSource> = Arc::new(MockMcpToolSource::new(vec![def("search")]));
        let mut com = Com::new();
        let config = McpConfig { prefix: Some("gh_".into()), ..Default::default() };
        register_mcp_tools(&mut com, source, &config).await.unwrap();
        assert!(com.get_tool("gh_search").is_some());
        assert!(com.get_tool("search").is_none());
    }

    #[tokio::test]
    async fn exclude_filters_out_named_tools() {
        let source: Arc<dyn McpToolSource> = Arc::new(MockMcpToolSource::new(vec![def("search"), def("delete_repo")]));
        let mut com = Com::new();
        let config = McpConfig { exclude: Some(vec!["delete_repo".into()]), ..Default::default() };
        let n = register_mcp_tools(&mut com, source, &config).await.unwrap();
        assert_eq!(n, 1);
        assert!(com.get_tool("delete_repo").is_none());
    }

    #[tokio::test]
    async fn include_allowlists_tools() {
        let source: Arc<dyn McpToolSource> = Arc::new(MockMcpToolSource::new(vec![def("search"), def("fetch")]));
        let mut com = Com::new();
        let config = McpConfig { include: Some(vec!["search".into()]), ..Default::default() };
        let n = register_mcp_tools(&mut com, source, &config).await.unwrap();
        assert_eq!(n, 1);
        assert!(com.get_tool("search").is_some());
        assert!(com.get_tool("fetch").is_none());
    }

    #[tokio::test]
    async fn invoking_the_bridged_tool_forwards_to_the_source() {
        let source: Arc<dyn McpToolSource> = Arc::new(MockMcpToolSource::new(vec![def("echo")]));
        let mut com = Com::new();
        register_mcp_tools(&mut com, source, &McpConfig::default()).await.unwrap();
        let tool = com.get_tool("echo").unwrap();
        let ctx = ToolContext { call_id: weave_types::CallId::new("c1"), cancellation: tokio_util::sync::CancellationToken::new(), metadata: serde_json::json!({}) };
        let result = tool.run(serde_json::json!({"q": "hi"}), &ctx).await.unwrap();
        assert_eq!(result.len(), 1);
    }
}
