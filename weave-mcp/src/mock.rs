//! Deterministic `McpToolSource` for tests, following the same
//! queue-and-pop-front convention as `MockProvider`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use weave_types::{ContentBlock, ToolDefinition};

use crate::client::{McpConfig, McpToolSource};
use crate::error::McpError;

/// An `McpToolSource` that always discovers a fixed tool list and returns
/// canned (or echoed) results for `call`.
pub struct MockMcpToolSource {
    tools: Vec<ToolDefinition>,
    responses: Mutex<HashMap<String, Vec<ContentBlock>>>,
}

impl MockMcpToolSource {
    /// Discover exactly `tools`; `call` echoes the input as text unless a
    /// canned response was set via `with_response`.
    pub fn new(tools: Vec<ToolDefinition>) -> Self {
        Self { tools, responses: Mutex::new(HashMap::new()) }
    }

    /// Pin a canned response for a given server-side tool name.
    pub fn with_response(self, name: impl Into<String>, content: Vec<ContentBlock>) -> Self {
        self.responses.lock().expect("mock mcp source poisoned").insert(name.into(), content);
        self
    }
}

#[async_trait]
impl McpToolSource for MockMcpToolSource {
    async fn discover(&self, _config: &McpConfig) -> Result<Vec<ToolDefinition>, McpError> {
        Ok(self.tools.clone())
    }

    async fn call(&self, name: &str, input: serde_json::Value) -> Result<Vec<ContentBlock>, McpError> {
        if let Some(canned) = self.responses.lock().expect("mock mcp source poisoned").get(name) {
            return Ok(canned.clone());
        }
        Ok(vec![ContentBlock::Text { text: input.to_string() }])
    }
}
