//! The discovery/invocation contract an MCP client fulfills, plus the
//! config that shapes which discovered tools get registered under which
//! names. No concrete transport lives here.

use serde::{Deserialize, Serialize};
use weave_types::{ContentBlock, ToolDefinition};

use crate::error::McpError;

/// Filters applied to a discovered tool list before registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    /// Prepended to every registered tool's name, e.g. `"github_"`.
    pub prefix: Option<String>,
    /// If set, only tools whose server-side name appears here are
    /// registered.
    pub include: Option<Vec<String>>,
    /// Tools whose server-side name appears here are never registered,
    /// even if also present in `include`.
    pub exclude: Option<Vec<String>>,
}

impl McpConfig {
    /// Whether `name` (the server-side tool name, before prefixing) passes
    /// this config's include/exclude filters.
    pub fn allows(&self, name: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.iter().any(|n| n == name) {
                return false;
            }
        }
        match &self.include {
            Some(include) => include.iter().any(|n| n == name),
            None => true,
        }
    }

    /// The name a tool is registered under, after applying `prefix`.
    pub fn registered_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{name}"),
            None => name.to_string(),
        }
    }
}

/// Discovers tools from an MCP server and invokes them by name. One
/// implementation per transport/connection; `discover` and `call` share
/// the underlying connection.
#[async_trait::async_trait]
pub trait McpToolSource: Send + Sync {
    /// Enumerate the tools this source currently exposes.
    async fn discover(&self, config: &McpConfig) -> Result<Vec<ToolDefinition>, McpError>;

    /// Invoke a previously discovered tool by its server-side name (not the
    /// registered, possibly prefixed, name).
    async fn call(&self, name: &str, input: serde_json::Value) -> Result<Vec<ContentBlock>, McpError>;
}
