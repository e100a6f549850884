//! Error type for MCP discovery and invocation, without the transport-layer
//! variants `rmcp` would add (that wire protocol is out of scope here).

/// Failure modes for an `McpToolSource`.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The source failed to enumerate tools from the server.
    #[error("mcp tool discovery failed: {0}")]
    Discovery(String),
    /// A registered MCP tool's invocation failed.
    #[error("mcp tool invocation failed: {0}")]
    Invocation(String),
    /// Connecting to or initializing the MCP server failed.
    #[error("mcp transport error: {0}")]
    Transport(String),
}
