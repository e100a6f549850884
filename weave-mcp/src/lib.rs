#![deny(missing_docs)]
//! MCP integration (SPEC_FULL.md §4.I): discovering tools from a Model
//! Context Protocol server and registering them into a `Com` as ordinary
//! tools. Transport is explicitly out of scope — `McpToolSource` is the
//! seam a real `rmcp`-backed client would plug into; this crate ships only
//! the trait, the registration glue, and a deterministic mock.

mod bridge;
mod client;
mod error;
mod mock;

pub use bridge::{McpToolBridge, register_mcp_tools};
pub use client::{McpConfig, McpToolSource};
pub use error::McpError;
pub use mock::MockMcpToolSource;
