//! Content types that cross every boundary: COM, compiled structure, stream
//! events, tool results.
//!
//! An untagged `Content` wrapper over a tagged `ContentBlock` enum, extended
//! with `Reasoning` and `Document` variants needed by the streaming
//! accumulator's `AdapterDelta::reasoning` case.

use serde::{Deserialize, Serialize};

/// The universal content type. Crosses every boundary.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content.
    Text(String),
    /// Structured content blocks.
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Create a text content value.
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    /// Extract plain text content, ignoring non-text blocks.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Blocks(blocks) => blocks.iter().find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }
}

/// A single block of structured content.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// Plain text block.
    #[serde(rename = "text")]
    Text {
        /// The text content.
        text: String,
    },

    /// Model reasoning/thinking content, kept separate from `text` so the
    /// streaming accumulator can reconstruct `reasoning` and `text` blocks
    /// independently in the final synthetic `message` event.
    #[serde(rename = "reasoning")]
    Reasoning {
        /// The reasoning text.
        text: String,
    },

    /// Image content block.
    #[serde(rename = "image")]
    Image {
        /// The image source (base64 or URL).
        source: ImageSource,
        /// The MIME type of the image.
        media_type: String,
    },

    /// A document attachment (PDF, etc.) passed through opaquely.
    #[serde(rename = "document")]
    Document {
        /// The document source.
        source: ImageSource,
        /// The MIME type of the document.
        media_type: String,
    },

    /// A tool use request from the model.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// Unique identifier for this tool use (equals the call's `CallId`).
        id: String,
        /// Name of the tool to invoke.
        name: String,
        /// Tool input parameters.
        input: serde_json::Value,
    },

    /// Result from a tool execution.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// The tool_use id this result corresponds to.
        tool_use_id: String,
        /// The result content, itself nested content (token annotation
        /// recurses into this per the compiler's annotation rules).
        content: Box<Content>,
        /// Whether the tool execution errored.
        is_error: bool,
    },

    /// Escape hatch for future content types.
    #[serde(rename = "custom")]
    Custom {
        /// The custom content type identifier.
        content_type: String,
        /// Arbitrary payload.
        data: serde_json::Value,
    },
}

/// Source for image/document content.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Base64-encoded data.
    Base64 {
        /// The base64-encoded data.
        data: String,
    },
    /// URL pointing to the asset.
    Url {
        /// The URL.
        url: String,
    },
}
