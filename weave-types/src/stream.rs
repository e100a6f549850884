//! Streaming types: `AdapterDelta` (provider-normalized input to the
//! accumulator) and `StreamEvent` (the session-level wire contract,
//! SPEC_FULL.md §6 and §4.F).
//!
//! The concrete shapes are reconstructed from how a `SseParserState`-style
//! streaming accumulator consumes and re-emits `StreamEvent`s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::CallId;
use crate::tool::ToolResult;

/// Token usage for one message or aggregated across a tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub reasoning_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens + self.reasoning_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.reasoning_tokens += other.reasoning_tokens;
    }
}

/// Why the model stopped generating.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Stop,
    Error,
}

/// A normalized, provider-independent stream chunk — the input to the
/// Streaming Accumulator (SPEC_FULL.md glossary: "AdapterDelta").
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AdapterDelta {
    MessageStart,
    Text { index: usize, text: String },
    Reasoning { index: usize, text: String },
    ToolCallStart { index: usize, id: String, name: String },
    ToolCallDelta { index: usize, id: String, delta: String },
    ToolCallEnd { index: usize, id: String },
    /// A complete (non-streamed) tool call, emitted directly.
    ToolCall { index: usize, id: String, name: String, input: serde_json::Value },
    Usage(TokenUsage),
    ContentMetadata { index: usize, metadata: serde_json::Value },
    ReasoningMetadata { index: usize, metadata: serde_json::Value },
    MessageEnd { stop_reason: StopReason },
    Error { message: String, retryable: bool },
    /// Escape hatch for provider-specific passthrough.
    Raw(serde_json::Value),
}

/// The session-level event envelope. `sequence` is assigned by the session
/// emit path, not the accumulator (SPEC_FULL.md §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub id: String,
    pub sequence: u64,
    pub tick: u32,
    pub timestamp: DateTime<Utc>,
    /// Ancestor spawn ids, prepended to as the event bubbles up through
    /// parent sessions (SPEC_FULL.md §4.H).
    pub spawn_path: Vec<String>,
    pub kind: StreamEventKind,
}

impl StreamEvent {
    /// Construct an event with sequence 0 and an empty spawn path; the
    /// session emit path stamps the real sequence and prepends spawn ids.
    pub fn new(tick: u32, kind: StreamEventKind) -> Self {
        Self {
            id: uuid_like(),
            sequence: 0,
            tick,
            timestamp: Utc::now(),
            spawn_path: Vec::new(),
            kind,
        }
    }
}

/// A minimal, dependency-free unique-enough id generator for event ids —
/// this is not exposed as an identifier type (see `weave-types::id`) because
/// stream event ids are opaque logging handles, not protocol-level
/// identifiers anything keys state off.
fn uuid_like() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("evt_{n:016x}")
}

/// The reconstructed assistant message carried by the final `message` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructedMessage {
    pub reasoning: Vec<String>,
    pub text: Vec<String>,
    pub tool_calls: Vec<(String, String, serde_json::Value)>,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
}

/// The wire contract's event kinds (SPEC_FULL.md §6).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEventKind {
    MessageStart,
    ContentStart { index: usize },
    ContentDelta { index: usize, delta: String },
    ContentEnd { index: usize },
    ReasoningStart { index: usize },
    ReasoningDelta { index: usize, delta: String },
    ReasoningEnd { index: usize },
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, delta: String },
    ToolCallEnd { id: String, input: serde_json::Value },
    ToolCall { id: String, name: String, input: serde_json::Value },
    ToolResultStart { id: String },
    ToolResult(ToolResult),
    ToolConfirmationRequired {
        call_id: CallId,
        tool_name: String,
        message: String,
        metadata: serde_json::Value,
    },
    ToolConfirmationResult { call_id: CallId, confirmed: bool },
    SpawnStart { spawn_id: String, label: Option<String> },
    SpawnEnd { spawn_id: String, is_error: bool, output: Option<String> },
    Usage(TokenUsage),
    MessageEnd { stop_reason: StopReason },
    Message(ReconstructedMessage),
    Error { message: String },
}
