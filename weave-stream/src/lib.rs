#![deny(missing_docs)]
//! Streaming accumulator (SPEC_FULL.md §4.F).
//!
//! Built around an `SseParserState`-style accumulator
//! (`text_buf`/`thinking_buf`/`tool_uses: HashMap<usize,
//! ToolUseInProgress>`). That shape turns raw Anthropic
//! SSE framing into `StreamEvent`s in one step; this crate generalizes the
//! same accumulator shape one layer up, consuming the already-normalized
//! `AdapterDelta` (the wire-framing step is a concrete-provider concern,
//! explicitly out of scope) and producing the session-level `StreamEvent`
//! wire contract.
//!
//! Index-keyed buffers use a `BTreeMap` so the final reconstructed message
//! orders blocks deterministically by their stream index without a separate
//! sort pass.

use std::collections::BTreeMap;

use async_stream::stream;
use futures::Stream;
use weave_types::{AdapterDelta, ReconstructedMessage, StopReason, StreamEvent, StreamEventKind, TokenUsage};

struct ToolUseInProgress {
    id: String,
    name: String,
    input_buf: String,
}

/// Accumulates one model turn's worth of `AdapterDelta`s into `StreamEvent`s.
///
/// `sequence` on the emitted events is left at the placeholder `0` — the
/// session emit path stamps the real monotonic sequence number and prepends
/// `spawn_path`, per SPEC_FULL.md §4.F.
struct Accumulator {
    tick: u32,
    text: BTreeMap<usize, String>,
    reasoning: BTreeMap<usize, String>,
    open_text: std::collections::BTreeSet<usize>,
    open_reasoning: std::collections::BTreeSet<usize>,
    tool_uses: BTreeMap<usize, ToolUseInProgress>,
    usage: TokenUsage,
    stop_reason: StopReason,
    message_started: bool,
}

impl Accumulator {
    fn new(tick: u32) -> Self {
        Self {
            tick,
            text: BTreeMap::new(),
            reasoning: BTreeMap::new(),
            open_text: Default::default(),
            open_reasoning: Default::default(),
            tool_uses: BTreeMap::new(),
            usage: TokenUsage::default(),
            stop_reason: StopReason::EndTurn,
            message_started: false,
        }
    }

    fn event(&self, kind: StreamEventKind) -> StreamEvent {
        StreamEvent::new(self.tick, kind)
    }

    /// Process one delta, returning the events it produces, in order.
    fn process(&mut self, delta: AdapterDelta) -> Vec<StreamEvent> {
        match delta {
            AdapterDelta::MessageStart => {
                self.message_started = true;
                vec![self.event(StreamEventKind::MessageStart)]
            }
            AdapterDelta::Text { index, text } => {
                let mut events = Vec::new();
                if self.open_text.insert(index) {
                    events.push(self.event(StreamEventKind::ContentStart { index }));
                }
                self.text.entry(index).or_default().push_str(&text);
                events.push(self.event(StreamEventKind::ContentDelta { index, delta: text }));
                events
            }
            AdapterDelta::Reasoning { index, text } => {
                let mut events = Vec::new();
                if self.open_reasoning.insert(index) {
                    events.push(self.event(StreamEventKind::ReasoningStart { index }));
                }
                self.reasoning.entry(index).or_default().push_str(&text);
                events.push(self.event(StreamEventKind::ReasoningDelta { index, delta: text }));
                events
            }
            AdapterDelta::ToolCallStart { index, id, name } => {
                self.tool_uses.insert(index, ToolUseInProgress { id: id.clone(), name: name.clone(), input_buf: String::new() });
                vec![self.event(StreamEventKind::ToolCallStart { id, name })]
            }
            AdapterDelta::ToolCallDelta { index, id, delta } => {
                if let Some(tool) = self.tool_uses.get_mut(&index) {
                    tool.input_buf.push_str(&delta);
                }
                vec![self.event(StreamEventKind::ToolCallDelta { id, delta })]
            }
            AdapterDelta::ToolCallEnd { index, id } => {
                let input = self
                    .tool_uses
                    .get(&index)
                    .map(|t| serde_json::from_str(&t.input_buf).unwrap_or(serde_json::Value::Null))
                    .unwrap_or(serde_json::Value::Null);
                vec![self.event(StreamEventKind::ToolCallEnd { id, input })]
            }
            AdapterDelta::ToolCall { index, id, name, input } => {
                self.tool_uses.insert(
                    index,
                    ToolUseInProgress { id: id.clone(), name: name.clone(), input_buf: input.to_string() },
                );
                vec![self.event(StreamEventKind::ToolCall { id, name, input })]
            }
            AdapterDelta::Usage(usage) => {
                self.usage.accumulate(&usage);
                vec![self.event(StreamEventKind::Usage(usage))]
            }
            AdapterDelta::ContentMetadata { .. } | AdapterDelta::ReasoningMetadata { .. } => {
                // No dedicated wire event for metadata annotations; they
                // inform the compiler's next-tick annotation pass, not the
                // live stream.
                Vec::new()
            }
            AdapterDelta::MessageEnd { stop_reason } => {
                self.stop_reason = stop_reason;
                let mut events = self.close_open_blocks();
                events.push(self.event(StreamEventKind::MessageEnd { stop_reason }));
                events
            }
            AdapterDelta::Error { message, retryable: _ } => {
                vec![self.event(StreamEventKind::Error { message })]
            }
            AdapterDelta::Raw(_) => Vec::new(),
        }
    }

    fn close_open_blocks(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for index in std::mem::take(&mut self.open_text) {
            events.push(self.event(StreamEventKind::ContentEnd { index }));
        }
        for index in std::mem::take(&mut self.open_reasoning) {
            events.push(self.event(StreamEventKind::ReasoningEnd { index }));
        }
        events
    }

    /// Build the final synthetic `message` event from everything buffered.
    fn take_final_message(&mut self) -> StreamEvent {
        let reasoning = std::mem::take(&mut self.reasoning).into_values().collect();
        let text = std::mem::take(&mut self.text).into_values().collect();
        let tool_calls = std::mem::take(&mut self.tool_uses)
            .into_values()
            .map(|t| {
                let input = serde_json::from_str(&t.input_buf).unwrap_or(serde_json::Value::Null);
                (t.id, t.name, input)
            })
            .collect();
        self.event(StreamEventKind::Message(ReconstructedMessage {
            reasoning,
            text,
            tool_calls,
            usage: self.usage,
            stop_reason: self.stop_reason,
        }))
    }
}

/// Turn a stream of `AdapterDelta`s into the session-level `StreamEvent`
/// wire contract for tick `tick`, finishing with one synthetic `message`
/// event that reconstructs the full assistant message.
///
/// Generic over `'a` rather than fixed to `'static`: a `Provider::stream`
/// call is an RPITIT, so its opaque return type carries the borrow of
/// `&self` the trait method was called on, and the tick engine drives this
/// accumulator without giving up that borrow first.
pub fn accumulate<'a>(deltas: impl Stream<Item = AdapterDelta> + Send + 'a, tick: u32) -> impl Stream<Item = StreamEvent> + Send + 'a {
    stream! {
        let mut state = Accumulator::new(tick);
        let mut deltas = std::pin::pin!(deltas);
        use futures::StreamExt;
        while let Some(delta) = deltas.next().await {
            for event in state.process(delta) {
                yield event;
            }
        }
        if state.message_started {
            yield state.take_final_message();
        }
    }
}
