//! A deterministic test double for [`Provider`](crate::Provider).
//!
//! A `Mutex`-guarded queue of canned responses, popped one per call,
//! panicking if exhausted so a test that over-calls the provider fails
//! loudly instead of silently looping.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_stream::stream;
use futures::Stream;
use weave_types::AdapterDelta;

use crate::{ModelInput, ProviderMetadata};

/// Replays pre-scripted `AdapterDelta` sequences, one sequence per `stream`
/// call, in the order they were queued.
pub struct MockProvider {
    responses: Mutex<VecDeque<Vec<AdapterDelta>>>,
    call_count: AtomicUsize,
    metadata: ProviderMetadata,
}

impl MockProvider {
    /// Queue `responses`, one `Vec<AdapterDelta>` per expected `stream` call.
    pub fn new(responses: Vec<Vec<AdapterDelta>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            call_count: AtomicUsize::new(0),
            metadata: ProviderMetadata {
                id: "mock".into(),
                provider: "mock".into(),
                capabilities: Vec::new(),
                context_window: None,
                max_output_tokens: None,
            },
        }
    }

    /// How many times `stream` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl crate::Provider for MockProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn generate(&self, input: ModelInput) -> Result<crate::ModelOutput, crate::ProviderError> {
        use futures::StreamExt;
        let deltas: Vec<_> = self.stream(input).collect().await;
        let mut text = Vec::new();
        let mut reasoning = Vec::new();
        let mut tool_calls = Vec::new();
        let mut usage = weave_types::TokenUsage::default();
        let mut stop_reason = weave_types::StopReason::EndTurn;
        for delta in deltas {
            match delta {
                AdapterDelta::Text { text: t, .. } => text.push(t),
                AdapterDelta::Reasoning { text: t, .. } => reasoning.push(t),
                AdapterDelta::ToolCall { id, name, input, .. } => tool_calls.push((id, name, input)),
                AdapterDelta::Usage(u) => usage.accumulate(&u),
                AdapterDelta::MessageEnd { stop_reason: sr } => stop_reason = sr,
                _ => {}
            }
        }
        Ok(crate::ModelOutput {
            message: weave_types::ReconstructedMessage { reasoning, text, tool_calls, usage, stop_reason },
        })
    }

    fn stream(&self, _input: ModelInput) -> impl Stream<Item = AdapterDelta> + Send {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let response = self
            .responses
            .lock()
            .expect("mock provider responses poisoned")
            .pop_front()
            .expect("MockProvider: no more responses queued");
        stream! {
            for delta in response {
                yield delta;
            }
        }
    }
}
