#![deny(missing_docs)]
//! The tick engine (SPEC_FULL.md §4.G): generalizes a single-provider,
//! single-turn agent loop into the full compile/stream/dispatch/arbitrate
//! cycle that drives one execution from its first tick to completion.
//!
//! One tick: reset abort state, fire `TickStart`, `com.clear()` then
//! compile, fire `BeforeSend`, compact the timeline to the configured token
//! budget, stream the model's reply through the accumulator, dispatch any
//! tool calls (confirmation, execution, results), fire `AfterSend`, arbitrate
//! stop/continue, fire `TickEnd`, loop or finish.
//!
//! Hook dispatch needs no type-erasure layer: `weave_hooks::Hook` is already
//! `#[async_trait]`-based and therefore already object-safe, so
//! `HookRegistry` stores `Arc<dyn Hook>` directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use weave_budget::{compact, CompactOpts};
use weave_com::{Com, TickControl};
use weave_compile::{Compiler, ComponentNode, TickState};
use weave_confirm::ConfirmationCoordinator;
use weave_exec::{ClientToolCoordinator, ToolCall, ToolExecutor};
use weave_hooks::{Hook, HookAction, HookContext, HookPoint, HookRegistry};
use weave_provider::{ModelInput, Provider};
use weave_types::{
    CallId, Content, ContentBlock, Message, Role, StopReason, StreamEvent, StreamEventKind, TimelineEntry,
};

/// Tunables for one `TickEngine` (SPEC_FULL.md §6 "Configuration recognized
/// by session/app").
pub struct TickEngineConfig {
    /// Hard cap on ticks run by one `run` call. `None` means unbounded
    /// (callers should pair this with their own safeguards).
    pub max_ticks: Option<u32>,
    /// Token-budget compaction applied to the compiled timeline before
    /// every model call.
    pub compact: CompactOpts,
    /// Whether a tick's tool calls dispatch concurrently (SPEC_FULL.md §5).
    pub parallel_tool_execution: bool,
}

impl Default for TickEngineConfig {
    fn default() -> Self {
        Self { max_ticks: None, compact: CompactOpts::default(), parallel_tool_execution: false }
    }
}

/// How an execution ended.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    /// Number of ticks actually run.
    pub ticks_run: u32,
    /// Human-readable reason the execution stopped, if not a plain
    /// end-of-turn completion.
    pub stop_reason: Option<String>,
}

/// Drives one execution's ticks to completion, generic over a concrete
/// `P: Provider` — there is one model adapter per engine, chosen at
/// construction.
pub struct TickEngine<P: Provider> {
    compiler: Compiler,
    provider: P,
    executor: ToolExecutor,
    hooks: HookRegistry,
    config: TickEngineConfig,
    sequence: AtomicU64,
}

impl<P: Provider> TickEngine<P> {
    /// Build an engine around `provider`, sharing `confirm` with whatever
    /// session-facing API resolves confirmation prompts.
    pub fn new(provider: P, confirm: Arc<ConfirmationCoordinator>) -> Self {
        Self {
            compiler: Compiler::new(),
            provider,
            executor: ToolExecutor::new(confirm),
            hooks: HookRegistry::new(),
            config: TickEngineConfig::default(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Replace the default tick configuration.
    pub fn with_config(mut self, config: TickEngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a precise token estimator supplied by the active model adapter
    /// instead of the compiler's default heuristic.
    pub fn with_estimator(mut self, estimator: weave_compile::Estimator) -> Self {
        self.compiler = self.compiler.with_estimator(estimator);
        self
    }

    /// Register a lifecycle hook, fired in registration order at each
    /// `HookPoint` it subscribes to.
    pub fn add_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.add(hook);
        self
    }

    /// Share the client-tool coordinator so a session's
    /// `submit_client_tool_result` API can resolve waiting calls.
    pub fn client_tools(&self) -> Arc<ClientToolCoordinator> {
        self.executor.client_tools()
    }

    /// Run ticks until the tick-control arbitration says to stop, a hook
    /// halts the execution, or `max_ticks` is reached, emitting every
    /// `StreamEvent` onto `emit` as it's produced.
    ///
    /// All events for tick `n` are sent before tick `n+1`'s `message_start`
    /// (SPEC_FULL.md §5's ordering guarantee) since a tick's body runs to
    /// completion before the next tick's `com.clear()`.
    pub async fn run(
        &mut self,
        root: ComponentNode,
        com: &mut Com,
        cancellation: CancellationToken,
        emit: mpsc::UnboundedSender<StreamEvent>,
    ) -> TickOutcome {
        let mut tick: u32 = 0;
        let mut previous_stop_reason: Option<StopReason> = None;
        let mut last_error: Option<String> = None;

        loop {
            if cancellation.is_cancelled() || com.should_abort() {
                let reason = com.abort_reason().map(str::to_string).unwrap_or_else(|| "aborted".to_string());
                return self.complete(tick, Some(reason), &emit).await;
            }

            if let Some(max) = self.config.max_ticks {
                if tick >= max {
                    return self.complete(tick, Some("max ticks reached".to_string()), &emit).await;
                }
            }

            tick += 1;
            com.reset_abort_state();

            let tick_state = TickState {
                tick,
                queued_messages: com.get_queued_messages().to_vec(),
                previous_stop_reason,
                last_error: last_error.take(),
            };
            com.clear_queued_messages();

            if let HookAction::Halt { reason } = self.fire_lifecycle(HookPoint::TickStart, tick).await {
                return self.complete(tick, Some(reason), &emit).await;
            }

            com.clear();
            let compiled = self.compiler.compile(root.clone(), com, &tick_state).await;

            if let Some(err) = self.compiler.take_instability() {
                self.stamp_and_emit(&emit, StreamEvent::new(tick, StreamEventKind::Error { message: err.to_string() }));
            }

            if let HookAction::Halt { reason } = self.fire_lifecycle(HookPoint::BeforeSend, tick).await {
                return self.complete(tick, Some(reason), &emit).await;
            }

            let outcome = compact(compiled.timeline_entries, &self.config.compact);
            let input = ModelInput { system: compiled.system, timeline: outcome.kept, tools: compiled.tools, provider_options: None };

            let deltas = self.provider.stream(input);
            let events = weave_stream::accumulate(deltas, tick);
            let mut events = std::pin::pin!(events);

            let mut final_message = None;
            let mut halted = None;
            while let Some(event) = events.next().await {
                if let StreamEventKind::Message(message) = &event.kind {
                    final_message = Some(message.clone());
                }
                let for_hooks = event.clone();
                self.stamp_and_emit(&emit, event);
                if let HookAction::Halt { reason } = self.fire_event(tick, for_hooks).await {
                    halted = Some(reason);
                    break;
                }
            }
            if let Some(reason) = halted {
                return self.complete(tick, Some(reason), &emit).await;
            }

            let Some(message) = final_message else {
                last_error = Some("model stream ended without a terminal message".to_string());
                let status = com.resolve_tick_control(TickControl::Stop);
                if let HookAction::Halt { reason } = self.fire_lifecycle(HookPoint::TickEnd, tick).await {
                    return self.complete(tick, Some(reason), &emit).await;
                }
                if status == TickControl::Stop {
                    return self.complete(tick, last_error, &emit).await;
                }
                continue;
            };

            previous_stop_reason = Some(message.stop_reason);

            let mut assistant_blocks: Vec<ContentBlock> = Vec::new();
            for reasoning in &message.reasoning {
                assistant_blocks.push(ContentBlock::Reasoning { text: reasoning.clone() });
            }
            for text in &message.text {
                assistant_blocks.push(ContentBlock::Text { text: text.clone() });
            }
            for (id, name, input) in &message.tool_calls {
                assistant_blocks.push(ContentBlock::ToolUse { id: id.clone(), name: name.clone(), input: input.clone() });
            }
            if !assistant_blocks.is_empty() {
                com.inject_history(TimelineEntry::new(Message { role: Role::Assistant, content: Content::Blocks(assistant_blocks) }));
            }

            let has_tool_calls = message.stop_reason == StopReason::ToolUse && !message.tool_calls.is_empty();
            if has_tool_calls {
                self.run_tool_calls(com, tick, message.tool_calls, cancellation.clone(), &emit).await;
            }

            if let HookAction::Halt { reason } = self.fire_lifecycle(HookPoint::AfterSend, tick).await {
                return self.complete(tick, Some(reason), &emit).await;
            }

            let default_status = if has_tool_calls {
                TickControl::Continue
            } else {
                TickControl::Stop
            };
            let status = com.resolve_tick_control(default_status);

            if let HookAction::Halt { reason } = self.fire_lifecycle(HookPoint::TickEnd, tick).await {
                return self.complete(tick, Some(reason), &emit).await;
            }

            if status == TickControl::Stop {
                return self.complete(tick, None, &emit).await;
            }
        }
    }

    /// Resolve confirmation, dispatch, and emit events for one tick's batch
    /// of tool calls, persisting each result into the next tick's history
    /// via `com.inject_history` (`Com::clear` wipes the live timeline at
    /// the start of every tick — injected history is how a tick hands its
    /// tool results forward).
    async fn run_tool_calls(
        &self,
        com: &mut Com,
        tick: u32,
        tool_calls: Vec<(String, String, serde_json::Value)>,
        cancellation: CancellationToken,
        emit: &mpsc::UnboundedSender<StreamEvent>,
    ) {
        let mut calls = Vec::with_capacity(tool_calls.len());
        let mut requires_confirm = Vec::with_capacity(tool_calls.len());

        for (id, name, input) in tool_calls {
            let tool = com.get_tool(&name).or_else(|| com.get_tool_by_alias(&name));
            let needs_confirm = tool.as_ref().map(|t| t.requires_confirmation().evaluate(&input)).unwrap_or(false);
            if needs_confirm {
                let message = tool
                    .as_ref()
                    .and_then(|t| t.confirmation_message(&input))
                    .unwrap_or_else(|| format!("Run tool \"{name}\"?"));
                self.stamp_and_emit(
                    emit,
                    StreamEvent::new(
                        tick,
                        StreamEventKind::ToolConfirmationRequired {
                            call_id: CallId::new(id.clone()),
                            tool_name: name.clone(),
                            message,
                            metadata: input.clone(),
                        },
                    ),
                );
            }
            self.stamp_and_emit(emit, StreamEvent::new(tick, StreamEventKind::ToolResultStart { id: id.clone() }));

            requires_confirm.push(needs_confirm);
            calls.push(ToolCall { id: CallId::new(id), name, input });
        }

        let results = self.executor.dispatch_batch(com, calls, cancellation, self.config.parallel_tool_execution).await;

        for (result, needed_confirm) in results.into_iter().zip(requires_confirm) {
            if needed_confirm {
                let confirmed = result.error.as_deref() != Some("denied");
                self.stamp_and_emit(
                    emit,
                    StreamEvent::new(tick, StreamEventKind::ToolConfirmationResult { call_id: result.tool_use_id.clone(), confirmed }),
                );
            }

            let content = Content::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: result.tool_use_id.as_str().to_string(),
                content: Box::new(result.as_content()),
                is_error: !result.success,
            }]);
            com.inject_history(TimelineEntry::new(Message { role: Role::Tool, content }));

            self.stamp_and_emit(emit, StreamEvent::new(tick, StreamEventKind::ToolResult(result)));
        }
    }

    async fn fire_lifecycle(&self, point: HookPoint, tick: u32) -> HookAction {
        self.hooks.dispatch(&HookContext::lifecycle(point, tick)).await
    }

    async fn fire_event(&self, tick: u32, event: StreamEvent) -> HookAction {
        self.hooks.dispatch(&HookContext::for_event(tick, event)).await
    }

    fn stamp_and_emit(&self, sink: &mpsc::UnboundedSender<StreamEvent>, mut event: StreamEvent) {
        event.sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let _ = sink.send(event);
    }

    async fn complete(&self, ticks_run: u32, stop_reason: Option<String>, emit: &mpsc::UnboundedSender<StreamEvent>) -> TickOutcome {
        self.fire_lifecycle(HookPoint::Complete, ticks_run).await;
        if let Some(reason) = &stop_reason {
            tracing::warn!(ticks_run, reason, "execution ended abnormally");
            self.stamp_and_emit(emit, StreamEvent::new(ticks_run, StreamEventKind::Error { message: reason.clone() }));
        } else {
            tracing::debug!(ticks_run, "execution completed");
        }
        TickOutcome { ticks_run, stop_reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use weave_compile::{CompileContext, Component};
    use weave_provider::MockProvider;
    use weave_types::{AdapterDelta, ExecutableTool, ToolContext, ToolError, ToolKind};

    struct UserPrompt(String);

    #[async_trait]
    impl Component for UserPrompt {
        async fn render(&self, ctx: &mut CompileContext<'_>) -> Vec<ComponentNode> {
            for entry in ctx.com.injected_history().to_vec() {
                ctx.com.add_message(entry.message, weave_com::AddMessageOpts::default());
            }
            ctx.com.add_message(Message::user(self.0.clone()), weave_com::AddMessageOpts::default());
            vec![]
        }
    }

    fn root(text: &str) -> ComponentNode {
        Arc::new(UserPrompt(text.to_string()))
    }

    struct Echo;

    #[async_trait]
    impl ExecutableTool for Echo {
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
        async fn run(&self, input: serde_json::Value, _ctx: &ToolContext) -> Result<Vec<ContentBlock>, ToolError> {
            Ok(vec![ContentBlock::Text { text: input.to_string() }])
        }
    }

    async fn drain(mut rx: mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn a_plain_reply_completes_after_one_tick() {
        let provider = MockProvider::new(vec![vec![
            AdapterDelta::MessageStart,
            AdapterDelta::Text { index: 0, text: "hi there".into() },
            AdapterDelta::MessageEnd { stop_reason: StopReason::EndTurn },
        ]]);
        let mut engine = TickEngine::new(provider, Arc::new(ConfirmationCoordinator::new()));
        let mut com = Com::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let outcome = engine.run(root("hello"), &mut com, CancellationToken::new(), tx).await;

        assert_eq!(outcome.ticks_run, 1);
        assert!(outcome.stop_reason.is_none());

        let events = drain(rx).await;
        assert!(events.iter().any(|e| matches!(e.kind, StreamEventKind::MessageStart)));
        assert!(events.iter().any(|e| matches!(e.kind, StreamEventKind::Message(_))));
        // sequence is monotonic across the whole run
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        let mut sorted = sequences.clone();
        sorted.sort_unstable();
        assert_eq!(sequences, sorted);
    }

    #[tokio::test]
    async fn a_tool_call_round_trips_across_two_ticks() {
        let provider = MockProvider::new(vec![
            vec![
                AdapterDelta::MessageStart,
                AdapterDelta::ToolCall { index: 0, id: "call_1".into(), name: "echo".into(), input: serde_json::json!({"x": 1}) },
                AdapterDelta::MessageEnd { stop_reason: StopReason::ToolUse },
            ],
            vec![
                AdapterDelta::MessageStart,
                AdapterDelta::Text { index: 0, text: "done".into() },
                AdapterDelta::MessageEnd { stop_reason: StopReason::EndTurn },
            ],
        ]);
        let mut engine = TickEngine::new(provider, Arc::new(ConfirmationCoordinator::new()));
        let mut com = Com::new();
        com.add_tool(Arc::new(Echo));
        let (tx, rx) = mpsc::unbounded_channel();
        let outcome = engine.run(root("hello"), &mut com, CancellationToken::new(), tx).await;

        assert_eq!(outcome.ticks_run, 2);
        let events = drain(rx).await;
        assert!(events.iter().any(|e| matches!(e.kind, StreamEventKind::ToolResult(_))));
        assert!(!com.injected_history().is_empty());
    }

    #[tokio::test]
    async fn max_ticks_stops_a_perpetually_tool_calling_loop() {
        let turn = vec![
            AdapterDelta::MessageStart,
            AdapterDelta::ToolCall { index: 0, id: "call_1".into(), name: "echo".into(), input: serde_json::json!({}) },
            AdapterDelta::MessageEnd { stop_reason: StopReason::ToolUse },
        ];
        let provider = MockProvider::new(vec![turn.clone(), turn.clone(), turn]);
        let mut engine = TickEngine::new(provider, Arc::new(ConfirmationCoordinator::new()))
            .with_config(TickEngineConfig { max_ticks: Some(2), ..TickEngineConfig::default() });
        let mut com = Com::new();
        com.add_tool(Arc::new(Echo));
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = engine.run(root("hello"), &mut com, CancellationToken::new(), tx).await;

        assert_eq!(outcome.ticks_run, 2);
        assert_eq!(outcome.stop_reason.as_deref(), Some("max ticks reached"));
    }

    struct RecordingHook(Arc<Mutex<Vec<HookPoint>>>);

    #[async_trait]
    impl Hook for RecordingHook {
        fn points(&self) -> &[HookPoint] {
            &[HookPoint::TickStart, HookPoint::BeforeSend, HookPoint::AfterSend, HookPoint::TickEnd, HookPoint::Complete]
        }
        async fn on_event(&self, ctx: &HookContext) -> Result<HookAction, weave_hooks::HookError> {
            self.0.lock().unwrap().push(ctx.point);
            Ok(HookAction::Continue)
        }
    }

    #[tokio::test]
    async fn lifecycle_hooks_fire_in_order_each_tick() {
        let provider = MockProvider::new(vec![vec![
            AdapterDelta::MessageStart,
            AdapterDelta::Text { index: 0, text: "hi".into() },
            AdapterDelta::MessageEnd { stop_reason: StopReason::EndTurn },
        ]]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut engine = TickEngine::new(provider, Arc::new(ConfirmationCoordinator::new())).add_hook(Arc::new(RecordingHook(seen.clone())));
        let mut com = Com::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        engine.run(root("hi"), &mut com, CancellationToken::new(), tx).await;

        let points = seen.lock().unwrap().clone();
        assert_eq!(
            points,
            vec![HookPoint::TickStart, HookPoint::BeforeSend, HookPoint::AfterSend, HookPoint::TickEnd, HookPoint::Complete]
        );
    }

    struct HaltingHook;

    #[async_trait]
    impl Hook for HaltingHook {
        fn points(&self) -> &[HookPoint] {
            &[HookPoint::BeforeSend]
        }
        async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, weave_hooks::HookError> {
            Ok(HookAction::Halt { reason: "budget policy".into() })
        }
    }

    #[tokio::test]
    async fn a_halting_hook_ends_the_execution_before_the_model_is_called() {
        let provider = MockProvider::new(vec![vec![AdapterDelta::MessageStart]]);
        let mut engine = TickEngine::new(provider, Arc::new(ConfirmationCoordinator::new())).add_hook(Arc::new(HaltingHook));
        let mut com = Com::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = engine.run(root("hi"), &mut com, CancellationToken::new(), tx).await;

        assert_eq!(outcome.ticks_run, 1);
        assert_eq!(outcome.stop_reason.as_deref(), Some("budget policy"));
    }
}
