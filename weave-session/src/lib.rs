#![deny(missing_docs)]
//! The Session and Spawn Tree (SPEC_FULL.md §4.H): the long-lived object a
//! host holds for one conversation, wrapping a `TickEngine` with render/send,
//! child spawning, cross-tree confirmation/client-tool routing, abort
//! cascade, and hibernate/hydrate.
//!
//! Sessions are keyed by `SessionId` rather than an arena-allocator, the
//! same "name-keyed registry of heterogeneous workers" idiom used for the
//! tick engine's own operator table — no crate in this stack reaches for an
//! arena allocator. Per-child event forwarding is one `tokio::spawn`ed task
//! per spawn, modeled on
//! `LocalOrch::dispatch_many`'s one-task-per-dispatched-job pattern.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use weave_com::Com;
use weave_compile::ComponentNode;
use weave_confirm::ConfirmationCoordinator;
use weave_hooks::Hook;
use weave_provider::Provider;
use weave_tick::{TickEngine, TickEngineConfig, TickOutcome};
use weave_types::{ComState, Message, SessionId, Snapshot, SpawnId, StreamEvent, StreamEventKind, WeaveError, SNAPSHOT_VERSION};

mod handle;

pub use handle::{ChildHandle, ExecutionHandle};

/// Depth at which a session refuses to spawn further children (SPEC_FULL.md
/// §4.H: "depth guard refuses spawn at spawnDepth >= 10").
pub const MAX_SPAWN_DEPTH: u32 = 10;

/// Builds a root `Session` around a provider, with the same hook/config/
/// estimator knobs `TickEngine` itself exposes via its own builder methods.
pub struct SessionBuilder<P: Provider> {
    provider: P,
    config: TickEngineConfig,
    hooks: Vec<Arc<dyn Hook>>,
    estimator: Option<weave_compile::Estimator>,
}

impl<P: Provider + Send + Sync + 'static> SessionBuilder<P> {
    /// Start building a session around `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider, config: TickEngineConfig::default(), hooks: Vec::new(), estimator: None }
    }

    /// Replace the tick engine's configuration.
    pub fn with_config(mut self, config: TickEngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a lifecycle hook on the underlying tick engine.
    pub fn add_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Use a model-supplied token estimator instead of the compiler's
    /// default heuristic.
    pub fn with_estimator(mut self, estimator: weave_compile::Estimator) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Build the root session (spawn depth 0, no parent).
    pub fn build(self) -> Session<P> {
        Session::construct(SessionId::new(fresh_id("session")), self.provider, self.config, self.hooks, self.estimator, 0, None, CancellationToken::new())
    }
}

struct ChildEntry {
    /// Signalled once this spawn's forwarding task should drain and stop.
    done: CancellationToken,
}

struct SessionInner<P: Provider> {
    id: SessionId,
    com: AsyncMutex<Com>,
    engine: AsyncMutex<TickEngine<P>>,
    confirm: Arc<ConfirmationCoordinator>,
    events: broadcast::Sender<StreamEvent>,
    sequence: Arc<AtomicU64>,
    cancellation: CancellationToken,
    children: AsyncMutex<HashMap<String, ChildEntry>>,
    child_sessions: AsyncMutex<HashMap<String, Session<P>>>,
    last_root: AsyncMutex<Option<ComponentNode>>,
    spawn_depth: u32,
    parent: Option<SessionId>,
    last_tick: AtomicU32,
}

/// A long-lived conversation: owns a `Com`/`TickEngine` pair, a spawn tree
/// of children, and the confirmation/client-tool coordinators that resolve
/// across it. Cheaply `Clone`able (an `Arc` around the shared state), so a
/// forwarding task or a `ChildHandle` can hold one independently of the
/// session's original owner.
pub struct Session<P: Provider + Send + Sync + 'static> {
    inner: Arc<SessionInner<P>>,
}

impl<P: Provider + Send + Sync + 'static> Clone for Session<P> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<P: Provider + Send + Sync + 'static> Session<P> {
    /// Start building a root session around `provider`.
    pub fn builder(provider: P) -> SessionBuilder<P> {
        SessionBuilder::new(provider)
    }

    fn construct(
        id: SessionId,
        provider: P,
        config: TickEngineConfig,
        hooks: Vec<Arc<dyn Hook>>,
        estimator: Option<weave_compile::Estimator>,
        spawn_depth: u32,
        parent: Option<SessionId>,
        cancellation: CancellationToken,
    ) -> Self {
        let confirm = Arc::new(ConfirmationCoordinator::new());
        let mut engine = TickEngine::new(provider, confirm.clone()).with_config(config);
        if let Some(estimator) = estimator {
            engine = engine.with_estimator(estimator);
        }
        for hook in hooks {
            engine = engine.add_hook(hook);
        }
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(SessionInner {
                id,
                com: AsyncMutex::new(Com::new()),
                engine: AsyncMutex::new(engine),
                confirm,
                events,
                sequence: Arc::new(AtomicU64::new(0)),
                cancellation,
                children: AsyncMutex::new(HashMap::new()),
                child_sessions: AsyncMutex::new(HashMap::new()),
                last_root: AsyncMutex::new(None),
                spawn_depth,
                parent,
                last_tick: AtomicU32::new(0),
            }),
        }
    }

    /// This session's id.
    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// This session's depth in the spawn tree (0 for a root session).
    pub fn spawn_depth(&self) -> u32 {
        self.inner.spawn_depth
    }

    /// The parent session's id, if this is a spawned child.
    pub fn parent(&self) -> Option<&SessionId> {
        self.inner.parent.as_ref()
    }

    /// The ids of this session's current children.
    pub async fn children(&self) -> Vec<SpawnId> {
        self.inner.children.lock().await.keys().map(|s| SpawnId::new(s.clone())).collect()
    }

    /// Look up a still-live child session by its spawn id.
    pub async fn child(&self, spawn_id: &SpawnId) -> Option<Session<P>> {
        self.inner.child_sessions.lock().await.get(spawn_id.as_str()).cloned()
    }

    /// Subscribe to every event this session ever emits, including ones
    /// forwarded from descendants (spec's `on('event', ...)`).
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.events.subscribe()
    }

    /// The confirmation coordinator backing this session's own tool calls
    /// (not its descendants' — routing across the tree goes through
    /// `submit_tool_result`).
    pub fn confirmations(&self) -> Arc<ConfirmationCoordinator> {
        self.inner.confirm.clone()
    }

    /// The client-tool coordinator backing this session's own client tools.
    pub async fn client_tools(&self) -> Arc<weave_exec::ClientToolCoordinator> {
        self.inner.engine.lock().await.client_tools()
    }

    fn start_tick_run(&self, root: ComponentNode) -> (tokio::task::JoinHandle<TickOutcome>, mpsc::UnboundedReceiver<StreamEvent>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let exec_cancel = self.inner.cancellation.child_token();
        let run_cancel = exec_cancel.clone();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut com = inner.com.lock().await;
            let mut engine = inner.engine.lock().await;
            let outcome = engine.run(root, &mut com, run_cancel, tx).await;
            inner.last_tick.store(outcome.ticks_run, Ordering::Relaxed);
            outcome
        });
        (handle, rx, exec_cancel)
    }

    /// Run ticks for `root` to completion, restamping and re-broadcasting
    /// every emitted event onto this session's own bus as it goes. Returns
    /// the scoped receiver for this one run (closes when the tick engine's
    /// channel does).
    fn run_and_bus(&self, root: ComponentNode) -> (tokio::task::JoinHandle<TickOutcome>, mpsc::UnboundedReceiver<StreamEvent>, CancellationToken) {
        let (join, mut raw_rx, cancel) = self.start_tick_run(root);
        let (scoped_tx, scoped_rx) = mpsc::unbounded_channel();
        let events_bus = self.inner.events.clone();
        let seq = self.inner.sequence.clone();
        tokio::spawn(async move {
            while let Some(mut ev) = raw_rx.recv().await {
                ev.sequence = seq.fetch_add(1, Ordering::Relaxed);
                let _ = events_bus.send(ev.clone());
                let _ = scoped_tx.send(ev);
            }
        });
        (join, scoped_rx, cancel)
    }

    /// Compile-and-run `root` once, returning a handle for this execution's
    /// events and completion (spec's `render(input) -> ExecutionHandle`).
    pub async fn render(&self, root: ComponentNode) -> ExecutionHandle {
        *self.inner.last_root.lock().await = Some(root.clone());
        let (result, events, cancellation) = self.run_and_bus(root);
        ExecutionHandle::new(result, events, cancellation)
    }

    /// Queue `message` and re-render the most recently rendered root (spec's
    /// `send(input) -> ExecutionHandle`). Errors if `render` was never
    /// called on this session.
    pub async fn send(&self, message: Message) -> Result<ExecutionHandle, WeaveError> {
        let root = self.inner.last_root.lock().await.clone().ok_or_else(|| WeaveError::Other("send() called before any render()".to_string()))?;
        self.inner.com.lock().await.queue_message(message);
        Ok(self.render(root).await)
    }

    /// Spawn a fresh child session (its own `Com`, sharing no state with
    /// this one) and drive `root` to completion on it, forwarding every
    /// event it emits back onto this session's bus with `spawn_path`
    /// prepended by the new spawn id. `spawn_end` fires only after every
    /// forwarded event has been re-emitted (SPEC_FULL.md §4.H, §5).
    pub async fn spawn(&self, provider: P, root: ComponentNode, label: Option<String>) -> Result<ChildHandle<P>, WeaveError> {
        if self.inner.spawn_depth >= MAX_SPAWN_DEPTH {
            return Err(WeaveError::SpawnDepthExceeded { limit: MAX_SPAWN_DEPTH });
        }

        let child = Session::construct(
            SessionId::new(fresh_id("session")),
            provider,
            TickEngineConfig::default(),
            Vec::new(),
            None,
            self.inner.spawn_depth + 1,
            Some(self.inner.id.clone()),
            self.inner.cancellation.child_token(),
        );

        let spawn_id = SpawnId::new(fresh_id("spawn"));
        self.emit_local(StreamEventKind::SpawnStart { spawn_id: spawn_id.to_string(), label });

        let mut child_rx = child.subscribe();
        let parent_events = self.inner.events.clone();
        let parent_seq = self.inner.sequence.clone();
        let spawn_id_str = spawn_id.to_string();
        let done = CancellationToken::new();
        let done_signal = done.clone();
        let forward = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    res = child_rx.recv() => match res {
                        Ok(mut ev) => {
                            ev.spawn_path.insert(0, spawn_id_str.clone());
                            ev.sequence = parent_seq.fetch_add(1, Ordering::Relaxed);
                            let _ = parent_events.send(ev);
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = done_signal.cancelled() => {
                        while let Ok(mut ev) = child_rx.try_recv() {
                            ev.spawn_path.insert(0, spawn_id_str.clone());
                            ev.sequence = parent_seq.fetch_add(1, Ordering::Relaxed);
                            let _ = parent_events.send(ev);
                        }
                        break;
                    }
                }
            }
        });

        self.inner.children.lock().await.insert(spawn_id.to_string(), ChildEntry { done: done.clone() });
        self.inner.child_sessions.lock().await.insert(spawn_id.to_string(), child.clone());

        let exec = child.render(root).await;

        let parent_events2 = self.inner.events.clone();
        let parent_seq2 = self.inner.sequence.clone();
        let spawn_id_for_end = spawn_id.clone();
        let result = tokio::spawn(async move {
            let outcome = exec.result.await.unwrap_or_else(|_| TickOutcome { ticks_run: 0, stop_reason: Some("spawned execution panicked".to_string()) });
            done.cancel();
            let _ = forward.await;
            let is_error = outcome.stop_reason.is_some();
            let output = outcome.stop_reason.clone();
            let mut ev = StreamEvent::new(0, StreamEventKind::SpawnEnd { spawn_id: spawn_id_for_end.to_string(), is_error, output });
            ev.sequence = parent_seq2.fetch_add(1, Ordering::Relaxed);
            let _ = parent_events2.send(ev);
            outcome
        });

        Ok(ChildHandle { spawn_id, session: child, result })
    }

    fn emit_local(&self, kind: StreamEventKind) {
        let mut event = StreamEvent::new(0, kind);
        event.sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let _ = self.inner.events.send(event);
    }

    /// Try to resolve `call_id` wherever in this tree (this session or any
    /// descendant) it is pending, routing a tool-confirmation decision
    /// (spec's `submitToolResult`). Returns `true` if something was
    /// resolved.
    pub fn submit_tool_result<'a>(&'a self, call_id: &'a weave_types::CallId, approved: bool, reason: Option<String>) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
        let _ = &reason;
        Box::pin(async move {
            if self.inner.confirm.resolve_confirmation(call_id, approved, false) {
                return true;
            }
            let children = self.inner.child_sessions.lock().await.values().cloned().collect::<Vec<_>>();
            for child in children {
                if child.submit_tool_result(call_id, approved, reason.clone()).await {
                    return true;
                }
            }
            false
        })
    }

    /// Try to resolve `call_id`'s pending client-tool result wherever in
    /// this tree it is pending (spec's `submitClientToolResult`). Returns
    /// `true` if something was resolved.
    pub fn submit_client_tool_result<'a>(
        &'a self,
        call_id: &'a weave_types::CallId,
        content: Vec<weave_types::ContentBlock>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let client_tools = self.client_tools().await;
            if client_tools.submit_result(call_id, Ok(content.clone())) {
                return true;
            }
            let children = self.inner.child_sessions.lock().await.values().cloned().collect::<Vec<_>>();
            for child in children {
                if child.submit_client_tool_result(call_id, content.clone()).await {
                    return true;
                }
            }
            false
        })
    }

    /// Abort every in-flight execution and close every child (recursively),
    /// releasing pending confirmation/client-tool waits (spec's `close()`).
    pub fn close<'a>(&'a self) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.inner.cancellation.cancel();
            self.inner.confirm.cancel_all();
            self.client_tools().await.cancel_all();
            let children = self.inner.child_sessions.lock().await.values().cloned().collect::<Vec<_>>();
            for child in children {
                child.close().await;
            }
        })
    }

    /// Capture this session's durable state (timeline, com state, tick
    /// count) as a `Snapshot` suitable for persisting via a
    /// `weave_types::SnapshotStore` (spec's `hibernate`). Children are not
    /// included — each spawns fresh on rehydration of a parent that chooses
    /// to re-spawn them.
    pub async fn hibernate(&self) -> Snapshot {
        let com = self.inner.com.lock().await;
        Snapshot {
            version: SNAPSHOT_VERSION,
            session_id: self.inner.id.clone(),
            tick: self.inner.last_tick.load(Ordering::Relaxed),
            timeline: com.timeline().to_vec(),
            com_state: ComState {
                state: com.state_entries().clone(),
                metadata: com.metadata_entries().clone(),
                model_options: com.model_options().cloned(),
                queued_messages: com.get_queued_messages().to_vec(),
                injected_history: com.injected_history().to_vec(),
            },
            data_cache: serde_json::json!({}),
            created_at: chrono::Utc::now(),
            metadata: None,
        }
    }

    /// Restore a previously hibernated snapshot into this session. Rejects
    /// an incompatible `version` without mutating any state.
    pub async fn hydrate(&self, snapshot: Snapshot) -> Result<(), WeaveError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(WeaveError::IncompatibleSnapshot { expected: SNAPSHOT_VERSION, actual: snapshot.version });
        }
        let mut com = self.inner.com.lock().await;
        com.restore_state(snapshot.com_state.state);
        com.restore_metadata(snapshot.com_state.metadata);
        if let Some(options) = snapshot.com_state.model_options {
            com.set_model_options(options);
        }
        for message in snapshot.com_state.queued_messages {
            com.queue_message(message);
        }
        for entry in snapshot.com_state.injected_history {
            com.inject_history(entry);
        }
        for entry in snapshot.timeline {
            com.inject_history(entry);
        }
        drop(com);
        self.inner.last_tick.store(snapshot.tick, Ordering::Relaxed);
        Ok(())
    }
}

fn fresh_id(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{n:016x}")
}
