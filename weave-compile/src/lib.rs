#![deny(missing_docs)]
//! The compiler (SPEC_FULL.md §4.B): reconciles a declarative component tree
//! against the previous tick's tree, lets each component contribute to the
//! `Com`, annotates token costs, and returns a `CompiledStructure`.
//!
//! A reactive-tree-to-systems-language translation (SPEC_FULL.md §9): a
//! component's reconciliation identity is its position
//! in the tree plus an optional explicit key (`NodeKey`), giving stable
//! identity to otherwise-anonymous values. The registry is a
//! `HashMap<NodeKey, StateCell>` keyed by tree position instead of by name,
//! the same "name-keyed table of live workers" shape used elsewhere in this
//! workspace for spawn tracking.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use weave_com::Com;
use weave_types::{CompiledStructure, Message, StopReason, WeaveError};

mod context;
mod knob;
mod tokens;

pub use context::{CompileContext, StateCell};
pub use knob::{KnobStore, SetKnobTool};
pub use tokens::{default_estimator, Estimator};

/// Bound on the compiler's recompile loop (SPEC_FULL.md §4.B step 5,
/// DESIGN.md Open Question #4). Exceeding it logs
/// `WeaveError::RecompileUnstable` and proceeds with the last compiled
/// structure rather than failing the tick outright.
pub const MAX_RECOMPILE_ITERATIONS: usize = 8;

/// A node's reconciliation identity: its position in the tree plus an
/// optional explicit key. Two compiles see the "same" node iff both match.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct NodeKey {
    /// Child index at each level from the root.
    pub path: Vec<usize>,
    /// Explicit key, when the component providing it wants identity to
    /// survive a sibling reorder.
    pub key: Option<String>,
}

/// Snapshot of tick-level state a component may read while rendering
/// (SPEC_FULL.md §4.A "TickState"): which tick this is, messages queued for
/// this execution, and the outcome of the previous tick, if any.
#[derive(Debug, Clone, Default)]
pub struct TickState {
    /// 1-indexed tick counter within the current execution.
    pub tick: u32,
    /// Messages queued (e.g. via `Com::queue_message`) for this execution.
    pub queued_messages: Vec<Message>,
    /// The previous tick's stop reason, if this isn't the first tick.
    pub previous_stop_reason: Option<StopReason>,
    /// The previous tick's error, if it ended abnormally.
    pub last_error: Option<String>,
}

/// A node in the declarative component tree. Object-safe so a tree can mix
/// arbitrary component types behind `Arc<dyn Component>`, the same way
/// `weave_com::Com` stores heterogeneous tools behind `Arc<dyn
/// ExecutableTool>`.
#[async_trait]
pub trait Component: Send + Sync {
    /// Explicit reconciliation key, if this node wants identity to survive
    /// a sibling reorder. `None` falls back to pure positional identity.
    fn key(&self) -> Option<String> {
        None
    }

    /// Contribute to `ctx.com` (sections, messages, tools, ephemeral blocks,
    /// boundary pushes) and return this node's children to recurse into.
    async fn render(&self, ctx: &mut CompileContext<'_>) -> Vec<Arc<dyn Component>>;

    /// Fired once, the first compile in which this node's `NodeKey` appears.
    async fn on_mount(&self, _ctx: &mut CompileContext<'_>) {}

    /// Fired once, the first compile after this node's `NodeKey` stops
    /// appearing.
    async fn on_unmount(&self) {}

    /// Fired at the start of every tick this node is present, before
    /// `render`.
    async fn on_tick_start(&self, _ctx: &mut CompileContext<'_>) {}

    /// Fired after the collect+annotate pass. May call
    /// `ctx.request_recompile` to trigger another round, bounded by
    /// `MAX_RECOMPILE_ITERATIONS`.
    async fn on_after_compile(&self, _compiled: &CompiledStructure, _ctx: &mut CompileContext<'_>) {}
}

/// A component tree node, reference-counted so the compiler can retain the
/// previous tree's instances across compiles (needed to fire `on_unmount`
/// on a node the caller's fresh tree no longer includes).
pub type ComponentNode = Arc<dyn Component>;

/// The compiler. Owns cross-tick state that a fresh `Com` doesn't: the
/// `NodeKey -> StateCell` registry, the previous tree (for unmount
/// detection), and the knob store backing the built-in `set_knob` tool.
pub struct Compiler {
    state_cells: HashMap<NodeKey, StateCell>,
    previous_nodes: HashMap<NodeKey, ComponentNode>,
    knobs: KnobStore,
    estimator: Estimator,
    instability: Option<WeaveError>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A fresh compiler with the default token estimator and no prior tree.
    pub fn new() -> Self {
        Self {
            state_cells: HashMap::new(),
            previous_nodes: HashMap::new(),
            knobs: KnobStore::new(),
            estimator: default_estimator(),
            instability: None,
        }
    }

    /// Use a precise estimator supplied by the active model adapter instead
    /// of the default `ceil(chars/4) + 4` rule (SPEC_FULL.md §3).
    pub fn with_estimator(mut self, estimator: Estimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Take the `RecompileUnstable` error from the last compile, if the
    /// recompile loop failed to stabilize. The tick engine surfaces this as
    /// an `error` stream event without aborting the tick (SPEC_FULL.md
    /// §4.B step 5 says proceed with the last compilation).
    pub fn take_instability(&mut self) -> Option<WeaveError> {
        self.instability.take()
    }

    /// Run the full compile algorithm (SPEC_FULL.md §4.B): reconcile, let
    /// every present node render into `com`, annotate token costs, and loop
    /// on `request_recompile` up to `MAX_RECOMPILE_ITERATIONS` times.
    pub async fn compile(&mut self, root: ComponentNode, com: &mut Com, tick_state: &TickState) -> CompiledStructure {
        com.add_tool(Arc::new(SetKnobTool::new(self.knobs.clone())));

        let previous_cells = std::mem::take(&mut self.state_cells);
        let mut next_cells = HashMap::new();
        let mut current_nodes: HashMap<NodeKey, ComponentNode> = HashMap::new();
        let mut formatter_stack: Vec<String> = Vec::new();
        let mut policy_stack: Vec<serde_json::Value> = Vec::new();

        walk(
            root.clone(),
            com,
            Vec::new(),
            tick_state,
            &self.knobs,
            &self.previous_nodes,
            &previous_cells,
            &mut next_cells,
            &mut current_nodes,
            &mut formatter_stack,
            &mut policy_stack,
        )
        .await;

        fire_unmounts(&self.previous_nodes, &current_nodes).await;

        let mut compiled = snapshot(com, &self.estimator);

        let mut iterations = 0usize;
        loop {
            for (key, node) in current_nodes.iter() {
                let mut ctx = CompileContext {
                    com,
                    node_key: key.clone(),
                    knobs: &self.knobs,
                    previous_cells: &previous_cells,
                    next_cells: &mut next_cells,
                    formatter_stack: &mut formatter_stack,
                    policy_stack: &mut policy_stack,
                };
                node.on_after_compile(&compiled, &mut ctx).await;
            }

            let Some(reason) = com.take_recompile_request() else { break };
            iterations += 1;
            if iterations > MAX_RECOMPILE_ITERATIONS {
                tracing::error!(iterations, reason = ?reason, "recompile did not stabilize, proceeding with last compilation");
                self.instability = Some(WeaveError::RecompileUnstable { iterations });
                break;
            }

            // A recompile re-runs collect+annotate (steps 3-4), not a fresh
            // tick: `com.clear()` wipes exactly the per-collect-pass state
            // (timeline, system messages, sections, ephemeral, tools) while
            // leaving refs/state/metadata/queued_messages/injected_history
            // untouched, so the re-walk starts from the same empty slate the
            // first walk did instead of appending onto it (which would
            // duplicate every message and double every merged section).
            // `clear()` drops the built-in `set_knob` tool along with every
            // other registration, so it's re-added exactly as it was before
            // the first walk.
            current_nodes.clear();
            com.clear();
            com.add_tool(Arc::new(SetKnobTool::new(self.knobs.clone())));
            walk(
                root.clone(),
                com,
                Vec::new(),
                tick_state,
                &self.knobs,
                &self.previous_nodes,
                &previous_cells,
                &mut next_cells,
                &mut current_nodes,
                &mut formatter_stack,
                &mut policy_stack,
            )
            .await;
            compiled = snapshot(com, &self.estimator);
        }

        self.state_cells = next_cells;
        self.previous_nodes = current_nodes;
        compiled
    }
}

async fn fire_unmounts(previous: &HashMap<NodeKey, ComponentNode>, current: &HashMap<NodeKey, ComponentNode>) {
    for (key, node) in previous {
        if !current.contains_key(key) {
            node.on_unmount().await;
        }
    }
}

/// Recursively render `node` and its descendants into `com`, assigning each
/// a `NodeKey` from its path+key and firing `on_mount`/`on_tick_start` as
/// appropriate. Boxed because async fns can't recurse directly.
#[allow(clippy::too_many_arguments)]
fn walk<'a>(
    node: ComponentNode,
    com: &'a mut Com,
    path: Vec<usize>,
    tick_state: &'a TickState,
    knobs: &'a KnobStore,
    previous_nodes: &'a HashMap<NodeKey, ComponentNode>,
    previous_cells: &'a HashMap<NodeKey, StateCell>,
    next_cells: &'a mut HashMap<NodeKey, StateCell>,
    current_nodes: &'a mut HashMap<NodeKey, ComponentNode>,
    formatter_stack: &'a mut Vec<String>,
    policy_stack: &'a mut Vec<serde_json::Value>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        // Scope whatever this node's `render` pushes onto the boundary
        // stacks to its own subtree: captured before `render` runs, restored
        // after every child has been walked, so a sibling processed by the
        // parent's loop (or the parent itself, once this call returns) never
        // observes a value only this node intended for its descendants.
        let formatter_depth = formatter_stack.len();
        let policy_depth = policy_stack.len();

        let node_key = NodeKey { path: path.clone(), key: node.key() };
        let first_seen = !previous_nodes.contains_key(&node_key);

        let children = {
            let mut ctx = CompileContext {
                com: &mut *com,
                node_key: node_key.clone(),
                knobs,
                previous_cells,
                next_cells: &mut *next_cells,
                formatter_stack: &mut *formatter_stack,
                policy_stack: &mut *policy_stack,
            };
            let _ = tick_state;
            if first_seen {
                node.on_mount(&mut ctx).await;
            }
            node.on_tick_start(&mut ctx).await;
            node.render(&mut ctx).await
        };

        current_nodes.insert(node_key, node.clone());

        for (i, child) in children.into_iter().enumerate() {
            let mut child_path = path.clone();
            child_path.push(i);
            walk(
                child,
                com,
                child_path,
                tick_state,
                knobs,
                previous_nodes,
                previous_cells,
                next_cells,
                current_nodes,
                formatter_stack,
                policy_stack,
            )
            .await;
        }

        formatter_stack.truncate(formatter_depth);
        policy_stack.truncate(policy_depth);
    })
}

/// Build the `CompiledStructure` by reading back whatever the walk just
/// mutated into `com`, then annotating token costs (SPEC_FULL.md §4.B
/// steps 3-4: collect then annotate).
fn snapshot(com: &Com, estimator: &Estimator) -> CompiledStructure {
    let mut system: Vec<_> = com.system_messages().to_vec();
    let mut timeline_entries: Vec<_> = com.timeline().to_vec();
    for entry in system.iter_mut().chain(timeline_entries.iter_mut()) {
        tokens::annotate_entry(entry, estimator);
    }
    let total_tokens = system.iter().chain(timeline_entries.iter()).filter_map(|e| e.tokens).sum();

    CompiledStructure {
        system,
        timeline_entries,
        tools: com.tool_definitions(),
        ephemeral: com.ephemeral().to_vec(),
        sections: com.sections().clone(),
        total_tokens,
    }
}
