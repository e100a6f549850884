//! The compile-time context handed to every `Component` method
//! (SPEC_FULL.md §4.B, §9 "Boundary" and "stable position id" notes).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use weave_com::Com;

use crate::knob::KnobStore;
use crate::NodeKey;

/// A type-erased piece of state a component attaches to its `NodeKey`,
/// preserved across compiles as long as the node's position+key stays
/// stable. Mirrors `weave_com::RefHandle`'s type-erasure idiom.
pub type StateCell = Arc<dyn Any + Send + Sync>;

/// Per-node compile context: COM access, the current position, boundary
/// stacks, knob access, and this node's persisted state cell.
pub struct CompileContext<'a> {
    /// Mutable access to the COM being assembled this compile pass.
    pub com: &'a mut Com,
    /// This node's reconciliation identity.
    pub node_key: NodeKey,
    pub(crate) knobs: &'a KnobStore,
    pub(crate) previous_cells: &'a HashMap<NodeKey, StateCell>,
    pub(crate) next_cells: &'a mut HashMap<NodeKey, StateCell>,
    pub(crate) formatter_stack: &'a mut Vec<String>,
    pub(crate) policy_stack: &'a mut Vec<serde_json::Value>,
}

impl<'a> CompileContext<'a> {
    /// This node's state cell as it stood at the end of the previous
    /// compile, if the node (by position+key) existed then.
    pub fn previous_state(&self) -> Option<&StateCell> {
        self.previous_cells.get(&self.node_key)
    }

    /// Persist a state cell for this node, read back via `previous_state`
    /// on the next compile.
    pub fn set_state(&mut self, cell: StateCell) {
        self.next_cells.insert(self.node_key.clone(), cell);
    }

    /// Push a formatter value; descendants see it via `current_formatter`
    /// until this node's subtree finishes (inner wins), at which point
    /// `walk` truncates the stack back to where it stood before this node's
    /// `render` ran. There is no matching manual pop: `render` returns
    /// before its children are walked, so the component itself never gets a
    /// chance to call one after recursing — scoping is the walker's job.
    pub fn push_formatter(&mut self, value: String) {
        self.formatter_stack.push(value);
    }

    /// The innermost formatter currently in scope, if any.
    pub fn current_formatter(&self) -> Option<&str> {
        self.formatter_stack.last().map(String::as_str)
    }

    /// Push a policy value onto the chain. Policies accumulate outer-to-inner
    /// (unlike formatters, nothing is discarded on push); scoped to this
    /// node's subtree the same way `push_formatter` is.
    pub fn push_policy(&mut self, value: serde_json::Value) {
        self.policy_stack.push(value);
    }

    /// The full outer-to-inner policy chain currently in scope.
    pub fn policy_chain(&self) -> &[serde_json::Value] {
        self.policy_stack
    }

    /// Current value of a named knob, if the model has ever set one.
    pub fn knob(&self, name: &str) -> Option<serde_json::Value> {
        self.knobs.get(name)
    }

    /// Request another collect+annotate round this compile (SPEC_FULL.md
    /// §4.B step 5). Bounded by `MAX_RECOMPILE_ITERATIONS`.
    pub fn request_recompile(&mut self, reason: Option<String>) {
        self.com.request_recompile(reason);
    }
}
