//! The built-in `set_knob` tool (SPEC_FULL.md §4.B).
//!
//! Components gate expansion of collapsed content ("show the full diff",
//! "expand stack trace") behind a named knob the model flips with a single
//! built-in tool call. The compiler registers one `SetKnobTool` into every
//! `Com` at the start of `compile`, wired to a `KnobStore` that survives
//! across ticks (owned by the `Compiler`, not the `Com`, since `Com::clear()`
//! wipes tools every tick).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use weave_types::{Audience, ContentBlock, ExecutableTool, ToolContext, ToolError, ToolKind};

/// Shared, cross-tick store of knob values. Cheap to clone (`Arc<Mutex<_>>`
/// inside), matching the shared-registry idiom used for `weave-com::Com`'s
/// own tool registry.
#[derive(Clone, Default)]
pub struct KnobStore(Arc<Mutex<HashMap<String, serde_json::Value>>>);

impl KnobStore {
    /// An empty knob store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a knob, if ever set.
    pub fn get(&self, name: &str) -> Option<serde_json::Value> {
        self.0.lock().expect("knob store poisoned").get(name).cloned()
    }

    /// Set a knob's value.
    pub fn set(&self, name: String, value: serde_json::Value) {
        self.0.lock().expect("knob store poisoned").insert(name, value);
    }
}

/// The built-in tool through which the model flips a named knob. Registered
/// by the compiler itself at the start of every compile pass, not by user
/// code.
pub struct SetKnobTool {
    store: KnobStore,
}

impl SetKnobTool {
    /// Build the tool, wired to the given shared knob store.
    pub fn new(store: KnobStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ExecutableTool for SetKnobTool {
    fn name(&self) -> &str {
        "set_knob"
    }

    fn description(&self) -> &str {
        "Set a named knob that gates expansion of collapsed content blocks in the rendered context."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "value": {}
            },
            "required": ["name"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Server
    }

    fn audience(&self) -> Audience {
        Audience::Model
    }

    async fn run(&self, input: serde_json::Value, _ctx: &ToolContext) -> Result<Vec<ContentBlock>, ToolError> {
        let name = input
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Validation("set_knob requires a string `name`".to_string()))?
            .to_string();
        let value = input.get("value").cloned().unwrap_or(serde_json::Value::Bool(true));
        self.store.set(name.clone(), value);
        Ok(vec![ContentBlock::Text { text: format!("knob '{name}' set") }])
    }
}
