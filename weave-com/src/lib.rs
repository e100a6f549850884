#![deny(missing_docs)]
//! The Context Object Model (SPEC_FULL.md §3, §4.A).
//!
//! `Com` is the per-execution mutable state accumulator: timeline, sections,
//! tools, ephemeral blocks, refs, state, metadata, and the stop/continue
//! control queue. It is a plain struct, not `Arc<Mutex<_>>`-wrapped — the
//! Tick Engine owns it exclusively for the duration of a tick, per §5's
//! single-tick invariant. Change events publish on a
//! `tokio::sync::broadcast::Sender<ComEvent>`; a lagging or absent
//! subscriber never blocks a mutation, keeping the same "errors or slow
//! subscribers don't halt the pipeline" posture as the hook dispatch loop.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::broadcast;
use weave_types::{
    Audience, Content, EphemeralEntry, EphemeralPosition, ExecutableTool, Message, Role, Section,
    ToolDefinition, Visibility, definition_of,
};

mod control;
mod event;

pub use control::{ControlRequest, TickControl};
pub use event::ComEvent;

/// Default broadcast channel capacity. A lagging subscriber simply misses
/// events and sees `RecvError::Lagged` on its next `recv()` — the mutation
/// path never waits on it.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Opaque handle to a component instance, stored in `refs`. Type-erased
/// because the COM itself is generic over no particular component type —
/// `weave-compile` downcasts these where it owns the concrete type.
pub type RefHandle = Arc<dyn Any + Send + Sync>;

/// Options accompanying `add_message`.
#[derive(Debug, Clone, Default)]
pub struct AddMessageOpts {
    /// Free-form tags attached to the resulting timeline entry.
    pub tags: Option<Vec<String>>,
    /// Who this entry is rendered for.
    pub visibility: Option<Visibility>,
    /// Arbitrary per-entry metadata.
    pub metadata: Option<serde_json::Value>,
}

/// The per-execution mutable state accumulator.
pub struct Com {
    timeline: Vec<weave_types::TimelineEntry>,
    system_messages: Vec<weave_types::TimelineEntry>,
    sections: BTreeMap<String, Section>,
    ephemeral: Vec<EphemeralEntry>,
    tools: HashMap<String, Arc<dyn ExecutableTool>>,
    alias_index: HashMap<String, String>,
    refs: HashMap<String, RefHandle>,
    state: HashMap<String, serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
    control_requests: Vec<ControlRequest>,
    injected_history: Vec<weave_types::TimelineEntry>,
    queued_messages: Vec<Message>,
    should_abort: bool,
    abort_reason: Option<String>,
    model_options: Option<serde_json::Value>,
    recompile_requested: bool,
    recompile_reason: Option<String>,
    events: broadcast::Sender<ComEvent>,
}

impl Default for Com {
    fn default() -> Self {
        Self::new()
    }
}

impl Com {
    /// Construct an empty COM for a fresh execution.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            timeline: Vec::new(),
            system_messages: Vec::new(),
            sections: BTreeMap::new(),
            ephemeral: Vec::new(),
            tools: HashMap::new(),
            alias_index: HashMap::new(),
            refs: HashMap::new(),
            state: HashMap::new(),
            metadata: HashMap::new(),
            control_requests: Vec::new(),
            injected_history: Vec::new(),
            queued_messages: Vec::new(),
            should_abort: false,
            abort_reason: None,
            model_options: None,
            recompile_requested: false,
            recompile_reason: None,
            events,
        }
    }

    /// Subscribe to COM change events. Drop the receiver to unsubscribe;
    /// lagging subscribers see `RecvError::Lagged`, never a blocked sender.
    pub fn subscribe(&self) -> broadcast::Receiver<ComEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ComEvent) {
        // A `SendError` here means there are no subscribers — expected and
        // harmless, matching the "dropped-subscriber sends are swallowed"
        // rule.
        let _ = self.events.send(event);
    }

    // -- messages / timeline --------------------------------------------

    /// Append a message. System-role messages go to the system prelude
    /// (never the timeline, per §3's invariant); everything else appends to
    /// the timeline.
    pub fn add_message(&mut self, message: Message, opts: AddMessageOpts) {
        let mut entry = weave_types::TimelineEntry::new(message);
        entry.tags = opts.tags;
        entry.visibility = opts.visibility;
        entry.metadata = opts.metadata;

        if entry.message.role == Role::System {
            self.system_messages.push(entry);
        } else {
            self.timeline.push(entry);
            self.emit(ComEvent::TimelineModified);
        }
        self.emit(ComEvent::MessageAdded);
    }

    /// Read-only view of the non-system timeline.
    pub fn timeline(&self) -> &[weave_types::TimelineEntry] {
        &self.timeline
    }

    /// Read-only view of the system prelude.
    pub fn system_messages(&self) -> &[weave_types::TimelineEntry] {
        &self.system_messages
    }

    // -- sections ----------------------------------------------------------

    /// Add or merge a section. Sections with equal `id` merge per
    /// `Section::merge`'s rules (last-writer-wins on scalar fields,
    /// structural merge on `value`).
    pub fn add_section(&mut self, section: Section) {
        let id = section.id.clone();
        let merged = match self.sections.remove(&id) {
            Some(existing) => existing.merge(section),
            None => section,
        };
        self.sections.insert(id.clone(), merged);
        self.emit(ComEvent::SectionUpdated { id });
    }

    /// Read-only view of the section map.
    pub fn sections(&self) -> &BTreeMap<String, Section> {
        &self.sections
    }

    // -- ephemeral -----------------------------------------------------

    /// Add an ephemeral content block, cleared at the next `clear()`.
    pub fn add_ephemeral(&mut self, content: Content, position: EphemeralPosition, order: i32, block_type: Option<String>, id: Option<String>) {
        self.ephemeral.push(EphemeralEntry { content, position, order, block_type, id });
    }

    /// Read-only view of pending ephemeral blocks.
    pub fn ephemeral(&self) -> &[EphemeralEntry] {
        &self.ephemeral
    }

    // -- tools -------------------------------------------------------------

    /// Register a tool. First registration wins on alias collision; a
    /// colliding alias is logged via `tracing::warn!` and otherwise ignored.
    pub fn add_tool(&mut self, tool: Arc<dyn ExecutableTool>) {
        let name = tool.name().to_string();
        for alias in tool.aliases() {
            if let Some(existing) = self.alias_index.get(alias) {
                if existing != &name {
                    tracing::warn!(alias = %alias, existing_tool = %existing, new_tool = %name, "alias collision, keeping first registration");
                    continue;
                }
            }
            self.alias_index.entry(alias.clone()).or_insert_with(|| name.clone());
        }
        let definition = (tool.audience() != Audience::User).then(|| definition_of(tool.as_ref()));
        self.tools.insert(name.clone(), tool);
        self.emit(ComEvent::ToolRegistered { name, definition });
    }

    /// Remove a tool and every alias pointing at it.
    pub fn remove_tool(&mut self, name: &str) {
        if self.tools.remove(name).is_some() {
            self.alias_index.retain(|_, canonical| canonical != name);
            self.emit(ComEvent::ToolRemoved { name: name.to_string() });
        }
    }

    /// Look up a tool by its canonical name. Returns tools regardless of
    /// `audience` — dispatchability is independent of model visibility.
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn ExecutableTool>> {
        self.tools.get(name).cloned()
    }

    /// Resolve an alias to its tool, if registered.
    pub fn get_tool_by_alias(&self, alias: &str) -> Option<Arc<dyn ExecutableTool>> {
        self.alias_index.get(alias).and_then(|name| self.get_tool(name))
    }

    /// Provider-facing tool definitions: every registered tool whose
    /// `audience() != User` (SPEC_FULL.md §3's visible-vs-dispatchable
    /// distinction, tested at §8 property 10).
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|t| t.audience() != Audience::User)
            .map(|t| definition_of(t.as_ref()))
            .collect()
    }

    // -- refs / state / metadata --------------------------------------------

    /// Store a component-instance ref, keyed by name. Persists across
    /// `clear()`.
    pub fn set_ref(&mut self, name: impl Into<String>, handle: RefHandle) {
        self.refs.insert(name.into(), handle);
    }

    /// Remove a ref (called on component unmount).
    pub fn remove_ref(&mut self, name: &str) {
        self.refs.remove(name);
    }

    /// Fetch a ref by name.
    pub fn get_ref(&self, name: &str) -> Option<&RefHandle> {
        self.refs.get(name)
    }

    /// Set a state value, overwriting any previous value under `key`.
    pub fn set_state(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        self.state.insert(key.clone(), value);
        self.emit(ComEvent::StateChanged { key });
    }

    /// Get a state value.
    pub fn get_state(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.get(key)
    }

    /// Shallow-merge `patch` into the existing value at `key` if both are
    /// JSON objects; otherwise behaves like `set_state`.
    pub fn set_state_partial(&mut self, key: impl Into<String>, patch: serde_json::Value) {
        let key = key.into();
        match (self.state.get_mut(&key), patch) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(patch)) => {
                existing.extend(patch);
            }
            (_, patch) => {
                self.state.insert(key.clone(), patch);
            }
        }
        self.emit(ComEvent::StateChanged { key });
    }

    /// Attach free-form metadata under `key`. Persists across `clear()`.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        self.metadata.insert(key.clone(), value);
        self.emit(ComEvent::MetadataChanged { key });
    }

    /// Read a metadata value.
    pub fn get_metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// All state entries, for hibernation snapshots.
    pub fn state_entries(&self) -> &HashMap<String, serde_json::Value> {
        &self.state
    }

    /// All metadata entries, for hibernation snapshots.
    pub fn metadata_entries(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Bulk-replace state, used when hydrating a snapshot.
    pub fn restore_state(&mut self, state: HashMap<String, serde_json::Value>) {
        self.state = state;
    }

    /// Bulk-replace metadata, used when hydrating a snapshot.
    pub fn restore_metadata(&mut self, metadata: HashMap<String, serde_json::Value>) {
        self.metadata = metadata;
    }

    // -- control -------------------------------------------------------

    /// Queue a stop request, arbitrated at the end of the tick.
    pub fn request_stop(&mut self, request: ControlRequest) {
        self.control_requests.push(request);
    }

    /// Queue a continue request, arbitrated at the end of the tick.
    pub fn request_continue(&mut self, request: ControlRequest) {
        self.control_requests.push(request);
    }

    /// End-of-tick arbitration (SPEC_FULL.md §4.A): sorts by priority,
    /// applies the highest-priority stop if any exists, otherwise overrides
    /// a non-`Continue` default with `Continue` if one was requested.
    /// Always drains the queue.
    pub fn resolve_tick_control(&mut self, default: TickControl) -> TickControl {
        control::resolve(&mut self.control_requests, default)
    }

    /// Request a recompile within the current tick. The compiler's recompile
    /// loop consumes and clears this flag after re-running steps 3-4 of its
    /// algorithm.
    pub fn request_recompile(&mut self, reason: Option<String>) {
        self.recompile_requested = true;
        self.recompile_reason = reason;
    }

    /// Whether a recompile was requested since the last `take_recompile_request`.
    pub fn recompile_requested(&self) -> bool {
        self.recompile_requested
    }

    /// Consume and clear the recompile request, returning its reason if set.
    pub fn take_recompile_request(&mut self) -> Option<Option<String>> {
        if self.recompile_requested {
            self.recompile_requested = false;
            Some(self.recompile_reason.take())
        } else {
            None
        }
    }

    // -- abort ------------------------------------------------------------

    /// Signal abort. Checked cooperatively at safe points (SPEC_FULL.md §5).
    pub fn abort(&mut self, reason: Option<String>) {
        self.should_abort = true;
        self.abort_reason = reason;
    }

    /// Whether abort has been requested.
    pub fn should_abort(&self) -> bool {
        self.should_abort
    }

    /// The reason passed to `abort`, if any.
    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    /// Reset abort state at the start of a new tick.
    pub fn reset_abort_state(&mut self) {
        self.should_abort = false;
        self.abort_reason = None;
    }

    // -- queued messages ------------------------------------------------

    /// Queue a message for the next execution (distinct from `add_message`,
    /// which appends to the current tick's timeline).
    pub fn queue_message(&mut self, message: Message) {
        self.queued_messages.push(message);
        self.emit(ComEvent::ExecutionMessage);
    }

    /// Read queued messages without consuming them.
    pub fn get_queued_messages(&self) -> &[Message] {
        &self.queued_messages
    }

    /// Clear queued messages.
    pub fn clear_queued_messages(&mut self) {
        self.queued_messages.clear();
    }

    // -- injected history -----------------------------------------------

    /// Inject a history entry. Stored separately from `timeline` so the
    /// compiler's merge step doesn't duplicate it.
    pub fn inject_history(&mut self, entry: weave_types::TimelineEntry) {
        self.injected_history.push(entry);
    }

    /// Read injected history.
    pub fn injected_history(&self) -> &[weave_types::TimelineEntry] {
        &self.injected_history
    }

    // -- model options ----------------------------------------------------

    /// Set partial model options, persisting until reset or overridden.
    pub fn set_model_options(&mut self, options: serde_json::Value) {
        self.model_options = Some(options);
        self.emit(ComEvent::ModelChanged);
    }

    /// Read model options.
    pub fn model_options(&self) -> Option<&serde_json::Value> {
        self.model_options.as_ref()
    }

    /// Clear model options back to the session default.
    pub fn reset_model_options(&mut self) {
        self.model_options = None;
        self.emit(ComEvent::ModelUnset);
    }

    // -- clear -----------------------------------------------------------

    /// Reset per-tick state at the start of a tick (SPEC_FULL.md §3's
    /// `clear()` invariant): timeline, sections, tools, ephemeral, system
    /// messages, and control requests are reset. `refs`, `state`,
    /// `queued_messages`, `injected_history`, and `model_options` are
    /// preserved.
    pub fn clear(&mut self) {
        self.timeline.clear();
        self.system_messages.clear();
        self.sections.clear();
        self.tools.clear();
        self.alias_index.clear();
        self.ephemeral.clear();
        self.control_requests.clear();
        self.emit(ComEvent::StateCleared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use weave_types::{ContentBlock, ToolContext, ToolError};

    struct EchoTool {
        name: &'static str,
        aliases: Vec<String>,
        audience: Audience,
    }

    #[async_trait]
    impl ExecutableTool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn aliases(&self) -> &[String] {
            &self.aliases
        }
        fn audience(&self) -> Audience {
            self.audience
        }
        async fn run(&self, _input: serde_json::Value, _ctx: &ToolContext) -> Result<Vec<ContentBlock>, ToolError> {
            Ok(vec![])
        }
    }

    fn echo(name: &'static str) -> Arc<dyn ExecutableTool> {
        Arc::new(EchoTool { name, aliases: vec![], audience: Audience::All })
    }

    #[test]
    fn system_messages_never_enter_the_timeline() {
        let mut com = Com::new();
        com.add_message(Message::system("be helpful"), AddMessageOpts::default());
        com.add_message(Message::user("hi"), AddMessageOpts::default());
        assert_eq!(com.timeline().len(), 1);
        assert_eq!(com.system_messages().len(), 1);
    }

    #[test]
    fn alias_collision_keeps_first_registration() {
        let mut com = Com::new();
        com.add_tool(Arc::new(EchoTool { name: "bash", aliases: vec!["shell".into()], audience: Audience::All }));
        com.add_tool(Arc::new(EchoTool { name: "exec", aliases: vec!["shell".into()], audience: Audience::All }));
        assert_eq!(com.get_tool_by_alias("shell").unwrap().name(), "bash");
    }

    #[test]
    fn user_audience_tools_are_dispatchable_but_hidden_from_definitions() {
        let mut com = Com::new();
        com.add_tool(Arc::new(EchoTool { name: "secret_tool", aliases: vec![], audience: Audience::User }));
        assert!(com.get_tool("secret_tool").is_some());
        assert!(com.tool_definitions().is_empty());
    }

    #[test]
    fn removing_a_tool_removes_its_aliases() {
        let mut com = Com::new();
        com.add_tool(Arc::new(EchoTool { name: "bash", aliases: vec!["shell".into()], audience: Audience::All }));
        com.remove_tool("bash");
        assert!(com.get_tool("bash").is_none());
        assert!(com.get_tool_by_alias("shell").is_none());
    }

    #[test]
    fn clear_preserves_refs_state_queued_messages_injected_history_and_model_options() {
        let mut com = Com::new();
        com.add_message(Message::user("hi"), AddMessageOpts::default());
        com.add_tool(echo("bash"));
        com.set_state("k", serde_json::json!(1));
        com.set_ref("r1", Arc::new(42i32));
        com.queue_message(Message::user("queued"));
        com.inject_history(weave_types::TimelineEntry::new(Message::user("history")));
        com.set_model_options(serde_json::json!({"temperature": 0.5}));

        com.clear();

        assert!(com.timeline().is_empty());
        assert!(com.get_tool("bash").is_none());
        assert_eq!(com.get_state("k"), Some(&serde_json::json!(1)));
        assert!(com.get_ref("r1").is_some());
        assert_eq!(com.get_queued_messages().len(), 1);
        assert_eq!(com.injected_history().len(), 1);
        assert!(com.model_options().is_some());
    }

    #[test]
    fn set_state_partial_shallow_merges_objects() {
        let mut com = Com::new();
        com.set_state("cfg", serde_json::json!({"a": 1, "b": 2}));
        com.set_state_partial("cfg", serde_json::json!({"b": 3, "c": 4}));
        assert_eq!(com.get_state("cfg"), Some(&serde_json::json!({"a": 1, "b": 3, "c": 4})));
    }

    #[test]
    fn abort_reset_clears_flag_and_reason() {
        let mut com = Com::new();
        com.abort(Some("user cancelled".into()));
        assert!(com.should_abort());
        com.reset_abort_state();
        assert!(!com.should_abort());
        assert!(com.abort_reason().is_none());
    }

    #[tokio::test]
    async fn subscribers_receive_events_without_blocking_mutation() {
        let mut com = Com::new();
        let mut rx = com.subscribe();
        com.add_message(Message::user("hi"), AddMessageOpts::default());
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ComEvent::MessageAdded));
    }

    #[test]
    fn dropped_subscriber_does_not_panic_on_emit() {
        let mut com = Com::new();
        com.add_message(Message::user("no subscribers"), AddMessageOpts::default());
    }

    #[test]
    fn request_recompile_sets_flag_and_take_clears_it() {
        let mut com = Com::new();
        assert!(!com.recompile_requested());
        com.request_recompile(Some("knob changed".into()));
        assert!(com.recompile_requested());
        let reason = com.take_recompile_request().unwrap();
        assert_eq!(reason, Some("knob changed".to_string()));
        assert!(!com.recompile_requested());
    }
}
