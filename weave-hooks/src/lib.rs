#![deny(missing_docs)]
//! Lifecycle hook registry for the weave tick engine.
//!
//! An ordered pipeline of hooks, dispatched in registration order, with
//! short-circuit-on-non-Continue and swallow-hook-errors semantics.
//! `HookPoint` covers the tick engine's lifecycle callbacks named in
//! SPEC_FULL.md §6 (`onTickStart`, `onBeforeSend`, `onAfterSend`,
//! `onTickEnd`, `onComplete`, `onEvent`).

use std::sync::Arc;

use weave_types::StreamEvent;

/// Where in the tick lifecycle a hook fires.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Start of a tick, before `com.clear()`/compile.
    TickStart,
    /// After compile, before the model adapter is invoked.
    BeforeSend,
    /// After the model stream completes and tool results are dispatched.
    AfterSend,
    /// End of a tick, after stop/continue arbitration.
    TickEnd,
    /// The execution has reached a terminal state.
    Complete,
    /// Any stream event about to be emitted upward (including forwarded
    /// child events — spawn semantics mean `onEvent` always fires even
    /// though the other points do not for child ticks).
    Event,
}

/// What a hook observes at its firing point. This context is tick-scoped
/// rather than tool-call-scoped: `event` is populated only at `Event`.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub point: HookPoint,
    pub tick: u32,
    pub event: Option<StreamEvent>,
    pub error: Option<String>,
}

impl HookContext {
    /// Build a context for a non-event lifecycle point.
    pub fn lifecycle(point: HookPoint, tick: u32) -> Self {
        Self { point, tick, event: None, error: None }
    }

    /// Build a context for the `Event` point.
    pub fn for_event(tick: u32, event: StreamEvent) -> Self {
        Self { point: HookPoint::Event, tick, event: Some(event), error: None }
    }
}

/// What a hook decides to do. Tick-level hooks observe and may halt; they do
/// not rewrite tool input/output (that level of interception belongs to
/// `weave-exec`'s middleware chain).
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum HookAction {
    /// Continue normally.
    Continue,
    /// Halt the execution; surfaces as `WeaveError::Aborted(reason)`.
    Halt {
        /// Reason for halting.
        reason: String,
    },
}

/// Error raised by a hook's own logic. Logged, never halts the pipeline —
/// use `HookAction::Halt` to halt.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The hook's own logic failed.
    #[error("hook failed: {0}")]
    Failed(String),
}

/// A hook observing the tick lifecycle.
#[async_trait::async_trait]
pub trait Hook: Send + Sync {
    /// Which points this hook fires at.
    fn points(&self) -> &[HookPoint];

    /// Called at each registered point this hook is subscribed to.
    async fn on_event(&self, ctx: &HookContext) -> Result<HookAction, HookError>;
}

/// An ordered pipeline of hooks, dispatched in registration order.
///
/// Short-circuits on the first non-`Continue` action. Hook errors are
/// logged via `tracing::warn!` and treated as `Continue`.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add a hook to the end of the pipeline.
    pub fn add(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    /// Dispatch a lifecycle event through the pipeline.
    pub async fn dispatch(&self, ctx: &HookContext) -> HookAction {
        for hook in &self.hooks {
            if !hook.points().contains(&ctx.point) {
                continue;
            }
            match hook.on_event(ctx).await {
                Ok(HookAction::Continue) => continue,
                Ok(action) => return action,
                Err(e) => {
                    tracing::warn!(error = %e, point = ?ctx.point, "hook failed, continuing");
                    continue;
                }
            }
        }
        HookAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HaltingHook;

    #[async_trait::async_trait]
    impl Hook for HaltingHook {
        fn points(&self) -> &[HookPoint] {
            &[HookPoint::TickStart]
        }

        async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
            Ok(HookAction::Halt { reason: "budget exceeded".into() })
        }
    }

    struct FailingHook;

    #[async_trait::async_trait]
    impl Hook for FailingHook {
        fn points(&self) -> &[HookPoint] {
            &[HookPoint::TickEnd]
        }

        async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
            Err(HookError::Failed("oops".into()))
        }
    }

    #[tokio::test]
    async fn dispatch_short_circuits_on_halt() {
        let mut registry = HookRegistry::new();
        registry.add(Arc::new(HaltingHook));
        let ctx = HookContext::lifecycle(HookPoint::TickStart, 0);
        let action = registry.dispatch(&ctx).await;
        assert!(matches!(action, HookAction::Halt { .. }));
    }

    #[tokio::test]
    async fn dispatch_ignores_points_not_subscribed() {
        let mut registry = HookRegistry::new();
        registry.add(Arc::new(HaltingHook));
        let ctx = HookContext::lifecycle(HookPoint::TickEnd, 0);
        let action = registry.dispatch(&ctx).await;
        assert!(matches!(action, HookAction::Continue));
    }

    #[tokio::test]
    async fn hook_errors_are_swallowed_as_continue() {
        let mut registry = HookRegistry::new();
        registry.add(Arc::new(FailingHook));
        let ctx = HookContext::lifecycle(HookPoint::TickEnd, 0);
        let action = registry.dispatch(&ctx).await;
        assert!(matches!(action, HookAction::Continue));
    }
}
