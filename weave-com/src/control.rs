//! Tick control arbitration (SPEC_FULL.md §4.A `_resolveTickControl`).

/// What a control request asks the tick engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    /// End the execution after this tick.
    Stop,
    /// Run another tick.
    Continue,
}

/// A pending stop/continue request, queued via `request_stop`/`request_continue`
/// and consumed by `resolve_tick_control` at the end of the tick.
#[derive(Debug, Clone)]
pub struct ControlRequest {
    /// Higher priority wins when multiple requests of the same kind are queued.
    pub priority: i32,
    /// Human-readable reason, surfaced on `spawn_end`/`onComplete` style events.
    pub reason: Option<String>,
    /// Whether this request asks to stop or to continue.
    pub status: TickControl,
    /// Identifier of whoever issued the request (a component, a hook, ...).
    pub owner_id: Option<String>,
}

impl ControlRequest {
    /// Build a stop request.
    pub fn stop(priority: i32, reason: impl Into<Option<String>>, owner_id: impl Into<Option<String>>) -> Self {
        Self { priority, reason: reason.into(), status: TickControl::Stop, owner_id: owner_id.into() }
    }

    /// Build a continue request.
    pub fn r#continue(priority: i32, reason: impl Into<Option<String>>, owner_id: impl Into<Option<String>>) -> Self {
        Self { priority, reason: reason.into(), status: TickControl::Continue, owner_id: owner_id.into() }
    }
}

/// Resolve the queue of `ControlRequest`s into a final `TickControl`,
/// draining the queue (SPEC_FULL.md §4.A algorithm):
///
/// 1. Sort pending requests by `priority` descending.
/// 2. If any `Stop` request exists, apply the highest-priority one.
/// 3. Otherwise, if `default` is not `Continue` and a `Continue` request
///    exists, override to `Continue`.
/// 4. Otherwise return `default`.
pub fn resolve(requests: &mut Vec<ControlRequest>, default: TickControl) -> TickControl {
    requests.sort_by(|a, b| b.priority.cmp(&a.priority));

    let resolved = if let Some(stop) = requests.iter().find(|r| r.status == TickControl::Stop) {
        let _ = stop;
        TickControl::Stop
    } else if default != TickControl::Continue && requests.iter().any(|r| r.status == TickControl::Continue) {
        TickControl::Continue
    } else {
        default
    };

    requests.clear();
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_request_wins_over_default_continue() {
        let mut requests = vec![ControlRequest::stop(0, "budget exceeded".to_string(), None)];
        assert_eq!(resolve(&mut requests, TickControl::Continue), TickControl::Stop);
        assert!(requests.is_empty());
    }

    #[test]
    fn highest_priority_stop_is_applied_when_multiple_exist() {
        let mut requests = vec![
            ControlRequest::stop(1, "low".to_string(), None),
            ControlRequest::stop(10, "high".to_string(), None),
        ];
        assert_eq!(resolve(&mut requests, TickControl::Continue), TickControl::Stop);
    }

    #[test]
    fn continue_request_overrides_non_continue_default() {
        let mut requests = vec![ControlRequest::r#continue(0, None, None)];
        assert_eq!(resolve(&mut requests, TickControl::Stop), TickControl::Continue);
    }

    #[test]
    fn default_wins_when_queue_is_empty() {
        let mut requests = Vec::new();
        assert_eq!(resolve(&mut requests, TickControl::Stop), TickControl::Stop);
        assert_eq!(resolve(&mut requests, TickControl::Continue), TickControl::Continue);
    }

    #[test]
    fn queue_is_cleared_after_resolution() {
        let mut requests = vec![ControlRequest::stop(0, None, None)];
        resolve(&mut requests, TickControl::Continue);
        assert!(requests.is_empty());
    }
}
