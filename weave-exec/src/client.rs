//! Client-tool result coordinator (SPEC_FULL.md §4.E.3): a `CLIENT`-kind
//! tool with `requires_response() == true` suspends until the UI calls
//! `Session::submit_client_tool_result`, or a default timeout of 30s elapses.
//! Same `HashMap<CallId, oneshot::Sender<_>>`-behind-a-`Mutex` shape as
//! `weave-confirm::ConfirmationCoordinator`, resolving with the tool's
//! result instead of a confirmation decision.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use weave_types::{CallId, ContentBlock, ToolError};

/// Default wait for a client tool response when the tool declares no
/// explicit timeout (SPEC_FULL.md §4.E.3).
pub const DEFAULT_CLIENT_TOOL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Coordinates client-tool dispatch: the executor waits on a receiver, the
/// session-facing API resolves it when the client submits a result.
#[derive(Default)]
pub struct ClientToolCoordinator {
    pending: Mutex<HashMap<CallId, oneshot::Sender<Result<Vec<ContentBlock>, ToolError>>>>,
}

impl ClientToolCoordinator {
    /// An empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait for `call_id`'s client-submitted result.
    pub fn wait_for_result(&self, call_id: CallId) -> oneshot::Receiver<Result<Vec<ContentBlock>, ToolError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("client tool registry poisoned").insert(call_id, tx);
        rx
    }

    /// Resolve a pending client tool call with its result. Returns `false`
    /// if nothing was waiting under this `call_id` (already timed out, or
    /// never dispatched).
    pub fn submit_result(&self, call_id: &CallId, result: Result<Vec<ContentBlock>, ToolError>) -> bool {
        let tx = self.pending.lock().expect("client tool registry poisoned").remove(call_id);
        match tx {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Reject every pending wait, e.g. on execution abort.
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock().expect("client tool registry poisoned");
        for (call_id, tx) in pending.drain() {
            let _ = tx.send(Err(ToolError::Abort(format!("execution aborted while waiting on client tool {call_id}"))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submitting_a_result_resolves_the_waiter() {
        let coord = ClientToolCoordinator::new();
        let rx = coord.wait_for_result(CallId::new("c1"));
        assert!(coord.submit_result(&CallId::new("c1"), Ok(vec![ContentBlock::Text { text: "ok".into() }])));
        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn submitting_for_an_unknown_call_id_is_a_harmless_no_op() {
        let coord = ClientToolCoordinator::new();
        assert!(!coord.submit_result(&CallId::new("missing"), Ok(vec![])));
    }

    #[tokio::test]
    async fn cancel_all_rejects_every_pending_waiter_with_an_abort_error() {
        let coord = ClientToolCoordinator::new();
        let rx = coord.wait_for_result(CallId::new("c1"));
        coord.cancel_all();
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(ToolError::Abort(_))));
    }
}
