#![deny(missing_docs)]
//! Tool confirmation coordinator (SPEC_FULL.md §4.D).
//!
//! Models the `NONE → PENDING → (APPROVED | DENIED | CANCELLED)` state
//! machine per `callId` as a `HashMap<CallId, oneshot::Sender<..>>` guarded
//! by a `std::sync::Mutex` — a registry of pending work keyed by id,
//! resolved out-of-band, generalized from a single cancellation flag into a
//! per-call approve/deny/cancel channel.
//!
//! A `callId` may pass through this coordinator twice in one dispatch: once
//! for pre-execution confirmation, once more for sandbox-access recovery.
//! Each `wait_for_confirmation` call registers an independent pending entry;
//! the coordinator caches no decisions across calls (persisting "always
//! allow" is the caller's responsibility).

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use weave_types::CallId;

/// The outcome of a confirmation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResolution {
    /// Approved; `always` indicates the caller should persist this decision.
    Approved {
        /// Whether to treat this as a standing approval for future calls.
        always: bool,
    },
    /// Denied by the user.
    Denied,
    /// The coordinator was torn down (`cancel_all`) while this was pending.
    Cancelled,
}

impl From<oneshot::error::RecvError> for ConfirmationResolution {
    fn from(_: oneshot::error::RecvError) -> Self {
        ConfirmationResolution::Cancelled
    }
}

/// Registry of pending tool-call confirmations, keyed by `CallId`.
///
/// Cheaply cloneable — internally an `Arc`-free `Mutex`-guarded map shared by
/// reference, matching the executor's need to hold one coordinator per
/// execution while confirmations resolve from a separate task (the UI/client
/// side calling `resolve_confirmation`).
#[derive(Default)]
pub struct ConfirmationCoordinator {
    pending: Mutex<HashMap<CallId, oneshot::Sender<ConfirmationResolution>>>,
}

impl ConfirmationCoordinator {
    /// Create an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending confirmation for `call_id` and return a future
    /// that resolves when `resolve_confirmation` or `cancel_all` is called.
    ///
    /// `tool_name` isn't needed by the coordinator itself (the caller
    /// already knows which tool is asking), but callers building the
    /// `tool_confirmation_required` event typically want it alongside.
    pub fn wait_for_confirmation(
        &self,
        call_id: CallId,
        tool_name: &str,
    ) -> oneshot::Receiver<ConfirmationResolution> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().expect("confirmation registry poisoned");
        if pending.insert(call_id.clone(), tx).is_some() {
            tracing::warn!(call_id = %call_id, tool = tool_name, "replacing an already-pending confirmation wait");
        }
        rx
    }

    /// Resolve a pending confirmation, transitioning PENDING → APPROVED|DENIED.
    ///
    /// Returns `false` if no confirmation was pending for `call_id` (already
    /// resolved, cancelled, or never registered) — callers should treat this
    /// as a no-op, not an error, since a duplicate or late resolution can
    /// legitimately race with `cancel_all`.
    pub fn resolve_confirmation(&self, call_id: &CallId, approved: bool, always: bool) -> bool {
        let tx = {
            let mut pending = self.pending.lock().expect("confirmation registry poisoned");
            pending.remove(call_id)
        };
        match tx {
            Some(tx) => {
                let resolution = if approved {
                    ConfirmationResolution::Approved { always }
                } else {
                    ConfirmationResolution::Denied
                };
                // Ignore send failure: the waiter may have been dropped
                // (e.g. its execution aborted concurrently).
                let _ = tx.send(resolution);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending confirmation, rejecting each waiter with
    /// `Cancelled`. Used on abort.
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock().expect("confirmation registry poisoned");
        // Dropping each sender resolves its receiver with `RecvError`, which
        // `ConfirmationResolution::from` maps to `Cancelled` — but we send
        // explicitly so callers awaiting the receiver directly (without the
        // `From` conversion) still see `Cancelled` rather than a raw
        // `RecvError`.
        for (_, tx) in pending.drain() {
            let _ = tx.send(ConfirmationResolution::Cancelled);
        }
    }

    /// Number of confirmations currently pending. Test/introspection helper.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("confirmation registry poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> CallId {
        CallId::new(id)
    }

    #[tokio::test]
    async fn resolve_confirmation_approves_waiter() {
        let coord = ConfirmationCoordinator::new();
        let rx = coord.wait_for_confirmation(call("c1"), "bash");
        assert!(coord.resolve_confirmation(&call("c1"), true, false));
        let resolution = rx.await.unwrap();
        assert_eq!(resolution, ConfirmationResolution::Approved { always: false });
    }

    #[tokio::test]
    async fn resolve_confirmation_denies_waiter() {
        let coord = ConfirmationCoordinator::new();
        let rx = coord.wait_for_confirmation(call("c1"), "bash");
        assert!(coord.resolve_confirmation(&call("c1"), false, false));
        assert_eq!(rx.await.unwrap(), ConfirmationResolution::Denied);
    }

    #[tokio::test]
    async fn cancel_all_rejects_every_pending_waiter() {
        let coord = ConfirmationCoordinator::new();
        let rx1 = coord.wait_for_confirmation(call("c1"), "bash");
        let rx2 = coord.wait_for_confirmation(call("c2"), "grep");
        coord.cancel_all();
        assert_eq!(rx1.await.unwrap(), ConfirmationResolution::Cancelled);
        assert_eq!(rx2.await.unwrap(), ConfirmationResolution::Cancelled);
        assert_eq!(coord.pending_count(), 0);
    }

    #[tokio::test]
    async fn resolving_unknown_call_id_is_a_harmless_no_op() {
        let coord = ConfirmationCoordinator::new();
        assert!(!coord.resolve_confirmation(&call("ghost"), true, false));
    }

    #[tokio::test]
    async fn dropped_sender_resolves_receiver_as_cancelled() {
        let coord = ConfirmationCoordinator::new();
        let rx = coord.wait_for_confirmation(call("c1"), "bash");
        coord.cancel_all();
        let resolution: ConfirmationResolution = rx.await.unwrap();
        assert_eq!(resolution, ConfirmationResolution::Cancelled);
    }

    #[tokio::test]
    async fn a_call_id_can_be_reused_for_a_second_independent_wait() {
        // Models the "twice per call" rule: pre-execution confirmation, then
        // sandbox-access recovery, for the same callId.
        let coord = ConfirmationCoordinator::new();
        let rx1 = coord.wait_for_confirmation(call("c1"), "bash");
        coord.resolve_confirmation(&call("c1"), true, false);
        assert_eq!(rx1.await.unwrap(), ConfirmationResolution::Approved { always: false });

        let rx2 = coord.wait_for_confirmation(call("c1"), "bash");
        coord.resolve_confirmation(&call("c1"), false, false);
        assert_eq!(rx2.await.unwrap(), ConfirmationResolution::Denied);
    }
}
