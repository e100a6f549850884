//! Handles returned by `Session::render`/`send`/`spawn`: a way to drain an
//! execution's events and await its outcome without holding the session
//! itself locked.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use weave_provider::Provider;
use weave_tick::TickOutcome;
use weave_types::{SpawnId, StreamEvent};

use crate::Session;

/// A single render/send execution: its event stream and its completion.
pub struct ExecutionHandle {
    /// Resolves to the tick engine's outcome once the execution completes.
    pub result: JoinHandle<TickOutcome>,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancellation: CancellationToken,
}

impl ExecutionHandle {
    pub(crate) fn new(result: JoinHandle<TickOutcome>, events: mpsc::UnboundedReceiver<StreamEvent>, cancellation: CancellationToken) -> Self {
        Self { result, events, cancellation }
    }

    /// Receive the next event for this execution, or `None` once the
    /// execution has finished emitting and the channel has closed.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Cancel this execution (and anything it spawned).
    pub fn abort(&self) {
        self.cancellation.cancel();
    }
}

/// A spawned child: its session handle (for further `render`/`spawn`/
/// `submit_tool_result` calls scoped to it) and its outer execution's
/// outcome.
pub struct ChildHandle<P: Provider + Send + Sync + 'static> {
    /// The id this spawn was assigned; prefixes `spawn_path` on every event
    /// forwarded from this child.
    pub spawn_id: SpawnId,
    /// The spawned child's own session, usable independently (e.g. to
    /// `subscribe()` directly or spawn further grandchildren).
    pub session: Session<P>,
    /// Resolves to the child's outer render outcome once it completes.
    pub result: JoinHandle<TickOutcome>,
}
