//! Caller-side view of one tracked operation.

use std::sync::Arc;

use brousla_core::operation::{Operation, OperationId};
use brousla_events::{OperationEvent, Subscription};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::cell::{CancelOrigin, OperationCell};

/// Returned by [`OperationRegistry::start`](crate::OperationRegistry::start)
/// and [`track`](crate::OperationRegistry::track).
///
/// Dropping a handle does not cancel the operation.
pub struct OperationHandle {
    cell: Arc<OperationCell>,
    detail: Option<serde_json::Value>,
    /// Registered before the poller was spawned.
    initial: Mutex<Option<Subscription<OperationEvent>>>,
}

impl OperationHandle {
    pub(crate) fn new(
        cell: Arc<OperationCell>,
        detail: Option<serde_json::Value>,
        initial: Subscription<OperationEvent>,
    ) -> Self {
        Self {
            cell,
            detail,
            initial: Mutex::new(Some(initial)),
        }
    }

    pub fn id(&self) -> &OperationId {
        &self.cell.id
    }

    /// Current state of the operation.
    pub fn snapshot(&self) -> Operation {
        self.cell.snapshot()
    }

    /// Launch payload, e.g. `{"auth_url": ...}` for a sign-in.
    pub fn detail(&self) -> Option<&serde_json::Value> {
        self.detail.as_ref()
    }

    /// Request cancellation, locally and on the backend. Returns `false` if
    /// the operation is already terminal or cancelling.
    pub fn cancel(&self) -> bool {
        self.cell.request_cancel(CancelOrigin::User)
    }

    /// Receive every event of this operation.
    ///
    /// The first call returns the subscription registered when the
    /// operation was created, so it observes every transition. Later calls
    /// only see events emitted after they subscribed.
    pub fn subscribe(&self) -> Subscription<OperationEvent> {
        match self.initial.lock().take() {
            Some(subscription) => subscription,
            None => self.cell.listeners.subscribe(),
        }
    }

    /// Latest-value view of the operation, for UIs that only render state.
    pub fn watch(&self) -> watch::Receiver<Operation> {
        self.cell.state.subscribe()
    }

    /// Wait until the operation reaches a terminal status.
    pub async fn wait(&self) -> Operation {
        let mut rx = self.cell.state.subscribe();
        if let Ok(op) = rx.wait_for(Operation::is_terminal).await {
            return op.clone();
        }
        // Unreachable while the handle keeps the cell alive.
        let op = rx.borrow().clone();
        op
    }
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.cell.id)
            .field("status", &self.cell.snapshot().status())
            .finish()
    }
}
