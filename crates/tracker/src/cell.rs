//! Shared per-operation state.

use std::sync::atomic::{AtomicBool, Ordering};

use brousla_core::operation::{Operation, OperationId};
use brousla_events::{ListenerSet, OperationEvent};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Who asked for an operation to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelOrigin {
    /// The user; the backend is asked to stop as well.
    User,
    /// Local teardown (dispose, registry shutdown). Only tracking stops.
    Teardown,
}

/// State shared between the registry, handles and the operation's poller.
///
/// The poller is the only writer of status; everyone else may only raise
/// the cancellation flag through [`OperationCell::request_cancel`].
pub(crate) struct OperationCell {
    pub(crate) id: OperationId,
    pub(crate) state: watch::Sender<Operation>,
    pub(crate) listeners: ListenerSet<OperationEvent>,
    pub(crate) cancel: CancellationToken,
    /// Set when the first cancellation request came from the user.
    remote_cancel: AtomicBool,
}

impl OperationCell {
    pub(crate) fn new(operation: Operation, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(operation.clone());
        Self {
            id: operation.id,
            state,
            listeners: ListenerSet::new(),
            cancel,
            remote_cancel: AtomicBool::new(false),
        }
    }

    pub(crate) fn snapshot(&self) -> Operation {
        self.state.borrow().clone()
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.state.borrow().is_terminal()
    }

    pub(crate) fn natural_key(&self) -> Option<String> {
        self.state.borrow().natural_key.clone()
    }

    /// Raise `cancel_requested` and wake the poller. Returns `false` when the
    /// operation is terminal or cancellation was already requested.
    pub(crate) fn request_cancel(&self, origin: CancelOrigin) -> bool {
        let raised = self.state.send_if_modified(|op| {
            let raised = op.request_cancel();
            if raised && origin == CancelOrigin::User {
                self.remote_cancel.store(true, Ordering::SeqCst);
            }
            raised
        });
        if raised {
            self.cancel.cancel();
        }
        raised
    }

    /// Cancellation was requested through the flag or the token.
    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled() || self.state.borrow().cancel_requested()
    }

    /// Whether the backend should be told to stop once the cancel lands.
    pub(crate) fn cancels_remotely(&self) -> bool {
        self.remote_cancel.load(Ordering::SeqCst)
    }
}
