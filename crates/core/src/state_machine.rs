//! Transition validation for a single [`Operation`].
//!
//! [`apply`] is pure: it returns a new operation or an
//! [`CoreError::InvalidTransition`], never touching the input. Callers treat
//! an invalid transition as a programming error, log it, and keep the
//! operation they had.

use crate::error::CoreError;
use crate::operation::{ErrorInfo, Operation, OperationStatus};

/// A request to move an operation to a new status.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionEvent {
    /// `pending -> running`.
    Start,
    /// Finished successfully with its domain payload.
    Complete { result: serde_json::Value },
    /// The backend reported a failure (or the adapter classified one).
    Fail(ErrorInfo),
    /// The caller asked to stop.
    Cancel,
    /// The poll budget ran out.
    TimeOut(ErrorInfo),
}

impl TransitionEvent {
    /// Status the operation ends up in if the event is accepted.
    pub fn target(&self) -> OperationStatus {
        match self {
            Self::Start => OperationStatus::Running,
            Self::Complete { .. } => OperationStatus::Completed,
            Self::Fail(_) => OperationStatus::Error,
            Self::Cancel => OperationStatus::Cancelled,
            Self::TimeOut(_) => OperationStatus::TimedOut,
        }
    }
}

/// Apply `event` to `operation`, returning the updated copy.
pub fn apply(operation: &Operation, event: TransitionEvent) -> Result<Operation, CoreError> {
    let from = operation.status;
    let to = event.target();

    if !from.can_transition_to(to) {
        return Err(CoreError::InvalidTransition {
            id: operation.id.clone(),
            from,
            to,
        });
    }

    let mut next = operation.clone();
    next.status = to;
    match event {
        TransitionEvent::Start | TransitionEvent::Cancel => {}
        TransitionEvent::Complete { result } => {
            next.result = Some(result);
            next.progress = Some(100);
        }
        TransitionEvent::Fail(info) | TransitionEvent::TimeOut(info) => {
            next.error = Some(info);
        }
    }
    Ok(next)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
