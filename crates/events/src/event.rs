//! Notification payloads.

use brousla_core::operation::{Domain, ErrorInfo, Operation, OperationId, OperationStatus};
use brousla_core::types::Timestamp;
use chrono::Utc;
use serde::Serialize;

/// Something that happened to one tracked operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationEvent {
    pub operation_id: OperationId,
    pub domain: Domain,
    /// The operation's poll count when the event was emitted.
    pub attempts: u32,
    pub kind: OperationEventKind,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationEventKind {
    /// A status change. Exactly one per accepted transition.
    Transition {
        from: OperationStatus,
        to: OperationStatus,
        /// Present when `to` is `error` or `timed_out`.
        error: Option<ErrorInfo>,
    },
    /// The backend reported new progress without changing status.
    Progress {
        percent: Option<u8>,
        message: Option<String>,
    },
}

impl OperationEvent {
    /// Describe the transition that produced `after` from status `from`.
    pub fn transition(from: OperationStatus, after: &Operation) -> Self {
        Self {
            operation_id: after.id.clone(),
            domain: after.domain,
            attempts: after.attempts(),
            kind: OperationEventKind::Transition {
                from,
                to: after.status(),
                error: after.error().cloned(),
            },
            timestamp: Utc::now(),
        }
    }

    /// Describe the progress currently stored on `operation`.
    pub fn progress(operation: &Operation) -> Self {
        Self {
            operation_id: operation.id.clone(),
            domain: operation.domain,
            attempts: operation.attempts(),
            kind: OperationEventKind::Progress {
                percent: operation.progress(),
                message: operation.message().map(str::to_string),
            },
            timestamp: Utc::now(),
        }
    }

    /// `(from, to)` if this is a transition.
    pub fn as_transition(&self) -> Option<(OperationStatus, OperationStatus)> {
        match self.kind {
            OperationEventKind::Transition { from, to, .. } => Some((from, to)),
            OperationEventKind::Progress { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.as_transition().is_some_and(|(_, to)| to.is_terminal())
    }
}

/// The reconciler replaced its workflow snapshot with a different one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotEvent {
    /// Workflows added, removed or changed by the new snapshot.
    pub changed: Vec<String>,
    pub workflow_count: usize,
    pub timestamp: Timestamp,
}

impl SnapshotEvent {
    pub fn new(changed: Vec<String>, workflow_count: usize) -> Self {
        Self {
            changed,
            workflow_count,
            timestamp: Utc::now(),
        }
    }
}
