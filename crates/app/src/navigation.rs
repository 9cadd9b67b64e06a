//! Typed navigation requests between views.

use brousla_core::operation::OperationId;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavigationEvent {
    /// Open the workflow editor on one workflow.
    EditWorkflow { workflow_id: String },
    OpenGeneration,
    /// Show the output of a finished operation.
    ShowResult { operation_id: OperationId },
    ShowSubscription,
    SignedIn,
}
