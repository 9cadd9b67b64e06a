use crate::operation::{OperationId, OperationStatus};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid transition for operation {id}: {from} -> {to}")]
    InvalidTransition {
        id: OperationId,
        from: OperationStatus,
        to: OperationStatus,
    },

    #[error("Validation failed: {0}")]
    Validation(String),
}
