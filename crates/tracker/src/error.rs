use brousla_core::operation::ErrorInfo;

/// Errors returned by [`OperationRegistry`](crate::OperationRegistry).
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// An operation with the same natural key (or id) is still in flight.
    #[error("An operation for '{key}' is already in progress")]
    DuplicateOperation { key: String },

    /// The adapter's launch call failed; the message is user-facing.
    #[error("Failed to start operation: {0}")]
    Launch(ErrorInfo),
}
