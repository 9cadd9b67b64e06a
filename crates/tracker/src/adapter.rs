//! The seam between the tracker and a backend domain.
//!
//! An [`OperationAdapter`] knows how to ask its backend about one operation
//! and how to turn failures into user-facing [`ErrorInfo`]. A [`Launcher`]
//! can additionally start new operations.

use async_trait::async_trait;
use brousla_core::operation::{Domain, ErrorInfo, OperationId};
use brousla_core::policy::PolicyKind;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// No HTTP response was received (connection refused, DNS, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The backend answered but refused or failed the request.
    #[error("{0}")]
    Rejected(String),

    /// The backend's downstream service is unreachable.
    #[error("Service offline: {0}")]
    Offline(String),

    /// The backend no longer knows the operation (expired state, purged job).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The response could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AdapterError {
    /// Default mapping onto the failure taxonomy. Transport failures and
    /// server-side HTTP statuses are retryable; offline stays offline and
    /// everything else is a domain failure.
    pub fn classify(&self) -> ErrorInfo {
        match self {
            Self::Network(msg) => ErrorInfo::network(msg.clone()),
            Self::Http { status, .. } if is_transient_status(*status) => {
                ErrorInfo::network(self.to_string())
            }
            Self::Offline(msg) => ErrorInfo::offline(msg.clone()),
            Self::Http { .. } | Self::Rejected(_) | Self::NotFound(_) | Self::InvalidResponse(_) => {
                ErrorInfo::domain(self.to_string())
            }
        }
    }
}

/// Statuses that say "try again later" rather than "this operation failed".
fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

// ---------------------------------------------------------------------------
// Check responses
// ---------------------------------------------------------------------------

/// Backend status of a polled operation, after domain interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Pending,
    Running,
    Completed,
    Error,
}

/// One interpreted status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: RemoteStatus,
    pub progress: Option<u8>,
    /// Progress text, or the failure reason when `status` is `Error`.
    pub message: Option<String>,
}

impl StatusReport {
    pub fn new(status: RemoteStatus) -> Self {
        Self {
            status,
            progress: None,
            message: None,
        }
    }

    pub fn pending() -> Self {
        Self::new(RemoteStatus::Pending)
    }

    pub fn running() -> Self {
        Self::new(RemoteStatus::Running)
    }

    pub fn completed() -> Self {
        Self::new(RemoteStatus::Completed)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(RemoteStatus::Error).with_message(message)
    }

    pub fn with_progress(mut self, progress: Option<u8>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Per-domain translation between backend responses and operation
/// transitions.
#[async_trait]
pub trait OperationAdapter: Send + Sync + 'static {
    fn domain(&self) -> Domain;

    /// Ask the backend for the operation's current status.
    async fn check(&self, id: &OperationId) -> Result<StatusReport, AdapterError>;

    /// Fetch the domain payload. Only called after `check` reported
    /// [`RemoteStatus::Completed`].
    async fn fetch_result(&self, id: &OperationId) -> Result<serde_json::Value, AdapterError>;

    /// Map a failure onto the error taxonomy.
    fn classify_failure(&self, error: &AdapterError) -> ErrorInfo {
        error.classify()
    }

    /// Best-effort remote cancellation, invoked once after the user
    /// cancelled the operation. Teardown never calls it.
    async fn cancel_remote(&self, _id: &OperationId) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Drop per-operation state. Called once when the poller exits,
    /// whatever the outcome.
    fn release(&self, _id: &OperationId) {}
}

/// Result of a successful [`Launcher::launch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Launched {
    pub id: OperationId,
    pub policy: PolicyKind,
    /// Launch payload the caller needs (e.g. the OAuth authorization URL).
    pub detail: Option<serde_json::Value>,
}

impl Launched {
    pub fn new(id: impl Into<OperationId>, policy: PolicyKind) -> Self {
        Self {
            id: id.into(),
            policy,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// An adapter that can also start new operations.
#[async_trait]
pub trait Launcher: OperationAdapter {
    type Params: Send + Sync;

    /// De-duplication key: two launches with equal keys must not run at the
    /// same time.
    fn natural_key(&self, params: &Self::Params) -> String;

    async fn launch(&self, params: &Self::Params) -> Result<Launched, AdapterError>;
}

/// Start tracking an operation whose id was obtained elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    pub id: OperationId,
    pub policy: PolicyKind,
    pub natural_key: Option<String>,
}

impl TrackRequest {
    pub fn new(id: impl Into<OperationId>, policy: PolicyKind) -> Self {
        Self {
            id: id.into(),
            policy,
            natural_key: None,
        }
    }

    pub fn with_natural_key(mut self, key: impl Into<String>) -> Self {
        self.natural_key = Some(key.into());
        self
    }
}
