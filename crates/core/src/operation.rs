//! The tracked long-running remote operation and its vocabulary.
//!
//! An [`Operation`] is created in [`OperationStatus::Pending`] and only
//! changes status through [`crate::state_machine::apply`]. Poll bookkeeping
//! (`attempts`, `last_polled_at`) and backend-reported progress are updated
//! through the dedicated methods on [`Operation`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::policy::PollPolicy;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque operation identifier, unique within its [`Domain`].
///
/// For generation jobs this is the backend `prompt_id`, for OAuth the
/// `state` token, for workflows the workflow id and for checkout the Stripe
/// session id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OperationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for OperationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The kind of remote work an operation represents. Selects the adapter
/// that governs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Generation,
    Workflow,
    #[serde(rename = "oauth")]
    OAuth,
    Checkout,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Workflow => write!(f, "workflow"),
            Self::OAuth => write!(f, "oauth"),
            Self::Checkout => write!(f, "checkout"),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an operation.
///
/// ```text
/// Pending -> Running, Completed, Error, Cancelled, TimedOut
/// Running -> Completed, Error, Cancelled, TimedOut
/// Completed | Error | Cancelled | TimedOut -> (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
    TimedOut,
}

impl OperationStatus {
    /// All statuses, in declaration order.
    pub const ALL: [OperationStatus; 6] = [
        Self::Pending,
        Self::Running,
        Self::Completed,
        Self::Error,
        Self::Cancelled,
        Self::TimedOut,
    ];

    /// Returns `true` for `Completed`, `Error`, `Cancelled` and `TimedOut`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Error | Self::Cancelled | Self::TimedOut
        )
    }

    /// Returns `true` if moving from `self` to `next` is a valid transition.
    ///
    /// Self-transitions are rejected, and nothing leaves a terminal state.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Error | Self::Cancelled | Self::TimedOut => false,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error info
// ---------------------------------------------------------------------------

/// Classification of an operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Fetch/connection failure talking to the backend. Retried within budget.
    Network,
    /// The backend explicitly reported a failure. Terminal.
    Domain,
    /// The backend reported its downstream service (e.g. ComfyUI) as
    /// unreachable. Terminal, surfaced with a "service not running" affordance.
    Offline,
    /// The poll budget was exhausted without a terminal response.
    Timeout,
}

impl ErrorKind {
    /// Whether the poller should retry a check that failed with this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Domain => write!(f, "domain"),
            Self::Offline => write!(f, "offline"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// User-facing failure description attached to `error` / `timed_out`
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn domain(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Domain, message)
    }

    pub fn offline(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Offline, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// One tracked long-running remote task.
///
/// Status, result and error are only reachable through accessors; they are
/// written exclusively by [`crate::state_machine::apply`] so that
/// `result.is_some() == (status == Completed)` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub id: OperationId,
    pub domain: Domain,
    /// Poll policy fixed at creation.
    pub policy: PollPolicy,
    /// De-duplication key the operation was started under, if any.
    pub natural_key: Option<String>,
    pub started_at: Timestamp,
    pub(crate) status: OperationStatus,
    pub(crate) last_polled_at: Option<Timestamp>,
    pub(crate) attempts: u32,
    pub(crate) result: Option<serde_json::Value>,
    pub(crate) error: Option<ErrorInfo>,
    pub(crate) cancel_requested: bool,
    pub(crate) progress: Option<u8>,
    pub(crate) message: Option<String>,
}

impl Operation {
    /// Create a new operation in `Pending`.
    pub fn new(
        id: impl Into<OperationId>,
        domain: Domain,
        policy: PollPolicy,
        natural_key: Option<String>,
        started_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            domain,
            policy,
            natural_key,
            started_at,
            status: OperationStatus::Pending,
            last_polled_at: None,
            attempts: 0,
            result: None,
            error: None,
            cancel_requested: false,
            progress: None,
            message: None,
        }
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_polled_at(&self) -> Option<Timestamp> {
        self.last_polled_at
    }

    /// Domain-specific payload, present only on `Completed`.
    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    /// Failure description, present only on `Error` / `TimedOut`.
    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Latest backend-reported progress percentage.
    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    /// Latest backend-reported status message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Record one poll: `attempts` grows by exactly one.
    pub fn record_poll(&mut self, at: Timestamp) {
        self.attempts += 1;
        self.last_polled_at = Some(at);
    }

    /// Raise the cooperative cancellation flag. Ignored once terminal.
    pub fn request_cancel(&mut self) -> bool {
        if self.is_terminal() || self.cancel_requested {
            return false;
        }
        self.cancel_requested = true;
        true
    }

    /// Store backend-reported progress. Returns `true` if anything changed.
    ///
    /// Percentages above 100 are clamped; terminal operations are frozen.
    pub fn update_progress(&mut self, progress: Option<u8>, message: Option<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        let progress = progress.map(|p| p.min(100)).or(self.progress);
        let message = message.or_else(|| self.message.clone());
        if progress == self.progress && message == self.message {
            return false;
        }
        self.progress = progress;
        self.message = message;
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
