//! Per-domain poll policies.
//!
//! A [`PollPolicy`] is copied into each [`crate::operation::Operation`] at
//! creation. The defaults in [`PolicyTable::default`] mirror how the desktop
//! front-end has always polled each backend; every entry can be replaced via
//! [`PolicyTable::set`].

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::error::CoreError;
use crate::operation::Domain;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Poll interval shared by generation, OAuth and checkout polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Image generation timeout.
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Video generation timeout (image-to-video and text-to-video).
pub const DEFAULT_VIDEO_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// OAuth sign-in timeout.
pub const DEFAULT_OAUTH_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Workflow activation / reconciliation interval.
pub const DEFAULT_WORKFLOW_INTERVAL: Duration = Duration::from_secs(5);
/// Status refreshes after Stripe reports a successful checkout.
pub const DEFAULT_CHECKOUT_SUCCESS_ATTEMPTS: u32 = 15;
/// Status refreshes after the checkout window closes without an outcome.
pub const DEFAULT_CHECKOUT_CLOSED_ATTEMPTS: u32 = 5;
/// Grace period for the billing webhook to land before the first refresh.
pub const DEFAULT_CHECKOUT_START_DELAY: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Policy types
// ---------------------------------------------------------------------------

/// How long a poller may keep polling before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Budget {
    /// Poll until a terminal response or cancellation.
    Unbounded,
    /// Give up once `attempts * interval >= timeout`.
    Timeout(Duration),
    /// Give up once `attempts >= max`.
    MaxAttempts(u32),
}

impl Budget {
    /// Whether `attempts` polls at `interval` have used up this budget.
    pub fn is_exhausted(self, attempts: u32, interval: Duration) -> bool {
        match self {
            Self::Unbounded => false,
            Self::Timeout(timeout) => interval.saturating_mul(attempts) >= timeout,
            Self::MaxAttempts(max) => attempts >= max,
        }
    }
}

/// When a `pending` operation is promoted to `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningWhen {
    /// The first non-terminal backend response promotes the operation.
    FirstResponse,
    /// Only an explicit `running` status from the backend promotes it.
    BackendRunning,
}

/// Polling rules for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollPolicy {
    /// Sleep between consecutive checks.
    pub interval: Duration,
    pub budget: Budget,
    /// Sleep before the first check. Zero means check immediately.
    pub start_delay: Duration,
    /// Perform one best-effort reconciliation check when the budget runs out.
    pub final_check: bool,
    pub running_when: RunningWhen,
}

impl PollPolicy {
    pub fn new(interval: Duration, budget: Budget) -> Self {
        Self {
            interval,
            budget,
            start_delay: Duration::ZERO,
            final_check: false,
            running_when: RunningWhen::FirstResponse,
        }
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn with_final_check(mut self, final_check: bool) -> Self {
        self.final_check = final_check;
        self
    }

    pub fn with_running_when(mut self, running_when: RunningWhen) -> Self {
        self.running_when = running_when;
        self
    }

    /// Reject policies a poller could not honour.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval.is_zero() {
            return Err(CoreError::Validation(
                "Poll interval must be greater than zero".to_string(),
            ));
        }
        match self.budget {
            Budget::Timeout(t) if t.is_zero() => Err(CoreError::Validation(
                "Timeout must be greater than zero".to_string(),
            )),
            Budget::MaxAttempts(0) => Err(CoreError::Validation(
                "Max attempts must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.budget.is_exhausted(attempts, self.interval)
    }
}

// ---------------------------------------------------------------------------
// Policy table
// ---------------------------------------------------------------------------

/// The situations that carry their own polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    GenerationImage,
    GenerationVideo,
    WorkflowActivation,
    OAuthSignIn,
    /// Stripe reported success; wait for the webhook to update the account.
    CheckoutSuccess,
    /// The checkout window closed without an explicit outcome.
    CheckoutClosed,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 6] = [
        Self::GenerationImage,
        Self::GenerationVideo,
        Self::WorkflowActivation,
        Self::OAuthSignIn,
        Self::CheckoutSuccess,
        Self::CheckoutClosed,
    ];

    pub fn domain(self) -> Domain {
        match self {
            Self::GenerationImage | Self::GenerationVideo => Domain::Generation,
            Self::WorkflowActivation => Domain::Workflow,
            Self::OAuthSignIn => Domain::OAuth,
            Self::CheckoutSuccess | Self::CheckoutClosed => Domain::Checkout,
        }
    }

    /// Built-in default for this kind.
    pub fn default_policy(self) -> PollPolicy {
        match self {
            Self::GenerationImage => {
                PollPolicy::new(DEFAULT_POLL_INTERVAL, Budget::Timeout(DEFAULT_IMAGE_TIMEOUT))
                    .with_final_check(true)
            }
            Self::GenerationVideo => {
                PollPolicy::new(DEFAULT_POLL_INTERVAL, Budget::Timeout(DEFAULT_VIDEO_TIMEOUT))
                    .with_final_check(true)
            }
            Self::WorkflowActivation => {
                PollPolicy::new(DEFAULT_WORKFLOW_INTERVAL, Budget::Unbounded)
                    .with_running_when(RunningWhen::BackendRunning)
            }
            Self::OAuthSignIn => {
                PollPolicy::new(DEFAULT_POLL_INTERVAL, Budget::Timeout(DEFAULT_OAUTH_TIMEOUT))
            }
            Self::CheckoutSuccess => PollPolicy::new(
                DEFAULT_POLL_INTERVAL,
                Budget::MaxAttempts(DEFAULT_CHECKOUT_SUCCESS_ATTEMPTS),
            )
            .with_start_delay(DEFAULT_CHECKOUT_START_DELAY)
            .with_final_check(true),
            Self::CheckoutClosed => PollPolicy::new(
                DEFAULT_POLL_INTERVAL,
                Budget::MaxAttempts(DEFAULT_CHECKOUT_CLOSED_ATTEMPTS),
            )
            .with_final_check(true),
        }
    }
}

/// Configurable mapping from [`PolicyKind`] to [`PollPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    policies: HashMap<PolicyKind, PollPolicy>,
}

impl PolicyTable {
    /// Policy for `kind`, falling back to the built-in default.
    pub fn get(&self, kind: PolicyKind) -> PollPolicy {
        self.policies
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.default_policy())
    }

    /// Replace the policy for `kind` after validating it.
    pub fn set(&mut self, kind: PolicyKind, policy: PollPolicy) -> Result<(), CoreError> {
        policy.validate()?;
        self.policies.insert(kind, policy);
        Ok(())
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, kind: PolicyKind, policy: PollPolicy) -> Result<Self, CoreError> {
        self.set(kind, policy)?;
        Ok(self)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        let policies = PolicyKind::ALL
            .into_iter()
            .map(|kind| (kind, kind.default_policy()))
            .collect();
        Self { policies }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
