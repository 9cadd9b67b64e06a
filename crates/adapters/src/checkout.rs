//! Stripe subscription checkout.
//!
//! Checkout itself happens in an external window. The window reports one
//! [`CheckoutEvent`]; [`await_checkout`] turns it into a tracked operation
//! that refreshes the subscription status until the billing webhook has
//! upgraded the account.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use brousla_client::messages::{CheckoutSession, Plan, SubscriptionStatus};
use brousla_client::AccountApi;
use brousla_core::operation::{Domain, OperationId};
use brousla_core::policy::PolicyKind;
use brousla_tracker::{
    AdapterError, OperationAdapter, OperationHandle, OperationRegistry, StatusReport,
    TrackRequest, TrackerError,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::convert::client_error;

/// Outcome reported by the checkout window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutEvent {
    /// Stripe redirected to the success URL.
    Success,
    /// The user pressed "back" / cancel on the Stripe page.
    Cancelled,
    /// The window closed without either redirect.
    Closed,
}

/// Adapter over the account service's subscription endpoints.
pub struct CheckoutAdapter {
    api: AccountApi,
    token: String,
    /// Plan requested per checkout session.
    plans: Mutex<HashMap<OperationId, Option<Plan>>>,
    /// Latest status document per session.
    statuses: Mutex<HashMap<OperationId, SubscriptionStatus>>,
}

impl CheckoutAdapter {
    /// * `token` - bearer token of the signed-in user.
    pub fn new(api: AccountApi, token: impl Into<String>) -> Self {
        Self {
            api,
            token: token.into(),
            plans: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    /// Create a checkout session and remember which plan it is for.
    pub async fn create_session(&self, plan: Plan) -> Result<CheckoutSession, AdapterError> {
        let session = self
            .api
            .create_checkout(&self.token, plan)
            .await
            .map_err(client_error)?;
        self.plans
            .lock()
            .insert(OperationId::new(session.session_id.clone()), Some(plan));
        tracing::info!(session_id = %session.session_id, plan = %plan, "Checkout session created");
        Ok(session)
    }

    /// Whether any state is still cached for `session_id`.
    pub fn has_session(&self, session_id: &str) -> bool {
        let id = OperationId::new(session_id);
        self.plans.lock().contains_key(&id) || self.statuses.lock().contains_key(&id)
    }

    /// Current subscription document, outside of any tracked operation.
    pub async fn subscription_status(&self) -> Result<SubscriptionStatus, AdapterError> {
        self.api
            .subscription_status(&self.token)
            .await
            .map_err(client_error)
    }
}

#[async_trait]
impl OperationAdapter for CheckoutAdapter {
    fn domain(&self) -> Domain {
        Domain::Checkout
    }

    async fn check(&self, id: &OperationId) -> Result<StatusReport, AdapterError> {
        let status = self.subscription_status().await?;
        let plan = self.plans.lock().get(id).copied().flatten();

        let upgraded = status.is_active() && status.has_plan(plan);
        let message = status.message.clone();
        self.statuses.lock().insert(id.clone(), status);

        let report = if upgraded {
            StatusReport::completed()
        } else {
            StatusReport::pending()
        };
        Ok(match message {
            Some(message) => report.with_message(message),
            None => report,
        })
    }

    async fn fetch_result(&self, id: &OperationId) -> Result<serde_json::Value, AdapterError> {
        let status = self.statuses.lock().remove(id);
        let status = match status {
            Some(status) => status,
            None => self.subscription_status().await?,
        };
        serde_json::to_value(&status).map_err(|e| AdapterError::InvalidResponse(e.to_string()))
    }

    fn release(&self, id: &OperationId) {
        self.plans.lock().remove(id);
        self.statuses.lock().remove(id);
    }
}

/// Wait for the checkout window's outcome and track the matching refresh.
///
/// `Success` and `Closed` start polling with their own policies; `Cancelled`
/// starts nothing and forgets the session. A dropped event channel counts as `Closed`.
pub async fn await_checkout(
    registry: &OperationRegistry,
    adapter: Arc<CheckoutAdapter>,
    session: &CheckoutSession,
    events: &mut mpsc::Receiver<CheckoutEvent>,
) -> Result<Option<OperationHandle>, TrackerError> {
    let event = events.recv().await.unwrap_or(CheckoutEvent::Closed);
    tracing::info!(session_id = %session.session_id, event = ?event, "Checkout window reported");

    let policy = match event {
        CheckoutEvent::Success => PolicyKind::CheckoutSuccess,
        CheckoutEvent::Closed => PolicyKind::CheckoutClosed,
        CheckoutEvent::Cancelled => {
            adapter.release(&OperationId::new(session.session_id.as_str()));
            return Ok(None);
        }
    };
    let request = TrackRequest::new(session.session_id.as_str(), policy)
        .with_natural_key(format!("checkout:{}", session.session_id));
    registry.track(adapter, request).await.map(Some)
}
