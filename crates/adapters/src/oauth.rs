//! Google sign-in completion.
//!
//! The account service hands out an authorization URL and a `state`
//! token; the user finishes sign-in in the browser while the `state` is
//! polled. The issued token is cached between `check` and `fetch_result`.

use std::collections::HashMap;

use async_trait::async_trait;
use brousla_client::messages::OAuthStatus;
use brousla_client::AccountApi;
use brousla_core::operation::{Domain, ErrorInfo, OperationId};
use brousla_core::policy::PolicyKind;
use brousla_tracker::{AdapterError, Launched, Launcher, OperationAdapter, StatusReport};
use parking_lot::Mutex;

use crate::convert::client_error;

pub struct OAuthAdapter {
    api: AccountApi,
    tokens: Mutex<HashMap<OperationId, String>>,
}

impl OAuthAdapter {
    pub fn new(api: AccountApi) -> Self {
        Self {
            api,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Sign-ins whose token was issued but not yet collected.
    pub fn pending_tokens(&self) -> usize {
        self.tokens.lock().len()
    }
}

#[async_trait]
impl OperationAdapter for OAuthAdapter {
    fn domain(&self) -> Domain {
        Domain::OAuth
    }

    async fn check(&self, id: &OperationId) -> Result<StatusReport, AdapterError> {
        let response = self
            .api
            .google_status(id.as_str())
            .await
            .map_err(client_error)?;

        match response.status {
            OAuthStatus::Pending => Ok(StatusReport::pending()),
            OAuthStatus::Success => {
                let token = response.token.ok_or_else(|| {
                    AdapterError::InvalidResponse("Sign-in succeeded without a token".to_string())
                })?;
                self.tokens.lock().insert(id.clone(), token);
                Ok(StatusReport::completed())
            }
            OAuthStatus::Error => Ok(StatusReport::error(
                response
                    .message
                    .unwrap_or_else(|| "Google sign-in failed".to_string()),
            )),
        }
    }

    async fn fetch_result(&self, id: &OperationId) -> Result<serde_json::Value, AdapterError> {
        let token = self
            .tokens
            .lock()
            .remove(id)
            .ok_or_else(|| AdapterError::InvalidResponse("No token for sign-in".to_string()))?;
        Ok(serde_json::json!({ "token": token }))
    }

    fn classify_failure(&self, error: &AdapterError) -> ErrorInfo {
        match error {
            AdapterError::NotFound(_) => {
                ErrorInfo::domain("Sign-in session expired. Please try again.")
            }
            other => other.classify(),
        }
    }

    fn release(&self, id: &OperationId) {
        self.tokens.lock().remove(id);
    }
}

#[async_trait]
impl Launcher for OAuthAdapter {
    type Params = ();

    /// One sign-in at a time.
    fn natural_key(&self, _params: &()) -> String {
        "oauth:google".to_string()
    }

    async fn launch(&self, _params: &()) -> Result<Launched, AdapterError> {
        let response = self.api.google_login().await.map_err(client_error)?;
        tracing::info!(state = %response.state, "Google sign-in started");
        Ok(Launched::new(response.state, PolicyKind::OAuthSignIn)
            .with_detail(serde_json::json!({ "auth_url": response.auth_url })))
    }
}
