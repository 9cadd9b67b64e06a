//! REST client for the account service: Google sign-in and Stripe
//! subscription management.

use crate::error::ClientError;
use crate::messages::{CheckoutSession, GoogleLoginResponse, GoogleStatusResponse, Plan, SubscriptionStatus};
use crate::http::parse_response;

/// HTTP client for the account service.
#[derive(Clone)]
pub struct AccountApi {
    client: reqwest::Client,
    base_url: String,
}

impl AccountApi {
    /// * `base_url` - Base HTTP URL, e.g. `http://127.0.0.1:8001`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Begin a Google sign-in. The returned `state` identifies the attempt.
    pub async fn google_login(&self) -> Result<GoogleLoginResponse, ClientError> {
        let response = self
            .client
            .get(format!("{}/auth/google/login", self.base_url))
            .send()
            .await?;

        parse_response(response).await
    }

    /// Poll a sign-in attempt. An unknown or expired `state` is a 404
    /// [`ClientError::Api`].
    pub async fn google_status(&self, state: &str) -> Result<GoogleStatusResponse, ClientError> {
        let response = self
            .client
            .get(format!("{}/auth/google/status/{}", self.base_url, state))
            .send()
            .await?;

        parse_response(response).await
    }

    /// Subscription document for the user owning `token`.
    pub async fn subscription_status(&self, token: &str) -> Result<SubscriptionStatus, ClientError> {
        let response = self
            .client
            .get(format!("{}/api/subscription/status", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;

        parse_response(response).await
    }

    /// Create a Stripe checkout session for `plan`.
    pub async fn create_checkout(&self, token: &str, plan: Plan) -> Result<CheckoutSession, ClientError> {
        let response = self
            .client
            .post(format!("{}/api/subscription/create-checkout", self.base_url))
            .bearer_auth(token)
            .json(&serde_json::json!({ "plan": plan }))
            .send()
            .await?;

        parse_response(response).await
    }
}
