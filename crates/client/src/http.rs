//! Response helpers shared by the service clients.

use crate::error::ClientError;

/// Ensure the response has a success status code. Returns the
/// response unchanged on success, or a [`ClientError::Api`]
/// containing the status and body text on failure.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ClientError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub(crate) async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}
