//! Errors from the REST client layer.

/// Errors from the REST client layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A base URL or query could not be turned into a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// `true` when the request never got an HTTP response (connection
    /// refused, DNS failure, timeout).
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Api { .. } | Self::InvalidUrl(_) => false,
        }
    }

    /// HTTP status for [`ClientError::Api`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::InvalidUrl(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = ClientError::Api {
            status: 404,
            body: "{\"detail\":\"OAuth state not found or expired\"}".into(),
        };
        assert!(err.to_string().starts_with("API error (404)"));
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_transport());
    }

    #[test]
    fn request_error_display() {
        // Build a reqwest error from an invalid URL.
        let req_err = reqwest::Client::new().get("://bad").build().unwrap_err();
        let err = ClientError::Request(req_err);
        assert!(err.to_string().contains("HTTP request failed"));
    }
}
