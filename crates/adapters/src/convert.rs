//! Client-layer failures expressed as adapter failures.

use brousla_client::ClientError;
use brousla_tracker::AdapterError;

pub(crate) fn client_error(error: ClientError) -> AdapterError {
    if error.is_transport() {
        return AdapterError::Network(error.to_string());
    }
    match error {
        ClientError::Request(e) => AdapterError::InvalidResponse(e.to_string()),
        ClientError::Api { status: 404, body } => AdapterError::NotFound(body),
        ClientError::Api { status, body } => AdapterError::Http { status, body },
        ClientError::InvalidUrl(msg) => AdapterError::InvalidResponse(msg),
    }
}
