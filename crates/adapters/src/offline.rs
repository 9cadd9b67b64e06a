//! Recognises backend messages that mean ComfyUI itself is unreachable.
//!
//! The workflow server forwards the underlying connection error text when
//! it cannot reach ComfyUI; these substrings identify it.

const CONNECTION_FAILURE_PATTERNS: &[&str] = &[
    "connection refused",
    "failed to establish a new connection",
    "max retries exceeded",
    "target machine actively refused",
    "actively refused",
    "httpconnectionpool",
    "newconnectionerror",
    "connectionerror",
    "connection aborted",
    "name or service not known",
    "nodename nor servname provided",
];

/// Whether `message` describes a failure to connect to ComfyUI.
pub fn is_connection_failure(message: &str) -> bool {
    let message = message.to_lowercase();
    CONNECTION_FAILURE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

/// User-facing text for an unreachable ComfyUI.
pub const OFFLINE_MESSAGE: &str =
    "ComfyUI is not running. Start ComfyUI and try again.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_connection_failures() {
        assert!(is_connection_failure(
            "HTTPConnectionPool(host='127.0.0.1', port=8188): Max retries exceeded with url: /prompt"
        ));
        assert!(is_connection_failure("[Errno 111] Connection refused"));
        assert!(is_connection_failure(
            "No connection could be made because the target machine actively refused it"
        ));
        assert!(is_connection_failure("[Errno -2] Name or service not known"));
    }

    #[test]
    fn ignores_other_failures() {
        assert!(!is_connection_failure("Prompt outputs failed validation"));
        assert!(!is_connection_failure(""));
    }
}
