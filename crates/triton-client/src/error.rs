//! Triton client errors

use std::time::Duration;
use thiserror::Error;

/// Substrings that mark an otherwise unclassified error as transient.
const TRANSIENT_MARKERS: [&str; 3] = ["timeout", "connection refused", "rate limit"];

/// Errors that can occur when interacting with the Triton CloudAPI
#[derive(Debug, Error)]
pub enum TritonError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request did not complete in time
    #[error("request timeout: {0}")]
    Timeout(String),

    /// CloudAPI could not be reached
    #[error("connection refused: {0}")]
    Connection(String),

    /// CloudAPI throttled the request (HTTP 429)
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// CloudAPI returned an error
    #[error("CloudAPI error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (unknown key, bad signature, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Private key could not be loaded
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// A provisioning or deletion wait exceeded its bound
    #[error("timed out waiting for load balancer {name} to {operation} after {}s", elapsed.as_secs())]
    WaitTimeout {
        /// What was being waited for ("provision", "delete")
        operation: &'static str,
        /// Instance name
        name: String,
        /// Time spent waiting
        elapsed: Duration,
    },

    /// The wait was aborted by cancellation before it converged
    #[error("cancelled while waiting for load balancer {name} to {operation} after {}s", elapsed.as_secs())]
    Cancelled {
        /// What was being waited for ("provision", "delete")
        operation: &'static str,
        /// Instance name
        name: String,
        /// Time spent waiting
        elapsed: Duration,
    },
}

impl TritonError {
    /// Whether retrying the same call shortly is likely to succeed.
    ///
    /// Wait timeouts are never transient: the instance is stuck and needs the
    /// slower permanent-error backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            TritonError::Timeout(_)
            | TritonError::Connection(_)
            | TritonError::RateLimited(_)
            | TritonError::Cancelled { .. } => true,
            TritonError::WaitTimeout { .. } => false,
            TritonError::Http(e) if e.is_timeout() || e.is_connect() => true,
            other => is_transient_message(&other.to_string()),
        }
    }

    /// Classify a `reqwest` failure into the transport variants.
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TritonError::Timeout(e.to_string())
        } else if e.is_connect() {
            TritonError::Connection(e.to_string())
        } else {
            TritonError::Http(e)
        }
    }
}

/// Substring classification of an error message.
///
/// Returns true when the message mentions a timeout, a refused connection or
/// rate limiting.
pub fn is_transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_messages() {
        assert!(is_transient_message("connection timeout"));
        assert!(is_transient_message("dial tcp: connection refused"));
        assert!(is_transient_message("Rate Limit exceeded"));
        assert!(!is_transient_message("invalid credentials"));
        assert!(!is_transient_message(""));
    }

    #[test]
    fn test_structural_classification() {
        assert!(TritonError::RateLimited("slow down".to_string()).is_transient());
        assert!(TritonError::Connection("no route".to_string()).is_transient());
        assert!(!TritonError::Authentication("invalid credentials".to_string()).is_transient());
        assert!(TritonError::Api("upstream timeout".to_string()).is_transient());
        assert!(!TritonError::Api("malformed request".to_string()).is_transient());
    }

    #[test]
    fn test_wait_timeout_is_permanent() {
        let err = TritonError::WaitTimeout {
            operation: "provision",
            name: "web".to_string(),
            elapsed: Duration::from_secs(300),
        };
        assert!(!err.is_transient());
        let message = err.to_string();
        assert!(message.contains("web"));
        assert!(message.contains("300s"));
    }

    #[test]
    fn test_cancelled_is_distinguishable() {
        let err = TritonError::Cancelled {
            operation: "delete",
            name: "web".to_string(),
            elapsed: Duration::from_secs(20),
        };
        assert!(err.is_transient());
        assert!(err.to_string().starts_with("cancelled"));
    }
}
