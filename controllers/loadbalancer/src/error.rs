//! Controller-specific error types.
//!
//! This module defines error types specific to the load balancer controller
//! that are not covered by upstream library errors.

use kube::Error as KubeError;
use thiserror::Error;
use triton_client::{is_transient_message, TritonError};

/// Errors that can occur in the load balancer controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Triton CloudAPI error
    #[error("Triton error: {0}")]
    Triton(#[from] TritonError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Service is missing required metadata
    #[error("Invalid Service {0}: {1}")]
    InvalidService(String, String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether the pass should be retried after the short fixed delay
    pub fn is_transient(&self) -> bool {
        match self {
            ControllerError::Triton(e) => e.is_transient(),
            other => is_transient_message(&other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_triton_classification_is_preserved() {
        let err = ControllerError::from(TritonError::Api("rate limit exceeded".to_string()));
        assert!(err.is_transient());

        let err = ControllerError::from(TritonError::Authentication("invalid credentials".to_string()));
        assert!(!err.is_transient());

        let err = ControllerError::from(TritonError::WaitTimeout {
            operation: "delete",
            name: "web".to_string(),
            elapsed: Duration::from_secs(300),
        });
        assert!(!err.is_transient());
    }

    #[test]
    fn test_other_errors_use_message() {
        assert!(ControllerError::Watch("watch stream timeout".to_string()).is_transient());
        assert!(!ControllerError::InvalidConfig("TRITON_URL is required".to_string()).is_transient());
    }
}
