//! LoadBalancerClientTrait for mocking
//!
//! This trait abstracts the CloudAPI client so the reconciler can be unit
//! tested against an in-memory implementation.

use crate::error::TritonError;
use crate::models::*;
use tokio_util::sync::CancellationToken;

/// Capability set the reconciler needs from the compute API
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait LoadBalancerClientTrait: Send + Sync {
    /// Provision an instance for `config` and wait until it is running
    async fn create_load_balancer(
        &self,
        config: &LoadBalancerConfig,
        cancel: &CancellationToken,
    ) -> Result<(), TritonError>;

    /// Rewrite the metadata of an existing instance, without waiting
    async fn update_load_balancer(&self, name: &str, config: &LoadBalancerConfig) -> Result<(), TritonError>;

    /// Delete the instance and wait until it is gone; absent names succeed
    async fn delete_load_balancer(&self, name: &str, cancel: &CancellationToken) -> Result<(), TritonError>;

    /// Managed instance with this name, `None` when absent
    async fn get_load_balancer(&self, name: &str) -> Result<Option<Instance>, TritonError>;

    /// Current state of the managed instance with this name, for address lookup
    async fn get_instance_by_name(&self, name: &str) -> Result<Option<Instance>, TritonError>;

    /// Check connectivity and credentials
    async fn validate_credentials(&self) -> Result<(), TritonError>;
}
