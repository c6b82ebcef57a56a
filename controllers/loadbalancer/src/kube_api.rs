//! Kubernetes-side writes made by the reconciler
//!
//! Finalizer and status updates are merge patches on the Service. They sit
//! behind `ServiceApi` so reconcile logic can be tested without a cluster.

use crate::error::ControllerError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::fmt;
use tracing::debug;

/// Finalizer guarding instance cleanup
pub const FINALIZER_NAME: &str = "loadbalancer.triton.io/finalizer";

/// Whether the Service carries our finalizer
pub fn has_finalizer(service: &Service) -> bool {
    service.finalizers().iter().any(|f| f == FINALIZER_NAME)
}

/// Service writes needed by the reconciler
#[async_trait]
pub trait ServiceApi: Send + Sync {
    /// Add the finalizer if it is missing
    async fn add_finalizer(&self, service: &Service) -> Result<(), ControllerError>;

    /// Remove the finalizer if it is present
    async fn remove_finalizer(&self, service: &Service) -> Result<(), ControllerError>;

    /// Set `status.loadBalancer.ingress` to the single address `ip`
    async fn patch_load_balancer_ip(&self, service: &Service, ip: &str) -> Result<(), ControllerError>;
}

/// `ServiceApi` backed by the Kubernetes API server
pub struct KubeServiceApi {
    client: Client,
}

impl fmt::Debug for KubeServiceApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeServiceApi").finish_non_exhaustive()
    }
}

impl KubeServiceApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, service: &Service) -> Result<(Api<Service>, String), ControllerError> {
        let name = service.metadata.name.clone().ok_or_else(|| {
            ControllerError::InvalidService("<unnamed>".to_string(), "missing metadata.name".to_string())
        })?;
        let namespace = service.namespace().unwrap_or_else(|| "default".to_string());
        Ok((Api::namespaced(self.client.clone(), &namespace), name))
    }

    async fn patch_finalizers(&self, service: &Service, finalizers: Vec<String>) -> Result<(), ControllerError> {
        let (api, name) = self.api(service)?;
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ServiceApi for KubeServiceApi {
    async fn add_finalizer(&self, service: &Service) -> Result<(), ControllerError> {
        if has_finalizer(service) {
            return Ok(());
        }

        let mut finalizers = service.finalizers().to_vec();
        finalizers.push(FINALIZER_NAME.to_string());
        self.patch_finalizers(service, finalizers).await?;

        debug!("Added finalizer to Service {}", service.name_any());
        Ok(())
    }

    async fn remove_finalizer(&self, service: &Service) -> Result<(), ControllerError> {
        if !has_finalizer(service) {
            return Ok(());
        }

        let mut finalizers = service.finalizers().to_vec();
        finalizers.retain(|f| f != FINALIZER_NAME);
        self.patch_finalizers(service, finalizers).await?;

        debug!("Removed finalizer from Service {}", service.name_any());
        Ok(())
    }

    async fn patch_load_balancer_ip(&self, service: &Service, ip: &str) -> Result<(), ControllerError> {
        let (api, name) = self.api(service)?;
        let patch = json!({
            "status": {
                "loadBalancer": {
                    "ingress": [{ "ip": ip }]
                }
            }
        });
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
