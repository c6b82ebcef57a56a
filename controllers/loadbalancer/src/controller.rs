//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the CloudAPI
//! client, the Kubernetes client and the reconciler together and runs the
//! Service watcher.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::KubeEventPublisher;
use crate::kube_api::KubeServiceApi;
use crate::reconciler::{Reconciler, ReconcilerSettings, TRANSIENT_REQUEUE};
use crate::watcher::Watcher;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use triton_client::{RequestSigner, TritonClient, WaitConfig};

/// Main controller for LoadBalancer Services.
pub struct Controller {
    service_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    ///
    /// Fails before watching anything when the signing key cannot be loaded
    /// or CloudAPI rejects the credentials.
    pub async fn new(config: ControllerConfig, shutdown: CancellationToken) -> Result<Self, ControllerError> {
        info!("Initializing Triton LoadBalancer Controller");

        // Create Kubernetes client
        let kube_client = Client::try_default().await?;

        // Create CloudAPI client
        let signer = RequestSigner::from_pem_file(
            &config.triton_account,
            &config.triton_key_id,
            &config.triton_key_path,
        )?;
        let triton_client = TritonClient::new(
            config.triton_url.clone(),
            config.triton_account.clone(),
            signer,
        )?
        .with_package(config.package.clone())
        .with_image(config.image.clone())
        .with_create_wait(WaitConfig::with_timeout(config.create_timeout))
        .with_delete_wait(WaitConfig::with_timeout(config.delete_timeout));

        // Validate credentials and connectivity before proceeding
        info!("Validating CloudAPI credentials and connectivity...");
        triton_client.validate_credentials().await.map_err(|e| {
            error!("Failed to validate CloudAPI credentials: {}", e);
            error!("Please ensure:");
            error!("  1. TRITON_ACCOUNT and TRITON_KEY_ID match a key registered on the account");
            error!("  2. TRITON_KEY_PATH points at the matching private key");
            error!("  3. CloudAPI is reachable at {}", config.triton_url);
            ControllerError::Triton(e)
        })?;
        info!("CloudAPI credentials validated");

        let service_api: Api<Service> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client.clone(), ns),
            None => Api::all(kube_client.clone()),
        };

        let reconciler = Arc::new(Reconciler::new(
            triton_client,
            KubeServiceApi::new(kube_client.clone()),
            KubeEventPublisher::new(kube_client),
            shutdown.clone(),
            ReconcilerSettings {
                transient_requeue: TRANSIENT_REQUEUE,
                resync_interval: config.resync_interval,
            },
        ));

        let watcher = Watcher::new(reconciler, service_api, config.workers, shutdown);
        let service_watcher = tokio::spawn(async move { watcher.watch_services().await });

        Ok(Self { service_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Triton LoadBalancer Controller running");

        self.service_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("Service watcher panicked: {}", e)))?
            .map_err(|e| ControllerError::Watch(format!("Service watcher error: {}", e)))?;

        info!("Triton LoadBalancer Controller stopped");
        Ok(())
    }
}
