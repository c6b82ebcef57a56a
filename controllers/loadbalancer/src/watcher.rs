//! Kubernetes resource watchers.
//!
//! Watches Services and drives `Reconciler::reconcile_service` through
//! `kube_runtime::Controller`, which handles reconnection, requeues and
//! per-object serialization. Workers beyond one run different Services in
//! parallel; the reconciler's name lock covers the rest.

use crate::error::ControllerError;
use crate::reconciler::service::resource_key;
use crate::reconciler::Reconciler;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::Api;
use kube_runtime::{
    controller::{Action, Config as ControllerConfig},
    watcher, Controller,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Watches Services for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    service_api: Api<Service>,
    workers: u16,
    shutdown: CancellationToken,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        service_api: Api<Service>,
        workers: u16,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            service_api,
            workers,
            shutdown,
        }
    }

    /// Starts watching Service resources.
    ///
    /// Returns once the shutdown token fires and in-flight passes have
    /// finished.
    pub async fn watch_services(&self) -> Result<(), ControllerError> {
        info!("Starting Service watcher with {} worker(s)", self.workers);

        // Permanent errors back off exponentially per Service
        let error_policy = |service: Arc<Service>, error: &ControllerError, ctx: Arc<Reconciler>| {
            let key = resource_key(&service);
            let delay = ctx.get_backoff_for_resource(&key);
            error!("Reconciliation error for Service {}: {} (retrying in {:?})", key, error, delay);
            Action::requeue(delay)
        };

        let reconcile = |service: Arc<Service>, ctx: Arc<Reconciler>| async move {
            let key = resource_key(&service);
            debug!("Reconciling Service {}", key);

            let action = ctx.reconcile_service(&service).await?;
            ctx.reset_error(&key);
            Ok::<Action, ControllerError>(action)
        };

        let controller_config = ControllerConfig::default().concurrency(self.workers);

        Controller::new(self.service_api.clone(), watcher::Config::default())
            .with_config(controller_config)
            .graceful_shutdown_on(self.shutdown.clone().cancelled_owned())
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((object, _)) => debug!("Reconciled Service {}", object),
                    Err(e) => error!("Service controller error: {}", e),
                }
            })
            .await;

        info!("Service watcher stopped");
        Ok(())
    }
}
