//! Service reconciler
//!
//! Handles LoadBalancer Services: provisions or rewrites the backing Triton
//! instance, publishes its address in the Service status and removes the
//! instance when the Service goes away.

use super::Reconciler;
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crate::extract::extract_load_balancer_config;
use crate::kube_api::has_finalizer;
use crate::reconcile_helpers::{ingress_needs_update, is_load_balancer_service, select_load_balancer_ip};
use k8s_openapi::api::core::v1::Service;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};
use triton_client::TritonError;

/// `namespace/name` of a Service, used in logs and as the backoff key
pub fn resource_key(service: &Service) -> String {
    format!(
        "{}/{}",
        service.namespace().unwrap_or_else(|| "default".to_string()),
        service.name_any()
    )
}

impl Reconciler {
    /// Reconcile one Service
    ///
    /// # Returns
    /// * `Ok(Action)` - Pass finished, or hit a transient error and asks for
    ///   a short requeue
    /// * `Err(ControllerError)` - Permanent failure, left to the error policy
    pub async fn reconcile_service(&self, service: &Service) -> Result<Action, ControllerError> {
        let name = service.metadata.name.clone().ok_or_else(|| {
            ControllerError::InvalidService(resource_key(service), "missing metadata.name".to_string())
        })?;
        let key = resource_key(service);

        let deleting = service.metadata.deletion_timestamp.is_some();
        let wants_load_balancer = is_load_balancer_service(service);
        let owned = has_finalizer(service);

        // A Service we never provisioned for needs nothing from us
        if !owned && (deleting || !wants_load_balancer) {
            debug!("Service {} is not a managed load balancer, skipping", key);
            return Ok(Action::await_change());
        }

        let lock = self.lock_for(&name);
        let guard = lock.lock().await;

        let result = if deleting || !wants_load_balancer {
            self.reconcile_delete(service, &name, &key).await
        } else {
            self.reconcile_normal(service, &name, &key).await
        };

        drop(guard);
        drop(lock);
        self.forget_lock(&name);

        match result {
            Ok(action) => Ok(action),
            Err(e) if e.is_transient() => {
                warn!(
                    "Transient error reconciling Service {}, retrying in {:?}: {}",
                    key, self.settings.transient_requeue, e
                );
                Ok(Action::requeue(self.settings.transient_requeue))
            }
            Err(e) => Err(e),
        }
    }

    /// Create or update the instance, then publish its address
    async fn reconcile_normal(&self, service: &Service, name: &str, key: &str) -> Result<Action, ControllerError> {
        // Before any remote call so a deleted Service always gets cleaned up
        if let Err(e) = self.service_api.add_finalizer(service).await {
            return Err(self
                .report_service_failure(service, reasons::FINALIZER_FAILED, actions::SYNC, "add the finalizer", e)
                .await);
        }

        let config = extract_load_balancer_config(service);
        debug!("Service {} wants {} port mapping(s)", key, config.port_mappings.len());

        let existing = match self.triton_client.get_load_balancer(name).await {
            Ok(existing) => existing,
            Err(e) => {
                return Err(self
                    .report_failure(service, reasons::SYNC_FAILED, actions::SYNC, "look up", name, e)
                    .await)
            }
        };

        match existing {
            None => {
                info!("Creating load balancer {} for Service {}", name, key);
                if let Err(e) = self.triton_client.create_load_balancer(&config, &self.shutdown).await {
                    return Err(self
                        .report_failure(service, reasons::CREATE_FAILED, actions::CREATE, "create", name, e)
                        .await);
                }
                self.publish(
                    service,
                    EventType::Normal,
                    reasons::CREATED,
                    actions::CREATE,
                    format!(
                        "Created load balancer {} with {} port mapping(s)",
                        name,
                        config.port_mappings.len()
                    ),
                )
                .await;
            }
            Some(instance) => {
                debug!("Updating load balancer {} ({}) for Service {}", name, instance.id, key);
                if let Err(e) = self.triton_client.update_load_balancer(name, &config).await {
                    return Err(self
                        .report_failure(service, reasons::UPDATE_FAILED, actions::UPDATE, "update", name, e)
                        .await);
                }
                self.publish(
                    service,
                    EventType::Normal,
                    reasons::UPDATED,
                    actions::UPDATE,
                    format!("Updated load balancer {}", name),
                )
                .await;
            }
        }

        self.update_ingress_status(service, name, key).await?;

        Ok(Action::requeue(self.settings.resync_interval))
    }

    /// Write the selected instance address into the Service status
    ///
    /// Leaves the status untouched when the instance has no address yet or
    /// the address is already recorded.
    async fn update_ingress_status(&self, service: &Service, name: &str, key: &str) -> Result<(), ControllerError> {
        let instance = match self.triton_client.get_instance_by_name(name).await {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                warn!("Load balancer {} vanished before its address could be read", name);
                return Ok(());
            }
            Err(e) => {
                return Err(self
                    .report_failure(service, reasons::SYNC_FAILED, actions::SYNC, "read addresses of", name, e)
                    .await)
            }
        };

        let Some(ip) = select_load_balancer_ip(&instance.ips) else {
            debug!("Load balancer {} has no addresses yet", name);
            return Ok(());
        };

        if !ingress_needs_update(service, ip) {
            debug!("Service {} already has ingress {}, skipping status update", key, ip);
            return Ok(());
        }

        if let Err(e) = self.service_api.patch_load_balancer_ip(service, ip).await {
            let what = format!("set ingress {}", ip);
            return Err(self
                .report_service_failure(service, reasons::STATUS_FAILED, actions::SYNC, &what, e)
                .await);
        }
        info!("Service {} ingress set to {}", key, ip);
        Ok(())
    }

    /// Delete the instance, then release the Service
    async fn reconcile_delete(&self, service: &Service, name: &str, key: &str) -> Result<Action, ControllerError> {
        info!("Deleting load balancer {} for Service {}", name, key);

        if let Err(e) = self.triton_client.delete_load_balancer(name, &self.shutdown).await {
            return Err(self
                .report_failure(service, reasons::DELETE_FAILED, actions::DELETE, "delete", name, e)
                .await);
        }

        self.publish(
            service,
            EventType::Normal,
            reasons::DELETED,
            actions::DELETE,
            format!("Deleted load balancer {}", name),
        )
        .await;

        // Only after the instance is confirmed gone
        if let Err(e) = self.service_api.remove_finalizer(service).await {
            return Err(self
                .report_service_failure(
                    service,
                    reasons::FINALIZER_FAILED,
                    actions::DELETE,
                    "remove the finalizer",
                    e,
                )
                .await);
        }
        info!("Load balancer {} for Service {} deleted", name, key);

        Ok(Action::await_change())
    }

    /// Record a failed remote call on the Service and convert the error
    async fn report_failure(
        &self,
        service: &Service,
        reason: &str,
        action: &str,
        operation: &str,
        name: &str,
        error: TritonError,
    ) -> ControllerError {
        let note = format!("Failed to {} load balancer {}: {}", operation, name, error);
        warn!("Service {}: {}", resource_key(service), note);
        self.publish(service, EventType::Warning, reason, action, note).await;
        ControllerError::Triton(error)
    }

    /// Record a failed write to the Service itself
    async fn report_service_failure(
        &self,
        service: &Service,
        reason: &str,
        action: &str,
        what: &str,
        error: ControllerError,
    ) -> ControllerError {
        let note = format!("Failed to {} on Service {}: {}", what, resource_key(service), error);
        warn!("{}", note);
        self.publish(service, EventType::Warning, reason, action, note).await;
        error
    }

    async fn publish(&self, service: &Service, type_: EventType, reason: &str, action: &str, note: String) {
        self.events
            .publish(&service.object_ref(&()), type_, reason, action, Some(note))
            .await;
    }
}
