//! Kubernetes Event recording
//!
//! Every create, update and delete outcome is recorded on the Service so it
//! shows up in `kubectl describe service`.
//!
//! Events are fire-and-forget: failures are logged as warnings and never
//! propagate errors.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use std::fmt;
use tracing::warn;

/// Name reported as the event source
pub const CONTROLLER_NAME: &str = "triton-loadbalancer-controller";

/// Publishes Kubernetes Events on Services
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event on the given object
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Service this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason (see [`reasons`])
    /// * `action` - What was attempted (see [`actions`])
    /// * `note` - Human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// `EventPublisher` wrapping `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventPublisher")
            .field("controller", &CONTROLLER_NAME)
            .finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Event reasons, shown in the REASON column
pub mod reasons {
    /// Instance provisioned and running
    pub const CREATED: &str = "LoadBalancerCreated";
    /// Instance metadata rewritten
    pub const UPDATED: &str = "LoadBalancerUpdated";
    /// Instance removed
    pub const DELETED: &str = "LoadBalancerDeleted";
    /// Create failed
    pub const CREATE_FAILED: &str = "CreateFailed";
    /// Update failed
    pub const UPDATE_FAILED: &str = "UpdateFailed";
    /// Delete failed
    pub const DELETE_FAILED: &str = "DeleteFailed";
    /// Instance lookup failed
    pub const SYNC_FAILED: &str = "SyncFailed";
    /// Finalizer could not be added or removed
    pub const FINALIZER_FAILED: &str = "FinalizerFailed";
    /// Ingress status could not be written
    pub const STATUS_FAILED: &str = "StatusFailed";
}

/// Event actions, shown in the ACTION column
pub mod actions {
    pub const CREATE: &str = "Create";
    pub const UPDATE: &str = "Update";
    pub const DELETE: &str = "Delete";
    pub const SYNC: &str = "Sync";
}
