//! Test utilities for unit testing the reconciler
//!
//! Service builders plus in-memory fakes for the Kubernetes-side writes, so
//! a full reconcile pass runs against `MockTritonClient` without a cluster.

use crate::error::ControllerError;
use crate::events::EventPublisher;
use crate::kube_api::{has_finalizer, ServiceApi, FINALIZER_NAME};
use crate::reconciler::service::resource_key;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, ObjectReference, Service, ServicePort, ServiceStatus,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::runtime::events::EventType;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use triton_client::{LoadBalancerClientTrait, MockTritonClient};

/// Helper to create a Service port
pub fn service_port(name: Option<&str>, port: i32, target_port: Option<IntOrString>) -> ServicePort {
    ServicePort {
        name: name.map(str::to_string),
        port,
        target_port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// Helper to create a test Service of type LoadBalancer
pub fn test_service(
    name: &str,
    namespace: &str,
    ports: Vec<ServicePort>,
    annotations: &[(&str, &str)],
) -> Service {
    let annotations: BTreeMap<String, String> = annotations
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("{}-{}-uid", namespace, name),
            "annotations": annotations,
        },
        "spec": {
            "type": "LoadBalancer",
            "ports": ports,
        }
    }))
    .expect("valid Service")
}

/// Record `ip` as the current ingress address
pub fn with_ingress_ip(mut service: Service, ip: &str) -> Service {
    service.status = Some(ServiceStatus {
        load_balancer: Some(LoadBalancerStatus {
            ingress: Some(vec![LoadBalancerIngress {
                ip: Some(ip.to_string()),
                ..Default::default()
            }]),
        }),
        ..Default::default()
    });
    service
}

/// Change the Service type
pub fn with_type(mut service: Service, type_: &str) -> Service {
    service.spec.get_or_insert_with(Default::default).type_ = Some(type_.to_string());
    service
}

/// Add the controller finalizer
pub fn with_finalizer(mut service: Service) -> Service {
    service
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(FINALIZER_NAME.to_string());
    service
}

/// Set a deletion timestamp
pub fn marked_for_deletion(mut service: Service) -> Service {
    service.metadata.deletion_timestamp =
        Some(serde_json::from_value(json!("2026-10-17T12:00:00Z")).expect("valid timestamp"));
    service
}

/// Writes observed by `RecordingServiceApi`, keyed by `namespace/name`
#[derive(Debug, Default, Clone)]
pub struct ServiceWrites {
    pub finalizers_added: Vec<String>,
    pub finalizers_removed: Vec<String>,
    pub status_ips: Vec<(String, String)>,
}

/// Service writes that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceWrite {
    AddFinalizer,
    RemoveFinalizer,
    PatchStatus,
}

/// In-memory `ServiceApi` that records every write
#[derive(Clone, Default)]
pub struct RecordingServiceApi {
    writes: Arc<Mutex<ServiceWrites>>,
    failures: Arc<Mutex<HashSet<ServiceWrite>>>,
}

impl RecordingServiceApi {
    pub fn writes(&self) -> ServiceWrites {
        self.writes.lock().unwrap().clone()
    }

    /// Make every `write` fail with a conflict from the API server
    pub fn fail_on(&self, write: ServiceWrite) {
        self.failures.lock().unwrap().insert(write);
    }

    fn injected(&self, write: ServiceWrite, service: &Service) -> Result<(), ControllerError> {
        if self.failures.lock().unwrap().contains(&write) {
            return Err(ControllerError::InvalidService(
                resource_key(service),
                "the object has been modified".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceApi for RecordingServiceApi {
    async fn add_finalizer(&self, service: &Service) -> Result<(), ControllerError> {
        self.injected(ServiceWrite::AddFinalizer, service)?;
        if !has_finalizer(service) {
            self.writes.lock().unwrap().finalizers_added.push(resource_key(service));
        }
        Ok(())
    }

    async fn remove_finalizer(&self, service: &Service) -> Result<(), ControllerError> {
        self.injected(ServiceWrite::RemoveFinalizer, service)?;
        if has_finalizer(service) {
            self.writes.lock().unwrap().finalizers_removed.push(resource_key(service));
        }
        Ok(())
    }

    async fn patch_load_balancer_ip(&self, service: &Service, ip: &str) -> Result<(), ControllerError> {
        self.injected(ServiceWrite::PatchStatus, service)?;
        self.writes
            .lock()
            .unwrap()
            .status_ips
            .push((resource_key(service), ip.to_string()));
        Ok(())
    }
}

/// An event captured by `RecordingEventPublisher`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub warning: bool,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

/// In-memory `EventPublisher`
#[derive(Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Reasons in publish order
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let warning = match type_ {
            EventType::Warning => true,
            EventType::Normal => false,
        };
        self.events.lock().unwrap().push(RecordedEvent {
            warning,
            reason: reason.to_string(),
            action: action.to_string(),
            note,
        });
    }
}

/// Reconciler wired to the given mock and fresh recording fakes
pub fn test_reconciler(mock: MockTritonClient) -> (Reconciler, RecordingServiceApi, RecordingEventPublisher) {
    test_reconciler_with(mock)
}

/// Like [`test_reconciler`], for any client implementation
pub fn test_reconciler_with(
    client: impl LoadBalancerClientTrait + 'static,
) -> (Reconciler, RecordingServiceApi, RecordingEventPublisher) {
    let service_api = RecordingServiceApi::default();
    let events = RecordingEventPublisher::default();
    let reconciler = Reconciler::new(
        client,
        service_api.clone(),
        events.clone(),
        CancellationToken::new(),
        ReconcilerSettings::default(),
    );
    (reconciler, service_api, events)
}
