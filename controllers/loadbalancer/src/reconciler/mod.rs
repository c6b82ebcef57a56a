//! Reconciliation of LoadBalancer Services.
//!
//! The reconciler owns the create/update/delete decision for one Service at a
//! time. `service` holds the pass itself; this module holds the shared state:
//! the remote client, the Kubernetes-side capabilities, a keyed lock per
//! instance name and the per-Service error backoff.

pub mod service;

use crate::backoff::ExponentialBackoff;
use crate::events::EventPublisher;
use crate::kube_api::ServiceApi;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use triton_client::LoadBalancerClientTrait;

/// Requeue delay after a transient failure
pub const TRANSIENT_REQUEUE: Duration = Duration::from_secs(30);

/// Backoff state for a resource
#[derive(Debug, Clone, Default)]
struct BackoffState {
    backoff: ExponentialBackoff,
    error_count: u32,
}

impl BackoffState {
    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Timing knobs of the reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Requeue delay after a transient failure
    pub transient_requeue: Duration,
    /// Requeue delay after a successful pass
    pub resync_interval: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            transient_requeue: TRANSIENT_REQUEUE,
            resync_interval: Duration::from_secs(crate::config::DEFAULT_RESYNC_SECS),
        }
    }
}

/// Reconciles LoadBalancer Services into Triton instances.
pub struct Reconciler {
    pub(crate) triton_client: Box<dyn LoadBalancerClientTrait + Send + Sync>,
    pub(crate) service_api: Box<dyn ServiceApi>,
    pub(crate) events: Box<dyn EventPublisher>,
    /// Cancels in-flight provisioning and deletion waits on shutdown
    pub(crate) shutdown: CancellationToken,
    pub(crate) settings: ReconcilerSettings,
    /// One lock per instance name (instance name -> lock)
    name_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        triton_client: impl LoadBalancerClientTrait + 'static,
        service_api: impl ServiceApi + 'static,
        events: impl EventPublisher + 'static,
        shutdown: CancellationToken,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            triton_client: Box::new(triton_client),
            service_api: Box::new(service_api),
            events: Box::new(events),
            shutdown,
            settings,
            name_locks: Arc::new(Mutex::new(HashMap::new())),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Lock serializing passes for one instance name
    ///
    /// Instance names are not namespaced, so Services with the same name in
    /// different namespaces share a lock.
    pub(crate) fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        // A poisoned map still holds valid locks; sharing them matters more
        let mut locks = self.name_locks.lock().unwrap_or_else(|e| {
            warn!("name_locks was poisoned, recovering");
            e.into_inner()
        });
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Drop the lock entry for a name once nobody else holds it
    ///
    /// The caller must have dropped its own handle from [`Reconciler::lock_for`].
    pub(crate) fn forget_lock(&self, name: &str) {
        let mut locks = self.name_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(name).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(name);
        }
    }

    /// Number of instance names with a live lock entry
    #[cfg(test)]
    pub(crate) fn lock_count(&self) -> usize {
        self.name_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Backoff delay for a failed resource, advancing its sequence
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> Duration {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(resource_key.to_string()).or_default();
                state.increment_error();
                state.backoff.next_backoff()
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                Duration::from_secs(60)
            }
        }
    }

    /// Reset error count for a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }

    /// Consecutive permanent failures recorded for a resource
    #[cfg(test)]
    pub fn error_count(&self, resource_key: &str) -> u32 {
        self.backoff_states
            .lock()
            .ok()
            .and_then(|states| states.get(resource_key).map(|s| s.error_count))
            .unwrap_or(0)
    }
}
