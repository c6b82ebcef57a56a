//! Mock Triton client for unit testing
//!
//! This module provides an in-memory implementation of
//! `LoadBalancerClientTrait` so reconcile logic can be tested without a
//! CloudAPI endpoint.

use crate::error::TritonError;
use crate::models::*;
use crate::portmap::to_metadata;
use crate::triton_trait::LoadBalancerClientTrait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    /// `create_load_balancer`
    Create,
    /// `update_load_balancer`
    Update,
    /// `delete_load_balancer`
    Delete,
    /// `get_load_balancer`
    Get,
    /// `get_instance_by_name`
    GetByName,
}

/// Number of calls per operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Calls to `create_load_balancer`
    pub create: usize,
    /// Calls to `update_load_balancer`
    pub update: usize,
    /// Calls to `delete_load_balancer`, including ones for absent names
    pub delete: usize,
    /// Deletes that actually removed an instance
    pub remote_delete: usize,
    /// Calls to `get_load_balancer`
    pub get: usize,
    /// Calls to `get_instance_by_name`
    pub get_by_name: usize,
}

type FailureFn = Arc<dyn Fn() -> TritonError + Send + Sync>;

/// Mock Triton client for testing
///
/// Instances are stored by name. Created instances get the configured
/// address list (public first, then private, unless overridden).
#[derive(Clone)]
pub struct MockTritonClient {
    instances: Arc<Mutex<HashMap<String, Instance>>>,
    calls: Arc<Mutex<CallCounts>>,
    failures: Arc<Mutex<HashMap<MockOperation, FailureFn>>>,
    create_ips: Arc<Mutex<Vec<String>>>,
    next_id: Arc<Mutex<u64>>,
}

impl fmt::Debug for MockTritonClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .instances
            .lock()
            .map(|instances| instances.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("MockTritonClient")
            .field("instances", &names)
            .field("calls", &self.calls.lock().map(|c| c.clone()).unwrap_or_default())
            .finish_non_exhaustive()
    }
}

impl Default for MockTritonClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTritonClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self {
            instances: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(CallCounts::default())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            create_ips: Arc::new(Mutex::new(vec![
                "203.0.113.1".to_string(),
                "10.0.0.1".to_string(),
            ])),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Addresses assigned to instances created from now on
    pub fn set_create_ips(&self, ips: Vec<String>) {
        *self.create_ips.lock().unwrap() = ips;
    }

    /// Add an instance to the mock store (for test setup)
    pub fn insert_instance(&self, instance: Instance) {
        self.instances
            .lock()
            .unwrap()
            .insert(instance.name.clone(), instance);
    }

    /// Current copy of a stored instance
    pub fn instance(&self, name: &str) -> Option<Instance> {
        self.instances.lock().unwrap().get(name).cloned()
    }

    /// Make every call of `operation` fail with the error built by `error`
    pub fn fail_on<F>(&self, operation: MockOperation, error: F)
    where
        F: Fn() -> TritonError + Send + Sync + 'static,
    {
        self.failures.lock().unwrap().insert(operation, Arc::new(error));
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Call counts so far
    pub fn calls(&self) -> CallCounts {
        self.calls.lock().unwrap().clone()
    }

    fn injected(&self, operation: MockOperation) -> Result<(), TritonError> {
        match self.failures.lock().unwrap().get(&operation) {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }
}

#[async_trait::async_trait]
impl LoadBalancerClientTrait for MockTritonClient {
    async fn create_load_balancer(
        &self,
        config: &LoadBalancerConfig,
        cancel: &CancellationToken,
    ) -> Result<(), TritonError> {
        self.calls.lock().unwrap().create += 1;
        self.injected(MockOperation::Create)?;

        if cancel.is_cancelled() {
            return Err(TritonError::Cancelled {
                operation: "provision",
                name: config.name.clone(),
                elapsed: std::time::Duration::ZERO,
            });
        }

        if self.instances.lock().unwrap().contains_key(&config.name) {
            return Err(TritonError::Api(format!(
                "instance {} already exists",
                config.name
            )));
        }

        let mut tags = HashMap::new();
        tags.insert(TAG_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
        tags.insert(TAG_LOADBALANCER.to_string(), "true".to_string());
        tags.insert(TAG_K8S_SERVICE.to_string(), config.name.clone());

        let instance = Instance {
            id: format!("mock-{}", self.next_id()),
            name: config.name.clone(),
            state: STATE_RUNNING.to_string(),
            ips: self.create_ips.lock().unwrap().clone(),
            metadata: to_metadata(config),
            tags,
        };
        self.insert_instance(instance);
        Ok(())
    }

    async fn update_load_balancer(&self, name: &str, config: &LoadBalancerConfig) -> Result<(), TritonError> {
        self.calls.lock().unwrap().update += 1;
        self.injected(MockOperation::Update)?;

        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .get_mut(name)
            .ok_or_else(|| TritonError::NotFound(format!("load balancer {} not found", name)))?;
        instance.metadata = to_metadata(config);
        Ok(())
    }

    async fn delete_load_balancer(&self, name: &str, _cancel: &CancellationToken) -> Result<(), TritonError> {
        self.calls.lock().unwrap().delete += 1;
        self.injected(MockOperation::Delete)?;

        if self.instances.lock().unwrap().remove(name).is_some() {
            self.calls.lock().unwrap().remote_delete += 1;
        }
        Ok(())
    }

    async fn get_load_balancer(&self, name: &str) -> Result<Option<Instance>, TritonError> {
        self.calls.lock().unwrap().get += 1;
        self.injected(MockOperation::Get)?;
        Ok(self.instance(name).filter(Instance::is_managed))
    }

    async fn get_instance_by_name(&self, name: &str) -> Result<Option<Instance>, TritonError> {
        self.calls.lock().unwrap().get_by_name += 1;
        self.injected(MockOperation::GetByName)?;
        Ok(self.instance(name).filter(Instance::is_managed))
    }

    async fn validate_credentials(&self) -> Result<(), TritonError> {
        Ok(())
    }
}
