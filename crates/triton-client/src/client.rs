//! Triton CloudAPI client
//!
//! Load balancers are ordinary CloudAPI machines, addressed by name and
//! scoped by the ownership tags the controller writes at creation time.
//! See: https://apidocs.tritondatacenter.com/cloudapi/#machines

use crate::error::TritonError;
use crate::models::*;
use crate::portmap::to_metadata;
use crate::signer::RequestSigner;
use crate::triton_trait::LoadBalancerClientTrait;
use crate::wait::{poll_until, WaitConfig};
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Package used for new load balancer instances
pub const DEFAULT_PACKAGE: &str = "g4-highcpu-1G";

/// Image used for new load balancer instances
pub const DEFAULT_IMAGE: &str = "70e3ae72-96b6-11ea-9274-2f3c66e8b2c4";

/// CloudAPI versions this client speaks
const API_VERSION: &str = "~8||~9";

/// Triton CloudAPI client
#[derive(Debug)]
pub struct TritonClient {
    client: Client,
    base_url: String,
    account: String,
    signer: RequestSigner,
    package: String,
    image: String,
    create_wait: WaitConfig,
    delete_wait: WaitConfig,
}

impl TritonClient {
    /// Create a new CloudAPI client
    ///
    /// # Arguments
    /// * `base_url` - CloudAPI endpoint (e.g., "https://us-central-1.api.mnx.io")
    /// * `account` - Account login that owns the instances
    /// * `signer` - Request signer for the account's key
    pub fn new(base_url: String, account: String, signer: RequestSigner) -> Result<Self, TritonError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(TritonError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account,
            signer,
            package: DEFAULT_PACKAGE.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            create_wait: WaitConfig::default(),
            delete_wait: WaitConfig::default(),
        })
    }

    /// Package for new instances
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Image for new instances
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Bound for the wait after provisioning
    pub fn with_create_wait(mut self, wait: WaitConfig) -> Self {
        self.create_wait = wait;
        self
    }

    /// Bound for the wait after deletion
    pub fn with_delete_wait(mut self, wait: WaitConfig) -> Self {
        self.delete_wait = wait;
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a signed request against a path below the account
    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, TritonError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let authorization = self.signer.authorization(&date)?;
        let url = format!("{}/{}{}", self.base_url, self.account, path);

        Ok(self
            .client
            .request(method, url)
            .header("Date", date)
            .header("Authorization", authorization)
            .header("Accept-Version", API_VERSION)
            .header("Accept", "application/json"))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TritonError> {
        request.send().await.map_err(TritonError::from_transport)
    }

    /// Validate the configured credentials
    ///
    /// Makes a single, minimal machine listing. Fails with
    /// `TritonError::Authentication` when CloudAPI rejects the signature.
    pub async fn validate_credentials(&self) -> Result<(), TritonError> {
        debug!("Validating CloudAPI credentials for account {}", self.account);

        let request = self.request(Method::GET, "/machines")?.query(&[("limit", "1")]);
        let response = self.send(request).await?;
        error_for_status(response, "Failed to validate credentials").await?;

        debug!("CloudAPI credentials validated successfully");
        Ok(())
    }

    /// List managed load balancer instances with the given name
    ///
    /// The listing is filtered by name and both ownership tags, so instances
    /// that merely share a name are never returned.
    async fn list_managed(&self, name: &str) -> Result<Vec<Instance>, TritonError> {
        let request = self.request(Method::GET, "/machines")?.query(&[
            ("name", name),
            ("tag.managed-by", MANAGED_BY_VALUE),
            ("tag.loadbalancer", "true"),
        ]);
        let response = self.send(request).await?;
        let response = error_for_status(response, &format!("Failed to list instances named {}", name)).await?;

        let machines: Vec<Machine> = response.json().await.map_err(TritonError::from_transport)?;
        Ok(machines
            .into_iter()
            .map(Instance::from)
            .filter(|instance| instance.name == name && instance.is_managed())
            .collect())
    }

    /// Get a machine by ID
    async fn get_machine(&self, id: &str) -> Result<Machine, TritonError> {
        let request = self.request(Method::GET, &format!("/machines/{}", id))?;
        let response = self.send(request).await?;
        let response = error_for_status(response, &format!("Failed to get instance {}", id)).await?;
        response.json().await.map_err(TritonError::from_transport)
    }

    /// Provision a load balancer and wait until it is running
    ///
    /// This method:
    /// 1. Creates the instance with the encoded configuration as metadata
    /// 2. Tags it with the ownership tags and the Service name
    /// 3. Polls the instance until its state is `running`
    ///
    /// # Returns
    /// * `Ok(())` - The instance is running
    /// * `Err(TritonError::WaitTimeout)` - The instance did not come up in time
    /// * `Err(TritonError::Cancelled)` - The wait was aborted
    pub async fn create_load_balancer(
        &self,
        config: &LoadBalancerConfig,
        cancel: &CancellationToken,
    ) -> Result<(), TritonError> {
        if config.name.is_empty() {
            return Err(TritonError::InvalidRequest(
                "load balancer name must not be empty".to_string(),
            ));
        }

        let mut body = Map::new();
        body.insert("name".to_string(), Value::String(config.name.clone()));
        body.insert("package".to_string(), Value::String(self.package.clone()));
        body.insert("image".to_string(), Value::String(self.image.clone()));
        for (key, value) in to_metadata(config) {
            body.insert(format!("metadata.{}", key), Value::String(value));
        }
        body.insert(format!("tag.{}", TAG_K8S_SERVICE), Value::String(config.name.clone()));
        body.insert(format!("tag.{}", TAG_MANAGED_BY), Value::String(MANAGED_BY_VALUE.to_string()));
        body.insert(format!("tag.{}", TAG_LOADBALANCER), Value::String("true".to_string()));

        info!(
            "Creating load balancer {} (package {}, image {})",
            config.name, self.package, self.image
        );

        let request = self.request(Method::POST, "/machines")?.json(&body);
        let response = self.send(request).await?;
        let response = error_for_status(
            response,
            &format!("Failed to create load balancer {}", config.name),
        )
        .await?;
        let machine: Machine = response.json().await.map_err(TritonError::from_transport)?;

        let id = machine.id.as_str();
        let name = config.name.as_str();
        let report = poll_until("provision", name, self.create_wait, cancel, || async move {
            let machine = self.get_machine(id).await?;
            match machine.state.as_str() {
                STATE_RUNNING => Ok(true),
                STATE_FAILED => Err(TritonError::Api(format!(
                    "load balancer {} ({}) failed to provision",
                    name, id
                ))),
                state => {
                    debug!("Load balancer {} is {}", name, state);
                    Ok(false)
                }
            }
        })
        .await?;

        info!(
            "Load balancer {} ({}) is running after {:?}",
            name, id, report.elapsed
        );
        Ok(())
    }

    /// Rewrite the configuration of an existing load balancer
    ///
    /// Issues a single metadata update and returns without waiting. The
    /// software on the instance picks the change up on its own.
    pub async fn update_load_balancer(&self, name: &str, config: &LoadBalancerConfig) -> Result<(), TritonError> {
        let instance = self
            .list_managed(name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TritonError::NotFound(format!("load balancer {} not found", name)))?;

        debug!("Updating metadata of load balancer {} ({})", name, instance.id);

        let request = self
            .request(Method::POST, &format!("/machines/{}/metadata", instance.id))?
            .json(&to_metadata(config));
        let response = self.send(request).await?;
        error_for_status(response, &format!("Failed to update load balancer {}", name)).await?;

        Ok(())
    }

    /// Delete a load balancer and wait until it is gone
    ///
    /// Deleting a name with no managed instance succeeds without issuing a
    /// delete call.
    pub async fn delete_load_balancer(&self, name: &str, cancel: &CancellationToken) -> Result<(), TritonError> {
        let instances = self.list_managed(name).await?;
        if instances.is_empty() {
            debug!("Load balancer {} does not exist, nothing to delete", name);
            return Ok(());
        }

        for instance in &instances {
            info!("Deleting load balancer {} ({})", name, instance.id);
            let request = self.request(Method::DELETE, &format!("/machines/{}", instance.id))?;
            let response = self.send(request).await?;
            match error_for_status(response, &format!("Failed to delete load balancer {}", name)).await {
                Ok(_) | Err(TritonError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let report = poll_until("delete", name, self.delete_wait, cancel, || async move {
            Ok(self.list_managed(name).await?.is_empty())
        })
        .await?;

        info!("Load balancer {} deleted after {:?}", name, report.elapsed);
        Ok(())
    }

    /// Look up the managed load balancer with the given name
    ///
    /// # Returns
    /// * `Ok(Some(Instance))` - The instance as listed
    /// * `Ok(None)` - No managed instance has this name
    pub async fn get_load_balancer(&self, name: &str) -> Result<Option<Instance>, TritonError> {
        Ok(self.list_managed(name).await?.into_iter().next())
    }

    /// Fetch the current state of the managed instance with the given name
    ///
    /// Unlike [`TritonClient::get_load_balancer`] this reads the machine
    /// itself, so addresses assigned after provisioning are included.
    pub async fn get_instance_by_name(&self, name: &str) -> Result<Option<Instance>, TritonError> {
        let Some(listed) = self.list_managed(name).await?.into_iter().next() else {
            return Ok(None);
        };

        match self.get_machine(&listed.id).await {
            Ok(machine) => Ok(Some(Instance::from(machine))),
            Err(TritonError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Map a non-success response to the matching error variant
async fn error_for_status(response: Response, context: &str) -> Result<Response, TritonError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{}: {} - {}", context, status, body);
    Err(match status.as_u16() {
        401 | 403 => TritonError::Authentication(message),
        404 => TritonError::NotFound(message),
        429 => TritonError::RateLimited(message),
        _ => TritonError::Api(message),
    })
}

// Implement LoadBalancerClientTrait for TritonClient
#[async_trait::async_trait]
impl LoadBalancerClientTrait for TritonClient {
    async fn create_load_balancer(
        &self,
        config: &LoadBalancerConfig,
        cancel: &CancellationToken,
    ) -> Result<(), TritonError> {
        self.create_load_balancer(config, cancel).await
    }

    async fn update_load_balancer(&self, name: &str, config: &LoadBalancerConfig) -> Result<(), TritonError> {
        self.update_load_balancer(name, config).await
    }

    async fn delete_load_balancer(&self, name: &str, cancel: &CancellationToken) -> Result<(), TritonError> {
        self.delete_load_balancer(name, cancel).await
    }

    async fn get_load_balancer(&self, name: &str) -> Result<Option<Instance>, TritonError> {
        self.get_load_balancer(name).await
    }

    async fn get_instance_by_name(&self, name: &str) -> Result<Option<Instance>, TritonError> {
        self.get_instance_by_name(name).await
    }

    async fn validate_credentials(&self) -> Result<(), TritonError> {
        self.validate_credentials().await
    }
}
