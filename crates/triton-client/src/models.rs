//! Triton models
//!
//! Domain types for load balancer configuration plus the CloudAPI machine
//! representation they are stored on.
//! See: https://apidocs.tritondatacenter.com/cloudapi/#machines

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Metadata key marking an instance as a load balancer
pub const METADATA_LOADBALANCER: &str = "cloud.tritoncompute:loadbalancer";
/// Metadata key holding the encoded port map
pub const METADATA_PORTMAP: &str = "cloud.tritoncompute:portmap";
/// Metadata key holding the maximum backend count
pub const METADATA_MAX_RS: &str = "cloud.tritoncompute:max_rs";
/// Metadata key holding the TLS certificate subject
pub const METADATA_CERTIFICATE_NAME: &str = "cloud.tritoncompute:certificate_name";
/// Metadata key holding the metrics ACL
pub const METADATA_METRICS_ACL: &str = "cloud.tritoncompute:metrics_acl";

/// Ownership tag naming the managing controller
pub const TAG_MANAGED_BY: &str = "managed-by";
/// Value of the `managed-by` ownership tag
pub const MANAGED_BY_VALUE: &str = "triton-loadbalancer-controller";
/// Ownership tag marking the instance as a load balancer
pub const TAG_LOADBALANCER: &str = "loadbalancer";
/// Tag mirroring the Kubernetes Service name
pub const TAG_K8S_SERVICE: &str = "k8s-service";

/// Instance state reported once provisioning has finished
pub const STATE_RUNNING: &str = "running";
/// Instance state reported when provisioning has given up
pub const STATE_FAILED: &str = "failed";

/// Protocol a listener speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    /// Plain HTTP
    Http,
    /// HTTP with TLS termination
    Https,
    /// Raw TCP passthrough
    Tcp,
}

impl PortType {
    /// The scheme used in the port map encoding
    pub fn as_str(&self) -> &'static str {
        match self {
            PortType::Http => "http",
            PortType::Https => "https",
            PortType::Tcp => "tcp",
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(PortType::Http),
            "https" => Ok(PortType::Https),
            "tcp" => Ok(PortType::Tcp),
            other => Err(format!("unknown port type: {}", other)),
        }
    }
}

/// One listener of the load balancer and the backend it forwards to
///
/// Listen ports are not required to be unique within a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Protocol of the listener
    pub port_type: PortType,
    /// Port the load balancer listens on
    pub listen_port: u16,
    /// Backend group traffic is forwarded to
    pub backend_name: String,
    /// 0 means "same as the listen port"
    pub backend_port: u16,
}

/// Normalized load balancer configuration
///
/// Derived fresh from the Service on every reconcile; the instance metadata
/// is the only persisted copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    /// Instance name (matches the Service name)
    pub name: String,
    /// Listeners in Service port order
    pub port_mappings: Vec<PortMapping>,
    /// 0 means "use the instance default"
    pub max_backends: u32,
    /// Empty means no TLS certificate
    pub certificate_name: String,
    /// IPs and CIDRs allowed to scrape metrics
    pub metrics_acl: Vec<String>,
}

/// A load balancer instance as seen through CloudAPI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instance {
    /// Machine UUID
    pub id: String,
    /// Machine name
    pub name: String,
    /// Provisioning state ("provisioning", "running", "failed", ...)
    pub state: String,
    /// Addresses in the order CloudAPI reports them
    pub ips: Vec<String>,
    /// Customer metadata, values as strings
    pub metadata: HashMap<String, String>,
    /// Tags, values as strings
    pub tags: HashMap<String, String>,
}

impl Instance {
    /// Whether the instance carries both ownership tags
    pub fn is_managed(&self) -> bool {
        self.tags.get(TAG_MANAGED_BY).map(String::as_str) == Some(MANAGED_BY_VALUE)
            && self.tags.get(TAG_LOADBALANCER).map(String::as_str) == Some("true")
    }

    /// Decode the load balancer configuration stored in the instance metadata
    pub fn load_balancer_config(&self) -> LoadBalancerConfig {
        crate::portmap::from_metadata(&self.name, &self.metadata)
    }
}

/// Machine model matching the CloudAPI `GET /:login/machines/:id` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    /// Machine UUID
    pub id: String,
    /// Machine name
    pub name: String,
    /// Provisioning state
    pub state: String,
    /// All addresses, in CloudAPI order
    #[serde(default)]
    pub ips: Vec<String>,
    /// Address CloudAPI considers primary
    #[serde(default)]
    pub primary_ip: Option<String>,
    /// Customer metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Tags
    #[serde(default)]
    pub tags: HashMap<String, serde_json::Value>,
}

/// CloudAPI returns tag and metadata values as JSON scalars
fn scalar_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

impl From<Machine> for Instance {
    fn from(machine: Machine) -> Self {
        Self {
            id: machine.id,
            name: machine.name,
            state: machine.state,
            ips: machine.ips,
            metadata: machine
                .metadata
                .into_iter()
                .map(|(k, v)| (k, scalar_to_string(v)))
                .collect(),
            tags: machine
                .tags
                .into_iter()
                .map(|(k, v)| (k, scalar_to_string(v)))
                .collect(),
        }
    }
}
