//! Triton CloudAPI client for load balancer instances
//!
//! Load balancers are CloudAPI machines whose configuration lives in their
//! metadata. This crate provides the domain models, the metadata codec, a
//! signed HTTP client and the bounded polling used to wait for provisioning
//! and deletion.
//!
//! # Example
//!
//! ```no_run
//! use triton_client::{LoadBalancerConfig, PortMapping, PortType, RequestSigner, TritonClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let signer = RequestSigner::from_pem_file("acme", "ba:75:27:5b:f3:0b", "/secrets/id_rsa")?;
//! let client = TritonClient::new(
//!     "https://us-central-1.api.mnx.io".to_string(),
//!     "acme".to_string(),
//!     signer,
//! )?;
//!
//! let config = LoadBalancerConfig {
//!     name: "web".to_string(),
//!     port_mappings: vec![PortMapping {
//!         port_type: PortType::Http,
//!         listen_port: 80,
//!         backend_name: "web".to_string(),
//!         backend_port: 8080,
//!     }],
//!     ..Default::default()
//! };
//!
//! // Blocks until the instance is running
//! client.create_load_balancer(&config, &CancellationToken::new()).await?;
//!
//! let instance = client.get_instance_by_name("web").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Ownership scoping**: lookups only match instances carrying the controller's tags
//! - **Lossy metadata codec**: malformed port map entries are dropped, not fatal
//! - **Bounded waits**: provisioning and deletion poll with a timeout and honour cancellation
//! - **Mocking**: `MockTritonClient` behind the `test-util` feature

pub mod client;
pub mod error;
pub mod models;
pub mod portmap;
pub mod signer;
#[path = "trait.rs"]
pub mod triton_trait;
pub mod wait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{TritonClient, DEFAULT_IMAGE, DEFAULT_PACKAGE};
pub use error::{is_transient_message, TritonError};
pub use models::*;
pub use signer::RequestSigner;
pub use triton_trait::LoadBalancerClientTrait;
pub use wait::{poll_until, WaitConfig, WaitReport};
#[cfg(feature = "test-util")]
pub use mock::{CallCounts, MockOperation, MockTritonClient};
