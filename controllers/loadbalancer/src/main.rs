//! Triton LoadBalancer Controller
//!
//! Watches Services of type `LoadBalancer` and backs each one with a Triton
//! load balancer instance:
//! - Provisions the instance when the Service appears
//! - Rewrites its metadata when ports or annotations change
//! - Publishes its address in `status.loadBalancer.ingress`
//! - Deletes it before the Service is released
//!
//! Configuration comes from environment variables (see `config`).

mod backoff;
mod config;
mod controller;
mod error;
mod events;
mod extract;
mod kube_api;
mod reconcile_helpers;
#[cfg(test)]
mod reconcile_helpers_test;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube and reqwest both pull in rustls; pick the provider explicitly
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| ControllerError::InvalidConfig("failed to install rustls crypto provider".to_string()))?;

    info!("Starting Triton LoadBalancer Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  CloudAPI URL: {}", config.triton_url);
    info!("  Account: {}", config.triton_account);
    info!("  Key: {} ({})", config.triton_key_id, config.triton_key_path.display());
    info!("  Package: {}", config.package);
    info!("  Image: {}", config.image);
    info!("  Create timeout: {:?}", config.create_timeout);
    info!("  Delete timeout: {:?}", config.delete_timeout);
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Workers: {}", config.workers);
    info!("  Resync interval: {:?}", config.resync_interval);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping controller");
            shutdown.cancel();
        }
    });

    // Initialize and run controller
    let controller = Controller::new(config, shutdown).await?;
    controller.run().await?;

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
