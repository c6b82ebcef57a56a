//! Controller configuration
//!
//! Read once at startup from the environment. Parsing goes through a lookup
//! function so it can be exercised without touching the process environment.

use crate::error::ControllerError;
use std::path::PathBuf;
use std::time::Duration;
use triton_client::{DEFAULT_IMAGE, DEFAULT_PACKAGE};

/// Default number of concurrent reconciles
pub const DEFAULT_WORKERS: u16 = 4;

/// Default periodic resync interval in seconds
pub const DEFAULT_RESYNC_SECS: u64 = 600;

/// Default provisioning and deletion timeout in seconds
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 300;

/// Runtime configuration of the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// CloudAPI base URL
    pub triton_url: String,
    /// Account login
    pub triton_account: String,
    /// Fingerprint of the signing key
    pub triton_key_id: String,
    /// Path to the PEM private key
    pub triton_key_path: PathBuf,
    pub package: String,
    pub image: String,
    pub create_timeout: Duration,
    pub delete_timeout: Duration,
    /// `None` watches all namespaces
    pub namespace: Option<String>,
    pub workers: u16,
    pub resync_interval: Duration,
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value if set
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                ControllerError::InvalidConfig(format!("{} environment variable is required", key))
            })
        };
        let number = |key: &str, default: u64| -> Result<u64, ControllerError> {
            match get(key) {
                Some(value) => value.trim().parse().map_err(|_| {
                    ControllerError::InvalidConfig(format!(
                        "{} must be a non-negative integer, got {:?}",
                        key, value
                    ))
                }),
                None => Ok(default),
            }
        };

        let workers = number("LB_CONTROLLER_WORKERS", u64::from(DEFAULT_WORKERS))?;
        let workers = u16::try_from(workers)
            .ok()
            .filter(|w| *w > 0)
            .ok_or_else(|| {
                ControllerError::InvalidConfig(format!(
                    "LB_CONTROLLER_WORKERS must be between 1 and {}, got {}",
                    u16::MAX,
                    workers
                ))
            })?;

        Ok(Self {
            triton_url: required("TRITON_URL")?,
            triton_account: required("TRITON_ACCOUNT")?,
            triton_key_id: required("TRITON_KEY_ID")?,
            triton_key_path: PathBuf::from(required("TRITON_KEY_PATH")?),
            package: get("TRITON_LB_PACKAGE").unwrap_or_else(|| DEFAULT_PACKAGE.to_string()),
            image: get("TRITON_LB_IMAGE").unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            create_timeout: Duration::from_secs(number("TRITON_LB_CREATE_TIMEOUT", DEFAULT_WAIT_TIMEOUT_SECS)?),
            delete_timeout: Duration::from_secs(number("TRITON_LB_DELETE_TIMEOUT", DEFAULT_WAIT_TIMEOUT_SECS)?),
            namespace: get("WATCH_NAMESPACE"),
            workers,
            resync_interval: Duration::from_secs(number("LB_RESYNC_INTERVAL", DEFAULT_RESYNC_SECS)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("TRITON_URL", "https://cloudapi.example.com"),
        ("TRITON_ACCOUNT", "acme"),
        ("TRITON_KEY_ID", "ba:75:27:5b"),
        ("TRITON_KEY_PATH", "/secrets/id_rsa"),
    ];

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.package, "g4-highcpu-1G");
        assert_eq!(config.image, "70e3ae72-96b6-11ea-9274-2f3c66e8b2c4");
        assert_eq!(config.create_timeout, Duration::from_secs(300));
        assert_eq!(config.delete_timeout, Duration::from_secs(300));
        assert_eq!(config.namespace, None);
        assert_eq!(config.workers, 4);
        assert_eq!(config.resync_interval, Duration::from_secs(600));
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("TRITON_LB_PACKAGE", "g4-highcpu-2G"),
            ("TRITON_LB_CREATE_TIMEOUT", "600"),
            ("TRITON_LB_DELETE_TIMEOUT", " 120 "),
            ("WATCH_NAMESPACE", "edge"),
            ("LB_CONTROLLER_WORKERS", "8"),
        ]);
        let config = ControllerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.package, "g4-highcpu-2G");
        assert_eq!(config.create_timeout, Duration::from_secs(600));
        assert_eq!(config.delete_timeout, Duration::from_secs(120));
        assert_eq!(config.namespace.as_deref(), Some("edge"));
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn test_missing_required_variable() {
        let err = ControllerConfig::from_lookup(lookup(&REQUIRED[..3])).unwrap_err();
        assert!(err.to_string().contains("TRITON_KEY_PATH"));
    }

    #[test]
    fn test_invalid_numbers() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("TRITON_LB_CREATE_TIMEOUT", "five minutes"));
        let err = ControllerConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains("TRITON_LB_CREATE_TIMEOUT"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("LB_CONTROLLER_WORKERS", "0"));
        assert!(ControllerConfig::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn test_empty_namespace_means_all() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("WATCH_NAMESPACE", ""));
        let config = ControllerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.namespace, None);
    }
}
