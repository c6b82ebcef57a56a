//! Service to load balancer configuration
//!
//! Pure translation of a Service's ports and annotations. Malformed
//! annotation values are treated as absent, never as errors.

use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use tracing::{debug, warn};
use triton_client::portmap::parse_metrics_acl;
use triton_client::{LoadBalancerConfig, PortMapping, PortType};

/// Maximum number of backends
pub const ANNOTATION_MAX_RS: &str = "cloud.tritoncompute/max_rs";
/// Certificate subject(s) for TLS termination, passed through as is
pub const ANNOTATION_CERTIFICATE_NAME: &str = "cloud.tritoncompute/certificate_name";
/// IPs and CIDRs allowed to scrape metrics
pub const ANNOTATION_METRICS_ACL: &str = "cloud.tritoncompute/metrics_acl";

/// Classify a Service port by name first, then by well-known number
pub fn classify_port(name: Option<&str>, port: i32) -> PortType {
    match (name, port) {
        (Some("http"), _) | (_, 80) => PortType::Http,
        (Some("https"), _) | (_, 443) => PortType::Https,
        _ => PortType::Tcp,
    }
}

fn port_mapping(backend_name: &str, port: &ServicePort) -> Option<PortMapping> {
    let Ok(listen_port) = u16::try_from(port.port) else {
        warn!("Skipping Service port {} of {}: out of range", port.port, backend_name);
        return None;
    };
    if listen_port == 0 {
        warn!("Skipping Service port 0 of {}", backend_name);
        return None;
    }

    // Named target ports cannot be resolved here; 0 means "same as listen port"
    let backend_port = match &port.target_port {
        Some(IntOrString::Int(target)) => u16::try_from(*target).unwrap_or(0),
        Some(IntOrString::String(_)) | None => 0,
    };

    Some(PortMapping {
        port_type: classify_port(port.name.as_deref(), port.port),
        listen_port,
        backend_name: backend_name.to_string(),
        backend_port,
    })
}

/// Derive the load balancer configuration from a Service
///
/// The instance and the backend group are both named after the Service.
pub fn extract_load_balancer_config(service: &Service) -> LoadBalancerConfig {
    let name = service.name_any();
    let annotations = service.annotations();

    let port_mappings = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| ports.iter().filter_map(|p| port_mapping(&name, p)).collect())
        .unwrap_or_default();

    let max_backends = match annotations.get(ANNOTATION_MAX_RS) {
        Some(value) => value.trim().parse::<u32>().unwrap_or_else(|_| {
            debug!("Ignoring invalid {} annotation {:?} on {}", ANNOTATION_MAX_RS, value, name);
            0
        }),
        None => 0,
    };

    LoadBalancerConfig {
        port_mappings,
        max_backends,
        certificate_name: annotations
            .get(ANNOTATION_CERTIFICATE_NAME)
            .cloned()
            .unwrap_or_default(),
        metrics_acl: annotations
            .get(ANNOTATION_METRICS_ACL)
            .map(|v| parse_metrics_acl(v))
            .unwrap_or_default(),
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{service_port, test_service};

    #[test]
    fn test_port_classification() {
        assert_eq!(classify_port(None, 80), PortType::Http);
        assert_eq!(classify_port(Some(""), 80), PortType::Http);
        assert_eq!(classify_port(Some("http"), 9090), PortType::Http);
        assert_eq!(classify_port(Some("https"), 8443), PortType::Https);
        assert_eq!(classify_port(None, 443), PortType::Https);
        assert_eq!(classify_port(Some("postgres"), 5432), PortType::Tcp);
        assert_eq!(classify_port(None, 8080), PortType::Tcp);
    }

    #[test]
    fn test_full_extraction() {
        let service = test_service(
            "web",
            "default",
            vec![
                service_port(Some("http"), 80, Some(IntOrString::Int(8080))),
                service_port(Some("https"), 443, Some(IntOrString::Int(8443))),
            ],
            &[
                (ANNOTATION_MAX_RS, "64"),
                (ANNOTATION_CERTIFICATE_NAME, "example.com"),
                (ANNOTATION_METRICS_ACL, "10.0.0.0/8 192.168.0.0/16"),
            ],
        );

        let config = extract_load_balancer_config(&service);
        assert_eq!(config.name, "web");
        assert_eq!(
            config.port_mappings,
            vec![
                PortMapping {
                    port_type: PortType::Http,
                    listen_port: 80,
                    backend_name: "web".to_string(),
                    backend_port: 8080,
                },
                PortMapping {
                    port_type: PortType::Https,
                    listen_port: 443,
                    backend_name: "web".to_string(),
                    backend_port: 8443,
                },
            ]
        );
        assert_eq!(config.max_backends, 64);
        assert_eq!(config.certificate_name, "example.com");
        assert_eq!(config.metrics_acl, vec!["10.0.0.0/8", "192.168.0.0/16"]);
    }

    #[test]
    fn test_invalid_annotations_are_defaults() {
        let service = test_service(
            "web",
            "default",
            vec![service_port(None, 5432, None)],
            &[(ANNOTATION_MAX_RS, "many"), (ANNOTATION_METRICS_ACL, " , ")],
        );

        let config = extract_load_balancer_config(&service);
        assert_eq!(config.max_backends, 0);
        assert!(config.metrics_acl.is_empty());
        assert!(config.certificate_name.is_empty());
        assert_eq!(config.port_mappings[0].port_type, PortType::Tcp);
        assert_eq!(config.port_mappings[0].backend_port, 0);
    }

    #[test]
    fn test_named_target_port_and_bad_ports() {
        let service = test_service(
            "web",
            "default",
            vec![
                service_port(Some("metrics"), 9100, Some(IntOrString::String("metrics".to_string()))),
                service_port(None, 70000, Some(IntOrString::Int(80))),
                service_port(None, 8080, Some(IntOrString::Int(-1))),
            ],
            &[],
        );

        let config = extract_load_balancer_config(&service);
        assert_eq!(config.port_mappings.len(), 2);
        assert_eq!(config.port_mappings[0].backend_port, 0);
        assert_eq!(config.port_mappings[1].listen_port, 8080);
        assert_eq!(config.port_mappings[1].backend_port, 0);
    }

    #[test]
    fn test_duplicate_listen_ports_are_kept() {
        let service = test_service(
            "web",
            "default",
            vec![
                service_port(Some("a"), 8000, Some(IntOrString::Int(1))),
                service_port(Some("b"), 8000, Some(IntOrString::Int(2))),
            ],
            &[],
        );

        let config = extract_load_balancer_config(&service);
        let backends: Vec<u16> = config.port_mappings.iter().map(|m| m.backend_port).collect();
        assert_eq!(backends, vec![1, 2]);
    }

    #[test]
    fn test_certificate_name_is_passed_through() {
        let service = test_service(
            "web",
            "default",
            vec![service_port(Some("https"), 443, None)],
            &[(ANNOTATION_CERTIFICATE_NAME, " example.com, www.example.com ")],
        );

        let config = extract_load_balancer_config(&service);
        assert_eq!(config.certificate_name, " example.com, www.example.com ");
    }
}
