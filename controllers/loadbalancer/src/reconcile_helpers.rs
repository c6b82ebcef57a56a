//! Helper functions for the reconcile pass
//!
//! Address selection and status comparison, kept free of I/O.

use k8s_openapi::api::core::v1::Service;

/// Address prefixes treated as private when choosing the ingress address
pub const PRIVATE_PREFIXES: [&str; 3] = ["10.", "192.168.", "172."];

/// Pick the address to publish in the Service status
///
/// Returns the first address outside the private prefixes, falling back to
/// the first address in list order. `None` only when there are no addresses.
pub fn select_load_balancer_ip(ips: &[String]) -> Option<&str> {
    ips.iter()
        .find(|ip| !PRIVATE_PREFIXES.iter().any(|prefix| ip.starts_with(prefix)))
        .or_else(|| ips.first())
        .map(String::as_str)
}

/// First ingress IP currently recorded in the Service status
pub fn current_ingress_ip(service: &Service) -> Option<&str> {
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?
        .ip
        .as_deref()
}

/// Check if the ingress status needs to be updated
///
/// Compares the desired address with the one already recorded so repeated
/// passes do not rewrite an unchanged status.
pub fn ingress_needs_update(service: &Service, desired_ip: &str) -> bool {
    current_ingress_ip(service) != Some(desired_ip)
}

/// Whether the Service asks for a load balancer
pub fn is_load_balancer_service(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        == Some("LoadBalancer")
}
