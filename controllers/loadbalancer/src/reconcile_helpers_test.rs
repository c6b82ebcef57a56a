//! Unit tests for reconcile_helpers module

#[cfg(test)]
mod tests {
    use crate::reconcile_helpers::*;
    use crate::test_utils::{test_service, with_ingress_ip, with_type};

    fn ips(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_public_address_preferred() {
        let public_first = ips(&["203.0.113.1", "10.0.0.1"]);
        assert_eq!(select_load_balancer_ip(&public_first), Some("203.0.113.1"));

        let private_first = ips(&["10.0.0.1", "192.168.1.5", "172.16.0.3", "198.51.100.7"]);
        assert_eq!(select_load_balancer_ip(&private_first), Some("198.51.100.7"));
    }

    #[test]
    fn test_private_only_falls_back_to_first() {
        assert_eq!(select_load_balancer_ip(&ips(&["10.0.0.1"])), Some("10.0.0.1"));
        assert_eq!(
            select_load_balancer_ip(&ips(&["192.168.0.9", "10.0.0.1"])),
            Some("192.168.0.9")
        );
    }

    #[test]
    fn test_no_addresses() {
        assert_eq!(select_load_balancer_ip(&[]), None);
    }

    #[test]
    fn test_ingress_needs_update() {
        let service = test_service("web", "default", vec![], &[]);
        assert_eq!(current_ingress_ip(&service), None);
        assert!(ingress_needs_update(&service, "203.0.113.1"));

        let service = with_ingress_ip(service, "203.0.113.1");
        assert_eq!(current_ingress_ip(&service), Some("203.0.113.1"));
        assert!(!ingress_needs_update(&service, "203.0.113.1"));
        assert!(ingress_needs_update(&service, "203.0.113.2"));
    }

    #[test]
    fn test_load_balancer_type() {
        let service = test_service("web", "default", vec![], &[]);
        assert!(is_load_balancer_service(&service));
        assert!(!is_load_balancer_service(&with_type(service, "ClusterIP")));
    }
}
