//! Metadata codec
//!
//! Load balancer configuration is persisted as flat string metadata on the
//! instance. The port map uses one entry per listener:
//!
//! ```text
//! <type>://<listen port>:<backend name>[:<backend port>]
//! ```
//!
//! Entries are joined with `,`. Decoding is lossy: malformed entries are
//! dropped instead of failing the whole document, so only strings produced by
//! [`encode_port_map`] are guaranteed to round-trip.

use crate::models::*;
use std::collections::HashMap;
use tracing::debug;

/// Encode port mappings into the port map string
pub fn encode_port_map(mappings: &[PortMapping]) -> String {
    mappings
        .iter()
        .map(|m| {
            if m.backend_port > 0 {
                format!("{}://{}:{}:{}", m.port_type, m.listen_port, m.backend_name, m.backend_port)
            } else {
                format!("{}://{}:{}", m.port_type, m.listen_port, m.backend_name)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a port map string, skipping entries that do not parse
pub fn parse_port_map(portmap: &str) -> Vec<PortMapping> {
    portmap.split(',').filter_map(parse_entry).collect()
}

fn parse_entry(entry: &str) -> Option<PortMapping> {
    let entry = entry.trim();
    let (scheme, rest) = entry.split_once("://")?;

    let port_type = match scheme.parse::<PortType>() {
        Ok(t) => t,
        Err(e) => {
            debug!("Dropping port map entry {:?}: {}", entry, e);
            return None;
        }
    };

    let parts: Vec<&str> = rest.split(':').collect();
    if parts.len() < 2 {
        debug!("Dropping port map entry {:?}: missing backend", entry);
        return None;
    }

    let Ok(listen_port) = parts[0].parse::<u16>() else {
        debug!("Dropping port map entry {:?}: bad listen port", entry);
        return None;
    };

    // An unparsable backend port degrades to "use the listen port"
    let backend_port = parts
        .get(2)
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(0);

    Some(PortMapping {
        port_type,
        listen_port,
        backend_name: parts[1].to_string(),
        backend_port,
    })
}

/// Encode the metrics ACL as a comma-joined list
pub fn encode_metrics_acl(acl: &[String]) -> String {
    acl.join(",")
}

/// Decode a metrics ACL, accepting commas and whitespace as separators
pub fn parse_metrics_acl(acl: &str) -> Vec<String> {
    acl.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the full metadata document for a configuration
///
/// Optional fields are omitted when they hold their zero value.
pub fn to_metadata(config: &LoadBalancerConfig) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert(METADATA_LOADBALANCER.to_string(), "true".to_string());
    metadata.insert(
        METADATA_PORTMAP.to_string(),
        encode_port_map(&config.port_mappings),
    );

    if config.max_backends > 0 {
        metadata.insert(METADATA_MAX_RS.to_string(), config.max_backends.to_string());
    }

    if !config.certificate_name.is_empty() {
        metadata.insert(
            METADATA_CERTIFICATE_NAME.to_string(),
            config.certificate_name.clone(),
        );
    }

    if !config.metrics_acl.is_empty() {
        metadata.insert(
            METADATA_METRICS_ACL.to_string(),
            encode_metrics_acl(&config.metrics_acl),
        );
    }

    metadata
}

/// Rebuild a configuration from instance metadata
pub fn from_metadata(name: &str, metadata: &HashMap<String, String>) -> LoadBalancerConfig {
    LoadBalancerConfig {
        name: name.to_string(),
        port_mappings: metadata
            .get(METADATA_PORTMAP)
            .map(|s| parse_port_map(s))
            .unwrap_or_default(),
        max_backends: metadata
            .get(METADATA_MAX_RS)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0),
        certificate_name: metadata
            .get(METADATA_CERTIFICATE_NAME)
            .cloned()
            .unwrap_or_default(),
        metrics_acl: metadata
            .get(METADATA_METRICS_ACL)
            .map(|s| parse_metrics_acl(s))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(port_type: PortType, listen: u16, backend: &str, backend_port: u16) -> PortMapping {
        PortMapping {
            port_type,
            listen_port: listen,
            backend_name: backend.to_string(),
            backend_port,
        }
    }

    #[test]
    fn test_encode_omits_zero_backend_port() {
        let encoded = encode_port_map(&[
            mapping(PortType::Http, 80, "web", 8080),
            mapping(PortType::Tcp, 5432, "db", 0),
        ]);
        assert_eq!(encoded, "http://80:web:8080,tcp://5432:db");
    }

    #[test]
    fn test_round_trip_preserves_order_and_duplicates() {
        let mappings = vec![
            mapping(PortType::Https, 443, "web", 8443),
            mapping(PortType::Http, 80, "web", 8080),
            mapping(PortType::Http, 80, "web", 0),
            mapping(PortType::Tcp, 3306, "db", 3306),
        ];
        assert_eq!(parse_port_map(&encode_port_map(&mappings)), mappings);
    }

    #[test]
    fn test_empty_port_map() {
        assert_eq!(encode_port_map(&[]), "");
        assert!(parse_port_map("").is_empty());
    }

    #[test]
    fn test_malformed_entry_is_dropped() {
        let parsed = parse_port_map("bad-entry,http://80:svc");
        assert_eq!(parsed, vec![mapping(PortType::Http, 80, "svc", 0)]);
    }

    #[test]
    fn test_non_numeric_listen_port_is_dropped() {
        assert!(parse_port_map("tcp://notanumber:svc").is_empty());
    }

    #[test]
    fn test_missing_backend_is_dropped() {
        assert!(parse_port_map("http://80").is_empty());
    }

    #[test]
    fn test_non_numeric_backend_port_defaults_to_zero() {
        let parsed = parse_port_map("http://80:svc:abc");
        assert_eq!(parsed, vec![mapping(PortType::Http, 80, "svc", 0)]);
    }

    #[test]
    fn test_unknown_scheme_is_dropped() {
        assert!(parse_port_map("udp://53:dns").is_empty());
    }

    #[test]
    fn test_metrics_acl_separators() {
        assert_eq!(
            parse_metrics_acl("10.0.0.0/8, 192.168.0.0/16 ,,  172.16.0.1"),
            vec!["10.0.0.0/8", "192.168.0.0/16", "172.16.0.1"]
        );
        assert!(parse_metrics_acl("").is_empty());
        assert!(parse_metrics_acl(" , ").is_empty());
    }

    #[test]
    fn test_metadata_omits_zero_values() {
        let config = LoadBalancerConfig {
            name: "web".to_string(),
            port_mappings: vec![mapping(PortType::Http, 80, "web", 8080)],
            ..Default::default()
        };
        let metadata = to_metadata(&config);

        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get(METADATA_LOADBALANCER).map(String::as_str), Some("true"));
        assert_eq!(metadata.get(METADATA_PORTMAP).map(String::as_str), Some("http://80:web:8080"));
        assert!(!metadata.contains_key(METADATA_MAX_RS));
        assert!(!metadata.contains_key(METADATA_CERTIFICATE_NAME));
        assert!(!metadata.contains_key(METADATA_METRICS_ACL));
    }

    #[test]
    fn test_metadata_round_trip() {
        let config = LoadBalancerConfig {
            name: "web".to_string(),
            port_mappings: vec![
                mapping(PortType::Http, 80, "web", 8080),
                mapping(PortType::Https, 443, "web", 8443),
            ],
            max_backends: 64,
            certificate_name: "example.com,www.example.com".to_string(),
            metrics_acl: vec!["10.0.0.0/8".to_string(), "192.168.0.0/16".to_string()],
        };
        assert_eq!(from_metadata("web", &to_metadata(&config)), config);
    }

    #[test]
    fn test_from_metadata_bad_max_rs() {
        let mut metadata = HashMap::new();
        metadata.insert(METADATA_MAX_RS.to_string(), "lots".to_string());
        let config = from_metadata("web", &metadata);
        assert_eq!(config.max_backends, 0);
        assert!(config.port_mappings.is_empty());
    }
}
