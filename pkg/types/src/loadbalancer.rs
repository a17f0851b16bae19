use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::{ServicePort, TargetPort};

/// A virtual load-balancing service. Its uuid is the uuid of the Service it
/// fronts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loadbalancer {
    pub uuid: String,
    pub name: String,
    /// `[domain, namespace, service-name]`
    pub fq_name: Vec<String>,
    pub project_id: String,
    pub provider: String,
    #[serde(default)]
    pub vip_address: Option<String>,
    pub network_id: String,
    /// Network attachment points; the first one found is the primary.
    #[serde(default)]
    pub virtual_machine_interfaces: Vec<String>,
    #[serde(default)]
    pub listeners: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One exposed (protocol, port) of a load balancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    pub uuid: String,
    pub name: String,
    pub loadbalancer_id: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub protocol_port: Option<u16>,
    #[serde(default)]
    pub pool: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Listener {
    /// Whether this listener serves `port`. Listeners missing either the
    /// protocol or the port never match.
    pub fn matches(&self, port: &ServicePort) -> bool {
        match (&self.protocol, self.protocol_port) {
            (Some(protocol), Some(protocol_port)) => {
                protocol_port == port.port && *protocol == port.protocol
            }
            _ => false,
        }
    }
}

/// Backend set of a listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub uuid: String,
    pub name: String,
    pub listener_id: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub target_port: Option<TargetPort>,
    #[serde(default)]
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One backend endpoint of a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub uuid: String,
    pub pool_id: String,
    pub address: String,
    pub port: u16,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(protocol: Option<&str>, port: Option<u16>) -> Listener {
        Listener {
            uuid: "l1".to_string(),
            name: "web-TCP-80".to_string(),
            loadbalancer_id: "lb1".to_string(),
            protocol: protocol.map(str::to_string),
            protocol_port: port,
            pool: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn listener_matches_protocol_and_port() {
        let port = ServicePort::tcp(80, 8080);
        assert!(listener(Some("TCP"), Some(80)).matches(&port));
        assert!(!listener(Some("UDP"), Some(80)).matches(&port));
        assert!(!listener(Some("TCP"), Some(443)).matches(&port));
    }

    #[test]
    fn listener_missing_fields_never_matches() {
        let port = ServicePort::tcp(80, 8080);
        assert!(!listener(None, Some(80)).matches(&port));
        assert!(!listener(Some("TCP"), None).matches(&port));
        assert!(!listener(None, None).matches(&port));
    }
}
