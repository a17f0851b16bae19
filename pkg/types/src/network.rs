use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tenant a namespace maps to: `[domain, namespace]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub uuid: String,
    pub fq_name: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualNetwork {
    pub uuid: String,
    /// `[domain, project, network]`
    pub fq_name: Vec<String>,
}

/// Network attachment point that floating IPs bind to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineInterface {
    pub uuid: String,
    pub name: String,
    pub fq_name: Vec<String>,
    pub network_id: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub floating_ips: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Publicly routable address range on a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatingIpPool {
    pub uuid: String,
    /// `[domain, project, network, pool]`
    pub fq_name: Vec<String>,
    pub network_id: String,
    /// CIDR the pool allocates from.
    pub subnet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatingIp {
    pub uuid: String,
    pub name: String,
    pub address: String,
    pub pool_id: String,
    #[serde(default)]
    pub virtual_machine_interfaces: Vec<String>,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
}

/// Relay from a virtual service address to a fabric address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkLocalEntry {
    /// `<service-name>-<port>`
    pub name: String,
    pub service_ip: String,
    pub service_port: u16,
    pub fabric_ip: String,
    pub fabric_port: u16,
}
