//! Control-plane store key layout.
//!
//! Objects live under `/vnc/<kind>/<uuid>`; fully-qualified names are indexed
//! under `/vnc/fq/<kind>/<fq-name>` pointing at the uuid.

pub const LOADBALANCERS_PREFIX: &str = "/vnc/loadbalancers/";
pub const LISTENERS_PREFIX: &str = "/vnc/listeners/";
pub const POOLS_PREFIX: &str = "/vnc/pools/";
pub const MEMBERS_PREFIX: &str = "/vnc/members/";
pub const INTERFACES_PREFIX: &str = "/vnc/interfaces/";
pub const FLOATING_IPS_PREFIX: &str = "/vnc/floating-ips/";
pub const FIP_POOLS_PREFIX: &str = "/vnc/fip-pools/";
pub const PROJECTS_PREFIX: &str = "/vnc/projects/";
pub const NETWORKS_PREFIX: &str = "/vnc/networks/";
pub const LINK_LOCAL_PREFIX: &str = "/vnc/link-local/";

/// Prefix of the fully-qualified-name index.
pub const FQ_NAME_PREFIX: &str = "/vnc/fq/";
