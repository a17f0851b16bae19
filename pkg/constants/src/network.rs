//! Virtual-network naming constants.

/// Domain every project, network and pool lives under.
pub const DEFAULT_DOMAIN: &str = "default-domain";

/// Project that owns cluster-wide networks (cluster network, public network).
pub const DEFAULT_PROJECT: &str = "default";

/// Default name of the cluster-wide virtual network load balancers attach to.
pub const DEFAULT_CLUSTER_NETWORK: &str = "cluster-network";

/// Default name of the public network floating IPs are drawn from.
pub const DEFAULT_PUBLIC_NETWORK: &str = "public";

/// Default name of the floating-IP pool on the public network.
pub const DEFAULT_PUBLIC_FIP_POOL: &str = "public-fip-pool";

/// Default subnet the public floating-IP pool allocates from.
pub const DEFAULT_PUBLIC_FIP_SUBNET: &str = "203.0.113.0/24";

/// Load balancer provider used for every service load balancer.
pub const LB_PROVIDER_NATIVE: &str = "native";

/// Suffix appended to the load balancer name for its floating IP.
pub const FIP_NAME_SUFFIX: &str = "-externalIP";

/// Name of the Service fronting the cluster API server.
pub const DEFAULT_KUBERNETES_SERVICE_NAME: &str = "kubernetes";

/// Protocol assumed when a Service port omits one.
pub const DEFAULT_PORT_PROTOCOL: &str = "TCP";

/// How long a looked-up public floating-IP pool stays cached, in seconds.
pub const DEFAULT_FIP_POOL_CACHE_TTL_SECS: u64 = 300;
