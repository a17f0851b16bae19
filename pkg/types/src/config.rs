use serde::{Deserialize, Serialize};

/// Manager configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// backend: slatedb
/// data-dir: /var/lib/vnlb/data
/// api-server: http://127.0.0.1:8080
/// kubernetes-api-secure-ip: 10.0.0.1
/// kubernetes-api-secure-port: 6443
/// api-service-link-local: true
/// public-network-name: public
/// public-fip-pool-name: public-fip-pool
/// namespaces: [default, kube-system]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfigFile {
    /// Control-plane store backend: `memory` or `slatedb`.
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    /// Base URL of the cluster API used to patch Service external IPs.
    #[serde(default, alias = "api-server")]
    pub api_server: Option<String>,
    #[serde(default, alias = "kubernetes-api-secure-ip")]
    pub kubernetes_api_secure_ip: Option<String>,
    #[serde(default, alias = "kubernetes-api-secure-port")]
    pub kubernetes_api_secure_port: Option<u16>,
    #[serde(default, alias = "kubernetes-service-name")]
    pub kubernetes_service_name: Option<String>,
    #[serde(default, alias = "api-service-link-local")]
    pub api_service_link_local: Option<bool>,
    #[serde(default, alias = "cluster-network-name")]
    pub cluster_network_name: Option<String>,
    #[serde(default, alias = "public-network-name")]
    pub public_network_name: Option<String>,
    #[serde(default, alias = "public-fip-pool-name")]
    pub public_fip_pool_name: Option<String>,
    #[serde(default, alias = "public-fip-subnet")]
    pub public_fip_subnet: Option<String>,
    #[serde(default, alias = "fip-pool-cache-ttl-secs")]
    pub fip_pool_cache_ttl_secs: Option<u64>,
    /// Namespaces whose projects are created at startup.
    #[serde(default)]
    pub namespaces: Vec<String>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
