use pkg_constants::network::{
    DEFAULT_CLUSTER_NETWORK, DEFAULT_DOMAIN, DEFAULT_FIP_POOL_CACHE_TTL_SECS,
    DEFAULT_KUBERNETES_SERVICE_NAME, DEFAULT_PROJECT, DEFAULT_PUBLIC_FIP_POOL,
    DEFAULT_PUBLIC_NETWORK,
};
use pkg_types::config::ManagerConfigFile;
use std::time::Duration;

/// Fabric address of the cluster API server that link-local entries relay to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricEndpoint {
    pub ip: String,
    pub port: u16,
}

/// Resolved settings of the service reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Name of the Service fronting the cluster API server.
    pub kubernetes_service_name: String,
    /// `Some` only when link-local relaying is enabled and the fabric address
    /// is fully known.
    pub link_local: Option<FabricEndpoint>,
    pub cluster_network: Vec<String>,
    pub public_fip_pool: Vec<String>,
    pub fip_pool_cache_ttl: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::from_file(&ManagerConfigFile::default())
    }
}

impl ReconcilerConfig {
    pub fn from_file(file: &ManagerConfigFile) -> Self {
        let link_local = match (
            file.api_service_link_local.unwrap_or(false),
            file.kubernetes_api_secure_ip.as_deref(),
            file.kubernetes_api_secure_port,
        ) {
            (true, Some(ip), Some(port)) if !ip.is_empty() => Some(FabricEndpoint {
                ip: ip.to_string(),
                port,
            }),
            _ => None,
        };
        let cluster_network = file
            .cluster_network_name
            .clone()
            .unwrap_or_else(|| DEFAULT_CLUSTER_NETWORK.to_string());
        let public_network = file
            .public_network_name
            .clone()
            .unwrap_or_else(|| DEFAULT_PUBLIC_NETWORK.to_string());
        let public_pool = file
            .public_fip_pool_name
            .clone()
            .unwrap_or_else(|| DEFAULT_PUBLIC_FIP_POOL.to_string());

        Self {
            kubernetes_service_name: file
                .kubernetes_service_name
                .clone()
                .unwrap_or_else(|| DEFAULT_KUBERNETES_SERVICE_NAME.to_string()),
            link_local,
            cluster_network: vec![
                DEFAULT_DOMAIN.to_string(),
                DEFAULT_PROJECT.to_string(),
                cluster_network,
            ],
            public_fip_pool: vec![
                DEFAULT_DOMAIN.to_string(),
                DEFAULT_PROJECT.to_string(),
                public_network,
                public_pool,
            ],
            fip_pool_cache_ttl: Duration::from_secs(
                file.fip_pool_cache_ttl_secs
                    .unwrap_or(DEFAULT_FIP_POOL_CACHE_TTL_SECS),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ReconcilerConfig::default();
        assert_eq!(cfg.kubernetes_service_name, "kubernetes");
        assert!(cfg.link_local.is_none());
        assert_eq!(
            cfg.cluster_network,
            vec!["default-domain", "default", "cluster-network"]
        );
        assert_eq!(
            cfg.public_fip_pool,
            vec!["default-domain", "default", "public", "public-fip-pool"]
        );
        assert_eq!(cfg.fip_pool_cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn link_local_needs_flag_ip_and_port() {
        let mut file = ManagerConfigFile {
            api_service_link_local: Some(true),
            kubernetes_api_secure_ip: Some("10.0.0.1".to_string()),
            kubernetes_api_secure_port: Some(6443),
            ..Default::default()
        };
        assert_eq!(
            ReconcilerConfig::from_file(&file).link_local,
            Some(FabricEndpoint {
                ip: "10.0.0.1".to_string(),
                port: 6443
            })
        );

        file.kubernetes_api_secure_port = None;
        assert!(ReconcilerConfig::from_file(&file).link_local.is_none());

        file.kubernetes_api_secure_port = Some(6443);
        file.kubernetes_api_secure_ip = None;
        assert!(ReconcilerConfig::from_file(&file).link_local.is_none());

        file.kubernetes_api_secure_ip = Some("10.0.0.1".to_string());
        file.api_service_link_local = Some(false);
        assert!(ReconcilerConfig::from_file(&file).link_local.is_none());
    }
}
