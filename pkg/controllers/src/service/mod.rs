//! Service → virtual-network loadbalancer reconciliation.
//!
//! `add` converges a Service's loadbalancer topology, link-local relay and
//! floating IP; `delete` removes them. Both are re-entrant. Events for one
//! Service are expected in order; nothing here serializes them.

pub mod dispatch;
pub mod floating_ip;
pub mod link_local;
pub mod topology;

use pkg_constants::network::DEFAULT_DOMAIN;
use pkg_types::service::{Service, ServicePort, ServiceType};
use pkg_vnc::{ControlPlane, Result, ServicePatcher};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ReconcilerConfig;
use crate::registry::Registry;
use floating_ip::{FipPoolCache, FloatingIpManager};
use link_local::LinkLocalShim;
use topology::Topology;

/// The fields of a Service event the reconciler acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceParams {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub cluster_ip: Option<String>,
    pub selector: HashMap<String, String>,
    pub ports: Vec<ServicePort>,
    /// `None` when the event carries no type; no floating-IP action is taken.
    pub service_type: Option<ServiceType>,
    /// First declared external IP.
    pub external_ip: Option<String>,
    pub load_balancer_ip: Option<String>,
}

impl From<&Service> for ServiceParams {
    fn from(svc: &Service) -> Self {
        Self {
            id: svc.metadata.uid.clone(),
            name: svc.metadata.name.clone(),
            namespace: svc.metadata.namespace.clone(),
            cluster_ip: svc.spec.cluster_ip.clone(),
            selector: svc.spec.selector.clone().unwrap_or_default(),
            ports: svc.spec.ports.clone(),
            service_type: svc.spec.service_type.clone(),
            external_ip: svc.first_external_ip(),
            load_balancer_ip: svc.spec.load_balancer_ip.clone(),
        }
    }
}

pub struct ServiceReconciler {
    registry: Arc<Registry>,
    topology: Topology,
    floating_ips: FloatingIpManager,
    link_local: LinkLocalShim,
}

impl ServiceReconciler {
    pub fn new(
        config: &ReconcilerConfig,
        cp: Arc<dyn ControlPlane>,
        registry: Arc<Registry>,
        patcher: Arc<dyn ServicePatcher>,
    ) -> Self {
        Self {
            topology: Topology::new(
                cp.clone(),
                registry.clone(),
                config.cluster_network.clone(),
            ),
            floating_ips: FloatingIpManager::new(
                cp.clone(),
                registry.clone(),
                patcher,
                FipPoolCache::new(config.public_fip_pool.clone(), config.fip_pool_cache_ttl),
            ),
            link_local: LinkLocalShim::new(
                cp,
                config.kubernetes_service_name.clone(),
                config.link_local.clone(),
            ),
            registry,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Converge the topology and floating IP of `svc`. Also used for updates.
    pub async fn add(&self, svc: &ServiceParams) -> Result<()> {
        if !self.registry.loadbalancers.contains(&svc.id) {
            self.check_uuid_change(svc).await?;
        }

        self.topology
            .ensure(
                &svc.id,
                &svc.name,
                &svc.namespace,
                svc.cluster_ip.as_deref(),
                &svc.ports,
            )
            .await?;

        if self.link_local.applies_to(&svc.name) {
            self.link_local
                .create(&svc.name, svc.cluster_ip.as_deref(), &svc.ports)
                .await;
        }

        self.floating_ips.reconcile(svc).await;
        Ok(())
    }

    /// Release the floating IPs and tear down the topology of `service_id`.
    pub async fn delete(
        &self,
        service_id: &str,
        name: &str,
        namespace: &str,
        ports: &[ServicePort],
    ) -> Result<()> {
        let released = self.floating_ips.deallocate(service_id).await;
        if released > 0 {
            info!(
                "Service {}/{}: released {} floating IP(s)",
                namespace, name, released
            );
        }
        self.topology.destroy(service_id).await?;

        if self.link_local.applies_to(name) {
            self.link_local.delete(name, ports).await;
        }
        Ok(())
    }

    /// A loadbalancer recorded under the Service's name with another uuid
    /// belongs to a deleted incarnation of the Service; remove it first.
    async fn check_uuid_change(&self, svc: &ServiceParams) -> Result<()> {
        let fq_name = vec![
            DEFAULT_DOMAIN.to_string(),
            svc.namespace.clone(),
            svc.name.clone(),
        ];
        match self.registry.loadbalancer_for_name(&fq_name) {
            Some(stale) if stale != svc.id => {
                warn!(
                    "Service {}/{} was recreated ({} -> {}), removing stale loadbalancer",
                    svc.namespace, svc.name, stale, svc.id
                );
                self.delete(&stale, &svc.name, &svc.namespace, &svc.ports)
                    .await
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use pkg_state::KvStore;
    use pkg_state::memory::MemoryStore;
    use pkg_types::config::ManagerConfigFile;
    use pkg_vnc::StoreControlPlane;
    use std::sync::Mutex;

    /// Remembers every external-IP patch.
    #[derive(Default)]
    pub struct RecordingPatcher {
        pub patches: Mutex<Vec<(String, String, Vec<String>)>>,
    }

    impl RecordingPatcher {
        pub fn patches(&self) -> Vec<(String, String, Vec<String>)> {
            self.patches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ServicePatcher for RecordingPatcher {
        async fn patch_external_ips(
            &self,
            namespace: &str,
            name: &str,
            external_ips: &[String],
        ) -> Result<()> {
            self.patches.lock().unwrap().push((
                namespace.to_string(),
                name.to_string(),
                external_ips.to_vec(),
            ));
            Ok(())
        }
    }

    pub struct Harness {
        pub store: MemoryStore,
        pub cp: StoreControlPlane,
        pub patcher: Arc<RecordingPatcher>,
        pub reconciler: Arc<ServiceReconciler>,
        config: ReconcilerConfig,
    }

    impl Harness {
        pub async fn new() -> Self {
            Self::with_config(ManagerConfigFile::default()).await
        }

        pub async fn with_link_local() -> Self {
            Self::with_config(ManagerConfigFile {
                api_service_link_local: Some(true),
                kubernetes_api_secure_ip: Some("10.0.0.1".to_string()),
                kubernetes_api_secure_port: Some(6443),
                ..Default::default()
            })
            .await
        }

        pub async fn with_config(file: ManagerConfigFile) -> Self {
            let store = MemoryStore::new();
            let cp = StoreControlPlane::new(Arc::new(store.clone()));
            cp.ensure_project("default").await.unwrap();
            cp.ensure_project("kube-system").await.unwrap();
            cp.ensure_virtual_network("default", "cluster-network")
                .await
                .unwrap();
            let public = cp.ensure_virtual_network("default", "public").await.unwrap();
            cp.ensure_floating_ip_pool(&public, "public-fip-pool", "203.0.113.0/24")
                .await
                .unwrap();

            let config = ReconcilerConfig::from_file(&file);
            let patcher = Arc::new(RecordingPatcher::default());
            let reconciler = Arc::new(ServiceReconciler::new(
                &config,
                Arc::new(cp.clone()),
                Arc::new(Registry::new()),
                patcher.clone(),
            ));
            Self {
                store,
                cp,
                patcher,
                reconciler,
                config,
            }
        }

        /// A second reconciler over the same store, with its registry synced
        /// from the store the way the manager does at startup.
        pub async fn restarted(&self) -> Arc<ServiceReconciler> {
            let registry = Registry::new();
            registry.sync(&self.cp).await.unwrap();
            Arc::new(ServiceReconciler::new(
                &self.config,
                Arc::new(self.cp.clone()),
                Arc::new(registry),
                self.patcher.clone(),
            ))
        }

        pub fn registry(&self) -> &Registry {
            self.reconciler.registry()
        }

        /// Every stored control-plane key and value.
        pub async fn snapshot(&self) -> Vec<(String, Vec<u8>)> {
            self.store.list_prefix("/vnc/").await.unwrap()
        }
    }

    pub fn service(uid: &str, name: &str, service_type: ServiceType) -> ServiceParams {
        ServiceParams {
            id: uid.to_string(),
            name: name.to_string(),
            namespace: "default".to_string(),
            cluster_ip: Some("10.96.0.10".to_string()),
            ports: vec![ServicePort::tcp(80, 8080)],
            service_type: Some(service_type),
            ..Default::default()
        }
    }
}
