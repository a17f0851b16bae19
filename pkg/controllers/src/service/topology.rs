use pkg_constants::network::LB_PROVIDER_NATIVE;
use pkg_types::fq_name_string;
use pkg_types::loadbalancer::Listener;
use pkg_types::network::Project;
use pkg_types::service::ServicePort;
use pkg_vnc::error::NotFoundExt;
use pkg_vnc::{ControlPlane, ControlPlaneError, LoadbalancerRequest, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::registry::Registry;

/// Builds and tears down the loadbalancer → listener → pool graph of a
/// Service.
pub struct Topology {
    cp: Arc<dyn ControlPlane>,
    registry: Arc<Registry>,
    cluster_network: Vec<String>,
}

impl Topology {
    pub fn new(
        cp: Arc<dyn ControlPlane>,
        registry: Arc<Registry>,
        cluster_network: Vec<String>,
    ) -> Self {
        Self {
            cp,
            registry,
            cluster_network,
        }
    }

    async fn project(&self, namespace: &str) -> Result<Project> {
        self.cp
            .read_project(namespace)
            .await?
            .ok_or_else(|| ControlPlaneError::not_found("project", namespace))
    }

    /// Make sure a loadbalancer exists for `service_id` with one listener and
    /// one pool per port. Listeners for ports no longer listed are left alone.
    pub async fn ensure(
        &self,
        service_id: &str,
        name: &str,
        namespace: &str,
        cluster_ip: Option<&str>,
        ports: &[ServicePort],
    ) -> Result<()> {
        if !self.registry.loadbalancers.contains(service_id) {
            self.create_loadbalancer(service_id, name, namespace, cluster_ip)
                .await?;
        }

        for port in ports {
            let listener = match self.find_listener(service_id, port) {
                Some(listener) => listener,
                None => {
                    let lb = self
                        .registry
                        .loadbalancers
                        .get(service_id)
                        .ok_or_else(|| ControlPlaneError::not_found("loadbalancer", service_id))?;
                    let project = self.project(namespace).await?;
                    let listener = self.cp.create_listener(&lb, &project, port).await?;
                    info!(
                        "Service {}/{}: created listener {} for {}/{}",
                        namespace, name, listener.uuid, port.protocol, port.port
                    );
                    self.registry.locate_listener(listener)
                }
            };

            // TODO: match an existing pool against the port's targetPort once
            // pools can be shared between listeners.
            let pool_present = listener
                .pool
                .as_deref()
                .is_some_and(|pool_id| self.registry.pools.contains(pool_id));
            if !pool_present {
                let project = self.project(namespace).await?;
                let pool = self.cp.create_pool(&listener, &project, port).await?;
                info!(
                    "Service {}/{}: created pool {} for listener {}",
                    namespace, name, pool.uuid, listener.uuid
                );
                self.registry.locate_pool(pool);
            }
        }
        Ok(())
    }

    async fn create_loadbalancer(
        &self,
        service_id: &str,
        name: &str,
        namespace: &str,
        cluster_ip: Option<&str>,
    ) -> Result<()> {
        let project = self.project(namespace).await?;
        let network = self
            .cp
            .read_virtual_network(&self.cluster_network)
            .await?
            .ok_or_else(|| {
                ControlPlaneError::not_found(
                    "virtual-network",
                    fq_name_string(&self.cluster_network),
                )
            })?;

        let lb = self
            .cp
            .create_loadbalancer(LoadbalancerRequest {
                uuid: service_id.to_string(),
                name: name.to_string(),
                project,
                network,
                provider: LB_PROVIDER_NATIVE.to_string(),
                vip_address: cluster_ip.map(str::to_string),
            })
            .await?;

        for vmi_id in &lb.virtual_machine_interfaces {
            if let Some(vmi) = self.cp.read_virtual_machine_interface(vmi_id).await? {
                self.registry.locate_interface(vmi);
            }
        }
        info!(
            "Service {}/{}: created loadbalancer {}",
            namespace, name, service_id
        );
        self.registry.locate_loadbalancer(lb);
        Ok(())
    }

    /// Listener of the loadbalancer serving exactly `port`'s protocol and port.
    fn find_listener(&self, service_id: &str, port: &ServicePort) -> Option<Listener> {
        let lb = self.registry.loadbalancers.get(service_id)?;
        lb.listeners
            .iter()
            .filter_map(|id| self.registry.listeners.get(id))
            .find(|listener| listener.matches(port))
    }

    /// Remove members, pools, listeners and finally the loadbalancer of
    /// `service_id`. No-op when no loadbalancer is recorded.
    pub async fn destroy(&self, service_id: &str) -> Result<()> {
        let Some(lb) = self.registry.loadbalancers.get(service_id) else {
            debug!("No loadbalancer recorded for {}, nothing to tear down", service_id);
            return Ok(());
        };

        for listener_id in &lb.listeners {
            let Some(listener) = self.registry.listeners.get(listener_id) else {
                continue;
            };
            if let Some(pool_id) = &listener.pool {
                if let Some(pool) = self.registry.pools.get(pool_id) {
                    for member_id in &pool.members {
                        if self.registry.members.contains(member_id) {
                            self.cp.delete_member(member_id).await.or_absent()?;
                            self.registry.delete_member(member_id);
                        }
                    }
                }
                self.cp.delete_pool(pool_id).await.or_absent()?;
                self.registry.delete_pool(pool_id);
            }
            self.cp.delete_listener(listener_id).await.or_absent()?;
            self.registry.delete_listener(listener_id);
        }

        self.cp.delete_loadbalancer(service_id).await.or_absent()?;
        self.registry.delete_loadbalancer(service_id);
        info!(
            "Deleted loadbalancer {} ({})",
            fq_name_string(&lb.fq_name),
            service_id
        );
        Ok(())
    }
}
