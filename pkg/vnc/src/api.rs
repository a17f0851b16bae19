use async_trait::async_trait;
use pkg_types::loadbalancer::{Listener, Loadbalancer, Member, Pool};
use pkg_types::network::{
    FloatingIp, FloatingIpPool, LinkLocalEntry, Project, VirtualMachineInterface, VirtualNetwork,
};
use pkg_types::service::ServicePort;

use crate::error::Result;

/// Parameters for creating a service load balancer.
#[derive(Debug, Clone)]
pub struct LoadbalancerRequest {
    /// Uuid to create the load balancer under (the Service uid).
    pub uuid: String,
    pub name: String,
    pub project: Project,
    pub network: VirtualNetwork,
    pub provider: String,
    pub vip_address: Option<String>,
}

/// Parameters for binding a floating IP to an interface.
#[derive(Debug, Clone)]
pub struct FloatingIpRequest {
    pub name: String,
    pub pool: FloatingIpPool,
    pub interface_id: String,
    pub project_id: String,
    /// Pin a specific address instead of taking any free one.
    pub address: Option<String>,
}

/// Remote create/read/delete operations per control-plane object kind.
///
/// Reads answer `Ok(None)` for objects that do not exist; deletes of missing
/// objects answer `NotFound`.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn read_project(&self, namespace: &str) -> Result<Option<Project>>;

    async fn read_virtual_network(&self, fq_name: &[String]) -> Result<Option<VirtualNetwork>>;

    async fn read_floating_ip_pool(&self, fq_name: &[String]) -> Result<Option<FloatingIpPool>>;

    async fn read_virtual_machine_interface(
        &self,
        uuid: &str,
    ) -> Result<Option<VirtualMachineInterface>>;

    async fn read_floating_ip(&self, uuid: &str) -> Result<Option<FloatingIp>>;

    async fn read_loadbalancer(&self, uuid: &str) -> Result<Option<Loadbalancer>>;

    /// Create a load balancer together with its primary interface.
    async fn create_loadbalancer(&self, req: LoadbalancerRequest) -> Result<Loadbalancer>;

    async fn delete_loadbalancer(&self, uuid: &str) -> Result<()>;

    async fn read_listener(&self, uuid: &str) -> Result<Option<Listener>>;

    async fn create_listener(
        &self,
        lb: &Loadbalancer,
        project: &Project,
        port: &ServicePort,
    ) -> Result<Listener>;

    async fn delete_listener(&self, uuid: &str) -> Result<()>;

    async fn read_pool(&self, uuid: &str) -> Result<Option<Pool>>;

    async fn create_pool(
        &self,
        listener: &Listener,
        project: &Project,
        port: &ServicePort,
    ) -> Result<Pool>;

    async fn delete_pool(&self, uuid: &str) -> Result<()>;

    async fn delete_member(&self, uuid: &str) -> Result<()>;

    async fn create_floating_ip(&self, req: FloatingIpRequest) -> Result<FloatingIp>;

    async fn delete_floating_ip(&self, uuid: &str) -> Result<()>;

    async fn read_link_local_service(&self, name: &str) -> Result<Option<LinkLocalEntry>>;

    /// Fails with `Conflict` when an entry of that name exists.
    async fn create_link_local_service(&self, entry: &LinkLocalEntry) -> Result<()>;

    async fn delete_link_local_service(&self, name: &str) -> Result<()>;

    // Listings used to rebuild local records at startup.

    async fn list_loadbalancers(&self) -> Result<Vec<Loadbalancer>>;

    async fn list_virtual_machine_interfaces(&self) -> Result<Vec<VirtualMachineInterface>>;

    async fn list_listeners(&self) -> Result<Vec<Listener>>;

    async fn list_pools(&self) -> Result<Vec<Pool>>;

    async fn list_members(&self) -> Result<Vec<Member>>;

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>>;
}
