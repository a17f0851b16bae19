//! Control plane persisted in a [`KvStore`].
//!
//! Objects are stored as JSON under `/vnc/<kind>/<uuid>`. Every mutation keeps
//! the back-references (loadbalancer→listeners, listener→pool, pool→members,
//! interface→floating IPs) consistent and refuses to delete an object that is
//! still referenced from below.

use async_trait::async_trait;
use chrono::Utc;
use ipnet::IpNet;
use pkg_constants::network::DEFAULT_DOMAIN;
use pkg_constants::state::{
    FIP_POOLS_PREFIX, FLOATING_IPS_PREFIX, FQ_NAME_PREFIX, INTERFACES_PREFIX, LINK_LOCAL_PREFIX,
    LISTENERS_PREFIX, LOADBALANCERS_PREFIX, MEMBERS_PREFIX, NETWORKS_PREFIX, POOLS_PREFIX,
    PROJECTS_PREFIX,
};
use pkg_state::{KvStore, get_json, put_json};
use pkg_types::fq_name_string;
use pkg_types::loadbalancer::{Listener, Loadbalancer, Member, Pool};
use pkg_types::network::{
    FloatingIp, FloatingIpPool, LinkLocalEntry, Project, VirtualMachineInterface, VirtualNetwork,
};
use pkg_types::service::ServicePort;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::{ControlPlane, FloatingIpRequest, LoadbalancerRequest};
use crate::error::{ControlPlaneError, Result};

#[derive(Clone)]
pub struct StoreControlPlane {
    store: Arc<dyn KvStore>,
}

impl StoreControlPlane {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    async fn load<T: DeserializeOwned>(&self, prefix: &str, uuid: &str) -> Result<Option<T>> {
        let key = format!("{}{}", prefix, uuid);
        Ok(get_json(self.store.as_ref(), &key).await?)
    }

    async fn save<T: Serialize + Sync>(&self, prefix: &str, uuid: &str, value: &T) -> Result<()> {
        let key = format!("{}{}", prefix, uuid);
        Ok(put_json(self.store.as_ref(), &key, value).await?)
    }

    async fn remove(&self, prefix: &str, uuid: &str) -> Result<()> {
        let key = format!("{}{}", prefix, uuid);
        Ok(self.store.delete(&key).await?)
    }

    async fn list<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let entries = self.store.list_prefix(prefix).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(_, v)| serde_json::from_slice(&v).ok())
            .collect())
    }

    fn fq_key(kind: &str, fq_name: &[String]) -> String {
        format!("{}{}/{}", FQ_NAME_PREFIX, kind, fq_name_string(fq_name))
    }

    async fn lookup_fq(&self, kind: &str, fq_name: &[String]) -> Result<Option<String>> {
        let value = self.store.get(&Self::fq_key(kind, fq_name)).await?;
        Ok(value.map(|bytes| String::from_utf8_lossy(&bytes).to_string()))
    }

    async fn index_fq(&self, kind: &str, fq_name: &[String], uuid: &str) -> Result<()> {
        Ok(self
            .store
            .put(&Self::fq_key(kind, fq_name), uuid.as_bytes())
            .await?)
    }

    async fn unindex_fq(&self, kind: &str, fq_name: &[String]) -> Result<()> {
        Ok(self.store.delete(&Self::fq_key(kind, fq_name)).await?)
    }

    // ─── Bootstrap ───────────────────────────────────────────────────

    /// Create the project for `namespace` if it does not exist yet.
    pub async fn ensure_project(&self, namespace: &str) -> Result<Project> {
        if let Some(project) = self.read_project(namespace).await? {
            return Ok(project);
        }
        let project = Project {
            uuid: Uuid::new_v4().to_string(),
            fq_name: vec![DEFAULT_DOMAIN.to_string(), namespace.to_string()],
        };
        self.save(PROJECTS_PREFIX, &project.uuid, &project).await?;
        self.index_fq("project", &project.fq_name, &project.uuid)
            .await?;
        info!("Created project {}", fq_name_string(&project.fq_name));
        Ok(project)
    }

    /// Create the virtual network `project:name` if it does not exist yet.
    pub async fn ensure_virtual_network(&self, project: &str, name: &str) -> Result<VirtualNetwork> {
        let fq_name = vec![
            DEFAULT_DOMAIN.to_string(),
            project.to_string(),
            name.to_string(),
        ];
        if let Some(vn) = self.read_virtual_network(&fq_name).await? {
            return Ok(vn);
        }
        let vn = VirtualNetwork {
            uuid: Uuid::new_v4().to_string(),
            fq_name,
        };
        self.save(NETWORKS_PREFIX, &vn.uuid, &vn).await?;
        self.index_fq("network", &vn.fq_name, &vn.uuid).await?;
        info!("Created virtual network {}", fq_name_string(&vn.fq_name));
        Ok(vn)
    }

    /// Create the floating-IP pool `name` on `network` if it does not exist yet.
    pub async fn ensure_floating_ip_pool(
        &self,
        network: &VirtualNetwork,
        name: &str,
        subnet: &str,
    ) -> Result<FloatingIpPool> {
        let mut fq_name = network.fq_name.clone();
        fq_name.push(name.to_string());
        if let Some(pool) = self.read_floating_ip_pool(&fq_name).await? {
            return Ok(pool);
        }
        subnet.parse::<IpNet>().map_err(|e| {
            ControlPlaneError::Fatal(format!("invalid pool subnet {}: {}", subnet, e))
        })?;
        let pool = FloatingIpPool {
            uuid: Uuid::new_v4().to_string(),
            fq_name,
            network_id: network.uuid.clone(),
            subnet: subnet.to_string(),
        };
        self.save(FIP_POOLS_PREFIX, &pool.uuid, &pool).await?;
        self.index_fq("fip-pool", &pool.fq_name, &pool.uuid).await?;
        info!(
            "Created floating-IP pool {} ({})",
            fq_name_string(&pool.fq_name),
            subnet
        );
        Ok(pool)
    }

    /// Attach a backend endpoint to a pool.
    pub async fn create_member(&self, pool_id: &str, address: &str, port: u16) -> Result<Member> {
        let mut pool: Pool = self
            .load(POOLS_PREFIX, pool_id)
            .await?
            .ok_or_else(|| ControlPlaneError::not_found("pool", pool_id))?;
        let member = Member {
            uuid: Uuid::new_v4().to_string(),
            pool_id: pool.uuid.clone(),
            address: address.to_string(),
            port,
            created_at: Utc::now(),
        };
        self.save(MEMBERS_PREFIX, &member.uuid, &member).await?;
        pool.members.push(member.uuid.clone());
        self.save(POOLS_PREFIX, &pool.uuid, &pool).await?;
        Ok(member)
    }

    /// All link-local service entries, ordered by name.
    pub async fn link_local_services(&self) -> Result<Vec<LinkLocalEntry>> {
        self.list(LINK_LOCAL_PREFIX).await
    }
}

#[async_trait]
impl ControlPlane for StoreControlPlane {
    async fn read_project(&self, namespace: &str) -> Result<Option<Project>> {
        let fq_name = vec![DEFAULT_DOMAIN.to_string(), namespace.to_string()];
        match self.lookup_fq("project", &fq_name).await? {
            Some(uuid) => self.load(PROJECTS_PREFIX, &uuid).await,
            None => Ok(None),
        }
    }

    async fn read_virtual_network(&self, fq_name: &[String]) -> Result<Option<VirtualNetwork>> {
        match self.lookup_fq("network", fq_name).await? {
            Some(uuid) => self.load(NETWORKS_PREFIX, &uuid).await,
            None => Ok(None),
        }
    }

    async fn read_floating_ip_pool(&self, fq_name: &[String]) -> Result<Option<FloatingIpPool>> {
        match self.lookup_fq("fip-pool", fq_name).await? {
            Some(uuid) => self.load(FIP_POOLS_PREFIX, &uuid).await,
            None => Ok(None),
        }
    }

    async fn read_virtual_machine_interface(
        &self,
        uuid: &str,
    ) -> Result<Option<VirtualMachineInterface>> {
        self.load(INTERFACES_PREFIX, uuid).await
    }

    async fn read_floating_ip(&self, uuid: &str) -> Result<Option<FloatingIp>> {
        self.load(FLOATING_IPS_PREFIX, uuid).await
    }

    async fn read_loadbalancer(&self, uuid: &str) -> Result<Option<Loadbalancer>> {
        self.load(LOADBALANCERS_PREFIX, uuid).await
    }

    async fn create_loadbalancer(&self, req: LoadbalancerRequest) -> Result<Loadbalancer> {
        if self
            .load::<Loadbalancer>(LOADBALANCERS_PREFIX, &req.uuid)
            .await?
            .is_some()
        {
            return Err(ControlPlaneError::conflict("loadbalancer", req.uuid));
        }
        let mut fq_name = req.project.fq_name.clone();
        fq_name.push(req.name.clone());
        if self.lookup_fq("loadbalancer", &fq_name).await?.is_some() {
            return Err(ControlPlaneError::conflict(
                "loadbalancer",
                fq_name_string(&fq_name),
            ));
        }

        let now = Utc::now();
        let mut vmi_fq_name = req.project.fq_name.clone();
        vmi_fq_name.push(format!("{}-{}", req.name, req.uuid));
        let vmi = VirtualMachineInterface {
            uuid: Uuid::new_v4().to_string(),
            name: format!("{}-vmi", req.name),
            fq_name: vmi_fq_name,
            network_id: req.network.uuid.clone(),
            ip_address: req.vip_address.clone(),
            floating_ips: Vec::new(),
            created_at: now,
        };
        let lb = Loadbalancer {
            uuid: req.uuid,
            name: req.name,
            fq_name,
            project_id: req.project.uuid,
            provider: req.provider,
            vip_address: req.vip_address,
            network_id: req.network.uuid,
            virtual_machine_interfaces: vec![vmi.uuid.clone()],
            listeners: Vec::new(),
            created_at: now,
        };

        self.save(INTERFACES_PREFIX, &vmi.uuid, &vmi).await?;
        self.save(LOADBALANCERS_PREFIX, &lb.uuid, &lb).await?;
        self.index_fq("loadbalancer", &lb.fq_name, &lb.uuid).await?;
        info!(
            "Created loadbalancer {} ({}) with interface {}",
            fq_name_string(&lb.fq_name),
            lb.uuid,
            vmi.uuid
        );
        Ok(lb)
    }

    async fn delete_loadbalancer(&self, uuid: &str) -> Result<()> {
        let lb: Loadbalancer = self
            .load(LOADBALANCERS_PREFIX, uuid)
            .await?
            .ok_or_else(|| ControlPlaneError::not_found("loadbalancer", uuid))?;
        if !lb.listeners.is_empty() {
            return Err(ControlPlaneError::Fatal(format!(
                "loadbalancer {} still has {} listener(s)",
                uuid,
                lb.listeners.len()
            )));
        }
        for vmi_id in &lb.virtual_machine_interfaces {
            if let Some(vmi) = self
                .load::<VirtualMachineInterface>(INTERFACES_PREFIX, vmi_id)
                .await?
                && !vmi.floating_ips.is_empty()
            {
                return Err(ControlPlaneError::Fatal(format!(
                    "interface {} of loadbalancer {} still has floating IPs bound",
                    vmi_id, uuid
                )));
            }
        }
        for vmi_id in &lb.virtual_machine_interfaces {
            self.remove(INTERFACES_PREFIX, vmi_id).await?;
        }
        self.unindex_fq("loadbalancer", &lb.fq_name).await?;
        self.remove(LOADBALANCERS_PREFIX, uuid).await?;
        info!(
            "Deleted loadbalancer {} ({})",
            fq_name_string(&lb.fq_name),
            uuid
        );
        Ok(())
    }

    async fn read_listener(&self, uuid: &str) -> Result<Option<Listener>> {
        self.load(LISTENERS_PREFIX, uuid).await
    }

    async fn create_listener(
        &self,
        lb: &Loadbalancer,
        _project: &Project,
        port: &ServicePort,
    ) -> Result<Listener> {
        let mut lb: Loadbalancer = self
            .load(LOADBALANCERS_PREFIX, &lb.uuid)
            .await?
            .ok_or_else(|| ControlPlaneError::not_found("loadbalancer", lb.uuid.as_str()))?;
        let listener = Listener {
            uuid: Uuid::new_v4().to_string(),
            name: format!("{}-{}-{}", lb.name, port.protocol, port.port),
            loadbalancer_id: lb.uuid.clone(),
            protocol: Some(port.protocol.clone()),
            protocol_port: Some(port.port),
            pool: None,
            created_at: Utc::now(),
        };
        self.save(LISTENERS_PREFIX, &listener.uuid, &listener)
            .await?;
        lb.listeners.push(listener.uuid.clone());
        self.save(LOADBALANCERS_PREFIX, &lb.uuid, &lb).await?;
        debug!("Created listener {} ({})", listener.name, listener.uuid);
        Ok(listener)
    }

    async fn delete_listener(&self, uuid: &str) -> Result<()> {
        let listener: Listener = self
            .load(LISTENERS_PREFIX, uuid)
            .await?
            .ok_or_else(|| ControlPlaneError::not_found("listener", uuid))?;
        if let Some(pool_id) = &listener.pool
            && self.load::<Pool>(POOLS_PREFIX, pool_id).await?.is_some()
        {
            return Err(ControlPlaneError::Fatal(format!(
                "listener {} still references pool {}",
                uuid, pool_id
            )));
        }
        if let Some(mut lb) = self
            .load::<Loadbalancer>(LOADBALANCERS_PREFIX, &listener.loadbalancer_id)
            .await?
        {
            lb.listeners.retain(|id| id != uuid);
            self.save(LOADBALANCERS_PREFIX, &lb.uuid, &lb).await?;
        }
        self.remove(LISTENERS_PREFIX, uuid).await?;
        debug!("Deleted listener {} ({})", listener.name, uuid);
        Ok(())
    }

    async fn read_pool(&self, uuid: &str) -> Result<Option<Pool>> {
        self.load(POOLS_PREFIX, uuid).await
    }

    async fn create_pool(
        &self,
        listener: &Listener,
        _project: &Project,
        port: &ServicePort,
    ) -> Result<Pool> {
        let mut listener: Listener = self
            .load(LISTENERS_PREFIX, &listener.uuid)
            .await?
            .ok_or_else(|| ControlPlaneError::not_found("listener", listener.uuid.as_str()))?;
        let name = format!("{}-pool", listener.name);
        if let Some(existing) = &listener.pool
            && self.load::<Pool>(POOLS_PREFIX, existing).await?.is_some()
        {
            return Err(ControlPlaneError::conflict("pool", name));
        }
        let pool = Pool {
            uuid: Uuid::new_v4().to_string(),
            name,
            listener_id: listener.uuid.clone(),
            protocol: Some(port.protocol.clone()),
            target_port: port.target_port.clone(),
            members: Vec::new(),
            created_at: Utc::now(),
        };
        self.save(POOLS_PREFIX, &pool.uuid, &pool).await?;
        listener.pool = Some(pool.uuid.clone());
        self.save(LISTENERS_PREFIX, &listener.uuid, &listener)
            .await?;
        debug!("Created pool {} ({})", pool.name, pool.uuid);
        Ok(pool)
    }

    async fn delete_pool(&self, uuid: &str) -> Result<()> {
        let pool: Pool = self
            .load(POOLS_PREFIX, uuid)
            .await?
            .ok_or_else(|| ControlPlaneError::not_found("pool", uuid))?;
        if !pool.members.is_empty() {
            return Err(ControlPlaneError::Fatal(format!(
                "pool {} still has {} member(s)",
                uuid,
                pool.members.len()
            )));
        }
        if let Some(mut listener) = self
            .load::<Listener>(LISTENERS_PREFIX, &pool.listener_id)
            .await?
            && listener.pool.as_deref() == Some(uuid)
        {
            listener.pool = None;
            self.save(LISTENERS_PREFIX, &listener.uuid, &listener)
                .await?;
        }
        self.remove(POOLS_PREFIX, uuid).await?;
        debug!("Deleted pool {} ({})", pool.name, uuid);
        Ok(())
    }

    async fn delete_member(&self, uuid: &str) -> Result<()> {
        let member: Member = self
            .load(MEMBERS_PREFIX, uuid)
            .await?
            .ok_or_else(|| ControlPlaneError::not_found("member", uuid))?;
        if let Some(mut pool) = self.load::<Pool>(POOLS_PREFIX, &member.pool_id).await? {
            pool.members.retain(|id| id != uuid);
            self.save(POOLS_PREFIX, &pool.uuid, &pool).await?;
        }
        self.remove(MEMBERS_PREFIX, uuid).await?;
        debug!("Deleted member {}:{} ({})", member.address, member.port, uuid);
        Ok(())
    }

    async fn create_floating_ip(&self, req: FloatingIpRequest) -> Result<FloatingIp> {
        let pool: FloatingIpPool = self
            .load(FIP_POOLS_PREFIX, &req.pool.uuid)
            .await?
            .ok_or_else(|| {
                ControlPlaneError::not_found("floating-ip-pool", fq_name_string(&req.pool.fq_name))
            })?;
        let mut vmi: VirtualMachineInterface = self
            .load(INTERFACES_PREFIX, &req.interface_id)
            .await?
            .ok_or_else(|| {
                ControlPlaneError::not_found("virtual-machine-interface", req.interface_id.as_str())
            })?;
        let subnet: IpNet = pool.subnet.parse().map_err(|e| {
            ControlPlaneError::Fatal(format!(
                "pool {} has invalid subnet {}: {}",
                fq_name_string(&pool.fq_name),
                pool.subnet,
                e
            ))
        })?;

        let used: HashSet<String> = self
            .list::<FloatingIp>(FLOATING_IPS_PREFIX)
            .await?
            .into_iter()
            .filter(|fip| fip.pool_id == pool.uuid)
            .map(|fip| fip.address)
            .collect();

        let address = match &req.address {
            Some(requested) => {
                let ip: IpAddr = requested.parse().map_err(|_| {
                    ControlPlaneError::Fatal(format!("invalid floating IP address {}", requested))
                })?;
                if !subnet.contains(&ip) {
                    return Err(ControlPlaneError::Fatal(format!(
                        "address {} is outside pool subnet {}",
                        ip, subnet
                    )));
                }
                if used.contains(&ip.to_string()) {
                    return Err(ControlPlaneError::conflict("floating-ip", ip.to_string()));
                }
                ip.to_string()
            }
            None => subnet
                .hosts()
                .map(|ip| ip.to_string())
                .find(|ip| !used.contains(ip))
                .ok_or_else(|| {
                    ControlPlaneError::Fatal(format!(
                        "floating-ip-pool {} is exhausted",
                        fq_name_string(&pool.fq_name)
                    ))
                })?,
        };

        let fip = FloatingIp {
            uuid: Uuid::new_v4().to_string(),
            name: req.name,
            address,
            pool_id: pool.uuid.clone(),
            virtual_machine_interfaces: vec![vmi.uuid.clone()],
            project_id: req.project_id,
            created_at: Utc::now(),
        };
        self.save(FLOATING_IPS_PREFIX, &fip.uuid, &fip).await?;
        vmi.floating_ips.push(fip.uuid.clone());
        self.save(INTERFACES_PREFIX, &vmi.uuid, &vmi).await?;
        info!(
            "Bound floating IP {} ({}) to interface {}",
            fip.address, fip.name, vmi.uuid
        );
        Ok(fip)
    }

    async fn delete_floating_ip(&self, uuid: &str) -> Result<()> {
        let fip: FloatingIp = self
            .load(FLOATING_IPS_PREFIX, uuid)
            .await?
            .ok_or_else(|| ControlPlaneError::not_found("floating-ip", uuid))?;
        for vmi_id in &fip.virtual_machine_interfaces {
            if let Some(mut vmi) = self
                .load::<VirtualMachineInterface>(INTERFACES_PREFIX, vmi_id)
                .await?
            {
                vmi.floating_ips.retain(|id| id != uuid);
                self.save(INTERFACES_PREFIX, &vmi.uuid, &vmi).await?;
            }
        }
        self.remove(FLOATING_IPS_PREFIX, uuid).await?;
        info!("Released floating IP {} ({})", fip.address, uuid);
        Ok(())
    }

    async fn read_link_local_service(&self, name: &str) -> Result<Option<LinkLocalEntry>> {
        self.load(LINK_LOCAL_PREFIX, name).await
    }

    async fn create_link_local_service(&self, entry: &LinkLocalEntry) -> Result<()> {
        if self
            .load::<LinkLocalEntry>(LINK_LOCAL_PREFIX, &entry.name)
            .await?
            .is_some()
        {
            return Err(ControlPlaneError::conflict(
                "link-local-service",
                entry.name.as_str(),
            ));
        }
        self.save(LINK_LOCAL_PREFIX, &entry.name, entry).await?;
        info!(
            "Created link-local service {}: {}:{} -> {}:{}",
            entry.name, entry.service_ip, entry.service_port, entry.fabric_ip, entry.fabric_port
        );
        Ok(())
    }

    async fn delete_link_local_service(&self, name: &str) -> Result<()> {
        if self
            .load::<LinkLocalEntry>(LINK_LOCAL_PREFIX, name)
            .await?
            .is_none()
        {
            return Err(ControlPlaneError::not_found("link-local-service", name));
        }
        self.remove(LINK_LOCAL_PREFIX, name).await?;
        info!("Deleted link-local service {}", name);
        Ok(())
    }

    async fn list_loadbalancers(&self) -> Result<Vec<Loadbalancer>> {
        self.list(LOADBALANCERS_PREFIX).await
    }

    async fn list_virtual_machine_interfaces(&self) -> Result<Vec<VirtualMachineInterface>> {
        self.list(INTERFACES_PREFIX).await
    }

    async fn list_listeners(&self) -> Result<Vec<Listener>> {
        self.list(LISTENERS_PREFIX).await
    }

    async fn list_pools(&self) -> Result<Vec<Pool>> {
        self.list(POOLS_PREFIX).await
    }

    async fn list_members(&self) -> Result<Vec<Member>> {
        self.list(MEMBERS_PREFIX).await
    }

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>> {
        self.list(FLOATING_IPS_PREFIX).await
    }
}
