//! Local shadow records of control-plane objects.
//!
//! Each kind lives in its own [`ObjectCache`] keyed by uuid. `locate_*` is an
//! idempotent create-or-fetch: an existing record wins, a new one is inserted
//! and linked into its parent's child list. `delete_*` unlinks it again.
//! [`Registry::sync`] fills the caches from the control plane at startup.

use dashmap::DashMap;
use pkg_types::fq_name_string;
use pkg_types::loadbalancer::{Listener, Loadbalancer, Member, Pool};
use pkg_types::network::{FloatingIp, VirtualMachineInterface};
use pkg_vnc::{ControlPlane, Result};
use tracing::info;

/// Concurrent map of shadow records of one kind.
#[derive(Debug)]
pub struct ObjectCache<T: Clone> {
    objects: DashMap<String, T>,
}

impl<T: Clone> Default for ObjectCache<T> {
    fn default() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }
}

impl<T: Clone> ObjectCache<T> {
    /// Snapshot of the record for `id`.
    pub fn get(&self, id: &str) -> Option<T> {
        self.objects.get(id).map(|e| e.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    /// Insert `value` unless a record already exists; return the stored record.
    fn insert_if_absent(&self, id: &str, value: T) -> T {
        self.objects
            .entry(id.to_string())
            .or_insert(value)
            .value()
            .clone()
    }

    /// Apply `f` to the record for `id`. Returns `false` if it is not tracked.
    fn update(&self, id: &str, f: impl FnOnce(&mut T)) -> bool {
        match self.objects.get_mut(id) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    fn remove(&self, id: &str) -> Option<T> {
        self.objects.remove(id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Shadow records for every object kind the reconciler reads.
#[derive(Debug, Default)]
pub struct Registry {
    pub loadbalancers: ObjectCache<Loadbalancer>,
    pub listeners: ObjectCache<Listener>,
    pub pools: ObjectCache<Pool>,
    pub members: ObjectCache<Member>,
    pub interfaces: ObjectCache<VirtualMachineInterface>,
    pub floating_ips: ObjectCache<FloatingIp>,
    /// fq-name string → loadbalancer uuid
    loadbalancer_names: DashMap<String, String>,
}

fn link(children: &mut Vec<String>, id: &str) {
    if !children.iter().any(|c| c == id) {
        children.push(id.to_string());
    }
}

fn unlink(children: &mut Vec<String>, id: &str) {
    children.retain(|c| c != id);
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every object the control plane already holds, parents first.
    /// Returns the number of objects recorded.
    pub async fn sync(&self, cp: &dyn ControlPlane) -> Result<usize> {
        let loadbalancers = cp.list_loadbalancers().await?;
        let interfaces = cp.list_virtual_machine_interfaces().await?;
        let listeners = cp.list_listeners().await?;
        let pools = cp.list_pools().await?;
        let members = cp.list_members().await?;
        let floating_ips = cp.list_floating_ips().await?;

        let total = loadbalancers.len()
            + interfaces.len()
            + listeners.len()
            + pools.len()
            + members.len()
            + floating_ips.len();

        for lb in loadbalancers {
            self.locate_loadbalancer(lb);
        }
        for vmi in interfaces {
            self.locate_interface(vmi);
        }
        for listener in listeners {
            self.locate_listener(listener);
        }
        for pool in pools {
            self.locate_pool(pool);
        }
        for member in members {
            self.locate_member(member);
        }
        for fip in floating_ips {
            self.locate_floating_ip(fip);
        }

        info!(
            "Registry synced: {} loadbalancer(s), {} object(s) total",
            self.loadbalancers.len(),
            total
        );
        Ok(total)
    }

    /// Uuid of the loadbalancer recorded under `fq_name`, if any.
    pub fn loadbalancer_for_name(&self, fq_name: &[String]) -> Option<String> {
        self.loadbalancer_names
            .get(&fq_name_string(fq_name))
            .map(|e| e.value().clone())
    }

    pub fn locate_loadbalancer(&self, lb: Loadbalancer) -> Loadbalancer {
        let id = lb.uuid.clone();
        let located = self.loadbalancers.insert_if_absent(&id, lb);
        self.loadbalancer_names
            .insert(fq_name_string(&located.fq_name), id);
        located
    }

    /// Drop a loadbalancer together with its interface records.
    pub fn delete_loadbalancer(&self, id: &str) -> Option<Loadbalancer> {
        let lb = self.loadbalancers.remove(id)?;
        self.loadbalancer_names
            .remove_if(&fq_name_string(&lb.fq_name), |_, uuid| uuid == id);
        for vmi_id in &lb.virtual_machine_interfaces {
            self.interfaces.remove(vmi_id);
        }
        Some(lb)
    }

    pub fn locate_listener(&self, listener: Listener) -> Listener {
        let located = self
            .listeners
            .insert_if_absent(&listener.uuid.clone(), listener);
        self.loadbalancers
            .update(&located.loadbalancer_id, |lb| {
                link(&mut lb.listeners, &located.uuid)
            });
        located
    }

    pub fn delete_listener(&self, id: &str) -> Option<Listener> {
        let listener = self.listeners.remove(id)?;
        self.loadbalancers
            .update(&listener.loadbalancer_id, |lb| unlink(&mut lb.listeners, id));
        Some(listener)
    }

    /// Record a pool and make it the pool of its listener, replacing a
    /// dangling reference.
    pub fn locate_pool(&self, pool: Pool) -> Pool {
        let located = self.pools.insert_if_absent(&pool.uuid.clone(), pool);
        self.listeners.update(&located.listener_id, |l| {
            l.pool = Some(located.uuid.clone())
        });
        located
    }

    pub fn delete_pool(&self, id: &str) -> Option<Pool> {
        let pool = self.pools.remove(id)?;
        self.listeners.update(&pool.listener_id, |l| {
            if l.pool.as_deref() == Some(id) {
                l.pool = None;
            }
        });
        Some(pool)
    }

    pub fn locate_member(&self, member: Member) -> Member {
        let located = self.members.insert_if_absent(&member.uuid.clone(), member);
        self.pools
            .update(&located.pool_id, |p| link(&mut p.members, &located.uuid));
        located
    }

    pub fn delete_member(&self, id: &str) -> Option<Member> {
        let member = self.members.remove(id)?;
        self.pools
            .update(&member.pool_id, |p| unlink(&mut p.members, id));
        Some(member)
    }

    pub fn locate_interface(&self, vmi: VirtualMachineInterface) -> VirtualMachineInterface {
        self.interfaces.insert_if_absent(&vmi.uuid.clone(), vmi)
    }

    pub fn locate_floating_ip(&self, fip: FloatingIp) -> FloatingIp {
        let located = self.floating_ips.insert_if_absent(&fip.uuid.clone(), fip);
        for vmi_id in &located.virtual_machine_interfaces {
            self.interfaces
                .update(vmi_id, |vmi| link(&mut vmi.floating_ips, &located.uuid));
        }
        located
    }

    pub fn delete_floating_ip(&self, id: &str) -> Option<FloatingIp> {
        let fip = self.floating_ips.remove(id)?;
        for vmi_id in &fip.virtual_machine_interfaces {
            self.interfaces
                .update(vmi_id, |vmi| unlink(&mut vmi.floating_ips, id));
        }
        Some(fip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn lb(uuid: &str, name: &str) -> Loadbalancer {
        Loadbalancer {
            uuid: uuid.to_string(),
            name: name.to_string(),
            fq_name: vec![
                "default-domain".to_string(),
                "default".to_string(),
                name.to_string(),
            ],
            project_id: "p1".to_string(),
            provider: "native".to_string(),
            vip_address: None,
            network_id: "n1".to_string(),
            virtual_machine_interfaces: vec!["vmi-1".to_string()],
            listeners: vec![],
            created_at: Utc::now(),
        }
    }

    fn listener(uuid: &str, lb_id: &str) -> Listener {
        Listener {
            uuid: uuid.to_string(),
            name: format!("{}-listener", uuid),
            loadbalancer_id: lb_id.to_string(),
            protocol: Some("TCP".to_string()),
            protocol_port: Some(80),
            pool: None,
            created_at: Utc::now(),
        }
    }

    fn pool(uuid: &str, listener_id: &str) -> Pool {
        Pool {
            uuid: uuid.to_string(),
            name: format!("{}-pool", uuid),
            listener_id: listener_id.to_string(),
            protocol: Some("TCP".to_string()),
            target_port: None,
            members: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn locate_is_create_or_fetch() {
        let reg = Registry::new();
        reg.locate_loadbalancer(lb("A", "web"));
        let mut renamed = lb("A", "web");
        renamed.vip_address = Some("10.0.0.9".to_string());
        let located = reg.locate_loadbalancer(renamed);
        // The existing record wins.
        assert!(located.vip_address.is_none());
        assert_eq!(reg.loadbalancers.len(), 1);
    }

    #[test]
    fn name_index_tracks_loadbalancers() {
        let reg = Registry::new();
        let fq = lb("A", "web").fq_name;
        assert!(reg.loadbalancer_for_name(&fq).is_none());

        reg.locate_loadbalancer(lb("A", "web"));
        assert_eq!(reg.loadbalancer_for_name(&fq).as_deref(), Some("A"));

        reg.delete_loadbalancer("A");
        assert!(reg.loadbalancer_for_name(&fq).is_none());
        assert!(reg.delete_loadbalancer("A").is_none());
    }

    #[test]
    fn deleting_stale_loadbalancer_keeps_newer_name_entry() {
        let reg = Registry::new();
        reg.locate_loadbalancer(lb("A", "web"));
        reg.locate_loadbalancer(lb("B", "web"));
        reg.delete_loadbalancer("A");
        let fq = lb("B", "web").fq_name;
        assert_eq!(reg.loadbalancer_for_name(&fq).as_deref(), Some("B"));
    }

    #[test]
    fn children_link_into_parents() {
        let reg = Registry::new();
        reg.locate_loadbalancer(lb("A", "web"));
        reg.locate_listener(listener("L1", "A"));
        reg.locate_listener(listener("L1", "A"));
        reg.locate_pool(pool("P1", "L1"));

        assert_eq!(reg.loadbalancers.get("A").unwrap().listeners, vec!["L1"]);
        assert_eq!(reg.listeners.get("L1").unwrap().pool.as_deref(), Some("P1"));

        reg.delete_pool("P1");
        assert!(reg.listeners.get("L1").unwrap().pool.is_none());
        reg.delete_listener("L1");
        assert!(reg.loadbalancers.get("A").unwrap().listeners.is_empty());
    }

    #[test]
    fn floating_ips_link_into_interfaces() {
        let reg = Registry::new();
        reg.locate_interface(VirtualMachineInterface {
            uuid: "vmi-1".to_string(),
            name: "web-vmi".to_string(),
            fq_name: vec![],
            network_id: "n1".to_string(),
            ip_address: None,
            floating_ips: vec![],
            created_at: Utc::now(),
        });
        reg.locate_floating_ip(FloatingIp {
            uuid: "F1".to_string(),
            name: "web-externalIP".to_string(),
            address: "203.0.113.5".to_string(),
            pool_id: "fp".to_string(),
            virtual_machine_interfaces: vec!["vmi-1".to_string()],
            project_id: "p1".to_string(),
            created_at: Utc::now(),
        });
        assert_eq!(reg.interfaces.get("vmi-1").unwrap().floating_ips, vec!["F1"]);
        reg.delete_floating_ip("F1");
        assert!(reg.interfaces.get("vmi-1").unwrap().floating_ips.is_empty());
    }

    #[tokio::test]
    async fn sync_rebuilds_records_and_name_index() {
        use pkg_state::memory::MemoryStore;
        use pkg_types::service::ServicePort;
        use pkg_vnc::{LoadbalancerRequest, StoreControlPlane};
        use std::sync::Arc;

        let cp = StoreControlPlane::new(Arc::new(MemoryStore::new()));
        let project = cp.ensure_project("default").await.unwrap();
        let network = cp
            .ensure_virtual_network("default", "cluster-network")
            .await
            .unwrap();
        let lb = cp
            .create_loadbalancer(LoadbalancerRequest {
                uuid: "A".to_string(),
                name: "web".to_string(),
                project: project.clone(),
                network,
                provider: "native".to_string(),
                vip_address: Some("10.96.0.10".to_string()),
            })
            .await
            .unwrap();
        let listener = cp
            .create_listener(&lb, &project, &ServicePort::tcp(80, 8080))
            .await
            .unwrap();
        let pool = cp
            .create_pool(&listener, &project, &ServicePort::tcp(80, 8080))
            .await
            .unwrap();
        let member = cp.create_member(&pool.uuid, "10.244.0.5", 8080).await.unwrap();

        let reg = Registry::new();
        // lb + interface + listener + pool + member
        assert_eq!(reg.sync(&cp).await.unwrap(), 5);

        let fq = lb.fq_name.clone();
        assert_eq!(reg.loadbalancer_for_name(&fq).as_deref(), Some("A"));
        assert_eq!(reg.loadbalancers.get("A").unwrap().listeners, vec![listener.uuid.clone()]);
        assert_eq!(
            reg.listeners.get(&listener.uuid).unwrap().pool.as_deref(),
            Some(pool.uuid.as_str())
        );
        assert_eq!(reg.pools.get(&pool.uuid).unwrap().members, vec![member.uuid]);
        assert!(reg.interfaces.contains(&lb.virtual_machine_interfaces[0]));

        // A second sync changes nothing.
        reg.sync(&cp).await.unwrap();
        assert_eq!(reg.loadbalancers.get("A").unwrap().listeners.len(), 1);
        assert_eq!(reg.loadbalancers.len(), 1);
    }
}
