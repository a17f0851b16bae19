use pkg_types::network::LinkLocalEntry;
use pkg_types::service::ServicePort;
use pkg_vnc::error::NotFoundExt;
use pkg_vnc::{ControlPlane, Result};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::FabricEndpoint;

/// Relays the cluster API Service's ports to the API server's fabric address,
/// so compute nodes can reach it through link-local entries.
pub struct LinkLocalShim {
    cp: Arc<dyn ControlPlane>,
    service_name: String,
    fabric: Option<FabricEndpoint>,
}

fn entry_name(service_name: &str, port: &ServicePort) -> String {
    format!("{}-{}", service_name, port.port)
}

impl LinkLocalShim {
    pub fn new(
        cp: Arc<dyn ControlPlane>,
        service_name: String,
        fabric: Option<FabricEndpoint>,
    ) -> Self {
        Self {
            cp,
            service_name,
            fabric,
        }
    }

    /// Whether `service_name` is the cluster API Service.
    pub fn applies_to(&self, service_name: &str) -> bool {
        service_name == self.service_name
    }

    /// Create one entry per port. Failures are logged per port.
    pub async fn create(&self, service_name: &str, service_ip: Option<&str>, ports: &[ServicePort]) {
        let Some(fabric) = &self.fabric else {
            return;
        };
        if !self.applies_to(service_name) {
            return;
        }
        let Some(service_ip) = service_ip else {
            warn!(
                "Service {} has no cluster IP, skipping link-local services",
                service_name
            );
            return;
        };

        for port in ports {
            let entry = LinkLocalEntry {
                name: entry_name(service_name, port),
                service_ip: service_ip.to_string(),
                service_port: port.port,
                fabric_ip: fabric.ip.clone(),
                fabric_port: fabric.port,
            };
            if let Err(e) = self.ensure_entry(&entry).await {
                error!(
                    "Create link-local service failed for service {} port {}: {}",
                    service_name, port.port, e
                );
            }
        }
    }

    /// Create `entry`, replacing an existing entry of the same name that
    /// relays a different address.
    async fn ensure_entry(&self, entry: &LinkLocalEntry) -> Result<()> {
        match self.cp.create_link_local_service(entry).await {
            Err(e) if e.is_conflict() => {}
            other => return other,
        }
        match self.cp.read_link_local_service(&entry.name).await? {
            Some(existing) if existing == *entry => {
                debug!("Link-local service {} already exists", entry.name);
                Ok(())
            }
            existing => {
                if let Some(stale) = existing {
                    warn!(
                        "Link-local service {} relays {}:{} -> {}:{}, replacing",
                        stale.name,
                        stale.service_ip,
                        stale.service_port,
                        stale.fabric_ip,
                        stale.fabric_port
                    );
                    self.cp
                        .delete_link_local_service(&entry.name)
                        .await
                        .or_absent()?;
                }
                self.cp.create_link_local_service(entry).await
            }
        }
    }

    /// Delete the entry of every port. Failures are logged per port.
    pub async fn delete(&self, service_name: &str, ports: &[ServicePort]) {
        if self.fabric.is_none() || !self.applies_to(service_name) {
            return;
        }
        for port in ports {
            let name = entry_name(service_name, port);
            match self.cp.delete_link_local_service(&name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!("Link-local service {} already gone", name)
                }
                Err(e) => error!(
                    "Delete link-local service failed for service {} port {}: {}",
                    service_name, port.port, e
                ),
            }
        }
    }
}
