//! Floating-IP policy for Service external addresses.
//!
//! [`decide`] maps the Service type and the current/declared addresses to a
//! [`FipAction`]; [`FloatingIpManager`] carries it out against the
//! loadbalancer's primary interface and publishes the result on the Service.

use pkg_constants::network::FIP_NAME_SUFFIX;
use pkg_types::fq_name_string;
use pkg_types::network::{FloatingIpPool, VirtualMachineInterface};
use pkg_types::service::ServiceType;
use pkg_vnc::error::NotFoundExt;
use pkg_vnc::{ControlPlane, ControlPlaneError, FloatingIpRequest, ServicePatcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::registry::Registry;
use crate::service::ServiceParams;

/// What to do about a Service's floating IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FipAction {
    None,
    /// Bind a new address (`None` = any free one). With `publish`, write the
    /// result to the Service if it differs from the declared external IP.
    Allocate {
        address: Option<String>,
        publish: bool,
    },
    /// Write this address to the Service's external IPs.
    Publish(String),
    /// Release every address bound to the primary interface.
    Deallocate,
    /// Release, bind `address`, and write it to the Service.
    Replace(String),
}

/// Pure decision over (service type, allocated, declared external IP,
/// declared loadbalancer IP). An untyped Service gets no action.
pub fn decide(
    service_type: Option<&ServiceType>,
    allocated: Option<&str>,
    declared_external: Option<&str>,
    declared_lb: Option<&str>,
) -> FipAction {
    match service_type {
        Some(ServiceType::LoadBalancer) => match (allocated, declared_lb) {
            (None, Some(lb_ip)) => FipAction::Allocate {
                address: Some(lb_ip.to_string()),
                publish: true,
            },
            (None, None) => FipAction::Allocate {
                address: None,
                publish: true,
            },
            (Some(current), None) if declared_external != Some(current) => {
                FipAction::Publish(current.to_string())
            }
            (Some(current), Some(lb_ip)) if current == lb_ip && declared_external.is_none() => {
                FipAction::Publish(current.to_string())
            }
            _ => FipAction::None,
        },
        Some(ServiceType::ClusterIP) => match (allocated, declared_external) {
            (Some(_), None) => FipAction::Deallocate,
            (None, None) => FipAction::None,
            (Some(current), Some(external)) if current != external => {
                FipAction::Replace(external.to_string())
            }
            (None, Some(external)) => FipAction::Allocate {
                address: Some(external.to_string()),
                publish: false,
            },
            (Some(_), Some(_)) => FipAction::None,
        },
        _ => FipAction::None,
    }
}

/// Result of one allocation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    Allocated(String),
    /// Nothing to bind to: no loadbalancer, interface or pool.
    Unavailable(&'static str),
    Failed(ControlPlaneError),
}

impl Allocation {
    pub fn address(&self) -> Option<&str> {
        match self {
            Allocation::Allocated(address) => Some(address),
            _ => None,
        }
    }
}

/// Public floating-IP pool lookup, cached for `ttl`.
pub struct FipPoolCache {
    fq_name: Vec<String>,
    ttl: Duration,
    entry: Mutex<Option<(FloatingIpPool, Instant)>>,
}

impl FipPoolCache {
    pub fn new(fq_name: Vec<String>, ttl: Duration) -> Self {
        Self {
            fq_name,
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn fq_name(&self) -> &[String] {
        &self.fq_name
    }

    pub async fn get(
        &self,
        cp: &dyn ControlPlane,
    ) -> Result<Option<FloatingIpPool>, ControlPlaneError> {
        let mut entry = self.entry.lock().await;
        if let Some((pool, fetched_at)) = &*entry
            && fetched_at.elapsed() < self.ttl
        {
            return Ok(Some(pool.clone()));
        }
        let pool = cp.read_floating_ip_pool(&self.fq_name).await?;
        *entry = pool.clone().map(|p| (p, Instant::now()));
        Ok(pool)
    }

    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }
}

pub struct FloatingIpManager {
    cp: Arc<dyn ControlPlane>,
    registry: Arc<Registry>,
    patcher: Arc<dyn ServicePatcher>,
    pool_cache: FipPoolCache,
}

impl FloatingIpManager {
    pub fn new(
        cp: Arc<dyn ControlPlane>,
        registry: Arc<Registry>,
        patcher: Arc<dyn ServicePatcher>,
        pool_cache: FipPoolCache,
    ) -> Self {
        Self {
            cp,
            registry,
            patcher,
            pool_cache,
        }
    }

    /// First recorded interface of the Service's loadbalancer.
    fn primary_interface(&self, service_id: &str) -> Option<VirtualMachineInterface> {
        let lb = self.registry.loadbalancers.get(service_id)?;
        lb.virtual_machine_interfaces
            .iter()
            .find_map(|id| self.registry.interfaces.get(id))
    }

    /// Address currently bound to the primary interface. The first recorded
    /// floating IP wins when there are several.
    pub fn current(&self, service_id: &str) -> Option<String> {
        let vmi = self.primary_interface(service_id)?;
        vmi.floating_ips
            .iter()
            .find_map(|id| self.registry.floating_ips.get(id))
            .map(|fip| fip.address)
    }

    /// Bind a floating IP from the public pool to the primary interface.
    pub async fn allocate(&self, service_id: &str, address: Option<&str>) -> Allocation {
        let Some(lb) = self.registry.loadbalancers.get(service_id) else {
            return Allocation::Unavailable("no loadbalancer");
        };
        let Some(vmi) = self.primary_interface(service_id) else {
            return Allocation::Unavailable("no interface");
        };
        match self.cp.read_virtual_machine_interface(&vmi.uuid).await {
            Ok(Some(_)) => {}
            Ok(None) => return Allocation::Unavailable("no interface"),
            Err(e) => return Allocation::Failed(e),
        }
        let pool = match self.pool_cache.get(self.cp.as_ref()).await {
            Ok(Some(pool)) => pool,
            Ok(None) => {
                warn!(
                    "Public floating-IP pool {} doesn't exist",
                    fq_name_string(self.pool_cache.fq_name())
                );
                return Allocation::Unavailable("no public pool");
            }
            Err(e) => return Allocation::Failed(e),
        };

        let req = FloatingIpRequest {
            name: format!("{}{}", lb.name, FIP_NAME_SUFFIX),
            pool,
            interface_id: vmi.uuid.clone(),
            project_id: lb.project_id.clone(),
            address: address.map(str::to_string),
        };
        match self.cp.create_floating_ip(req).await {
            Ok(fip) => {
                let fip = self.registry.locate_floating_ip(fip);
                Allocation::Allocated(fip.address)
            }
            Err(e) => {
                if e.is_conflict() {
                    error!(
                        "Floating IP {} for loadbalancer {} is already bound: {}",
                        address.unwrap_or("<any>"),
                        service_id,
                        e
                    );
                } else {
                    error!(
                        "Floating IP allocation for loadbalancer {} failed: {}",
                        service_id, e
                    );
                }
                if matches!(&e, ControlPlaneError::NotFound { kind, .. } if *kind == "floating-ip-pool")
                {
                    self.pool_cache.invalidate().await;
                }
                Allocation::Failed(e)
            }
        }
    }

    /// Release every floating IP bound to the primary interface. Returns how
    /// many were released; failures are logged and skipped.
    pub async fn deallocate(&self, service_id: &str) -> usize {
        let Some(vmi) = self.primary_interface(service_id) else {
            return 0;
        };
        let mut released = 0;
        for fip_id in &vmi.floating_ips {
            match self.cp.delete_floating_ip(fip_id).await.or_absent() {
                Ok(()) => {
                    self.registry.delete_floating_ip(fip_id);
                    released += 1;
                }
                Err(e) => error!(
                    "Failed to release floating IP {} of loadbalancer {}: {}",
                    fip_id, service_id, e
                ),
            }
        }
        released
    }

    /// Set the Service's external IPs to `[address]`.
    async fn publish(&self, namespace: &str, name: &str, address: &str) {
        match self
            .patcher
            .patch_external_ips(namespace, name, &[address.to_string()])
            .await
        {
            Ok(()) => info!(
                "Service {}/{}: externalIPs set to [{}]",
                namespace, name, address
            ),
            Err(e) => error!(
                "Service {}/{}: failed to set externalIPs to [{}]: {}",
                namespace, name, address, e
            ),
        }
    }

    /// Evaluate the policy for `svc` and carry out the resulting action.
    pub async fn reconcile(&self, svc: &ServiceParams) -> FipAction {
        let allocated = self.current(&svc.id);
        let action = decide(
            svc.service_type.as_ref(),
            allocated.as_deref(),
            svc.external_ip.as_deref(),
            svc.load_balancer_ip.as_deref(),
        );
        debug!(
            "Service {}/{}: floating IP {:?} -> {:?}",
            svc.namespace, svc.name, allocated, action
        );

        match &action {
            FipAction::None => {}
            FipAction::Allocate { address, publish } => {
                let outcome = self.allocate(&svc.id, address.as_deref()).await;
                if *publish {
                    match outcome.address() {
                        Some(bound) if svc.external_ip.as_deref() != Some(bound) => {
                            self.publish(&svc.namespace, &svc.name, bound).await
                        }
                        Some(_) => {}
                        None => warn!(
                            "Service {}/{}: no floating IP allocated ({:?}), externalIPs left unchanged",
                            svc.namespace, svc.name, outcome
                        ),
                    }
                }
            }
            FipAction::Publish(address) => {
                self.publish(&svc.namespace, &svc.name, address).await
            }
            FipAction::Deallocate => {
                self.deallocate(&svc.id).await;
            }
            FipAction::Replace(address) => {
                self.deallocate(&svc.id).await;
                let outcome = self.allocate(&svc.id, Some(address.as_str())).await;
                match outcome.address() {
                    Some(bound) => self.publish(&svc.namespace, &svc.name, bound).await,
                    None => warn!(
                        "Service {}/{}: floating IP {} not bound ({:?}), externalIPs left unchanged",
                        svc.namespace, svc.name, address, outcome
                    ),
                }
            }
        }
        action
    }
}
