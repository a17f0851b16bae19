use pkg_types::event::{ServiceEvent, WatchEventType};
use std::sync::Arc;
use tracing::{error, info};

use super::{ServiceParams, ServiceReconciler};

/// Routes Service watch events to the reconciler.
pub struct EventDispatcher {
    reconciler: Arc<ServiceReconciler>,
}

impl EventDispatcher {
    pub fn new(reconciler: Arc<ServiceReconciler>) -> Self {
        Self { reconciler }
    }

    /// ADDED and MODIFIED converge the Service, DELETED tears it down.
    /// Reconcile failures are logged; the next event for the Service retries.
    pub async fn process(&self, event: &ServiceEvent) {
        let svc = ServiceParams::from(&event.object);
        info!(
            "Got Service event {} {}/{} ({})",
            event.event_type, svc.namespace, svc.name, svc.id
        );

        let result = match event.event_type {
            WatchEventType::Added | WatchEventType::Modified => self.reconciler.add(&svc).await,
            WatchEventType::Deleted => {
                self.reconciler
                    .delete(&svc.id, &svc.name, &svc.namespace, &svc.ports)
                    .await
            }
        };
        if let Err(e) = result {
            error!(
                "Service {} {}/{} failed: {}",
                event.event_type, svc.namespace, svc.name, e
            );
        }
    }

    /// Parse one JSON watch line and process it.
    pub async fn process_line(&self, line: &str) -> anyhow::Result<()> {
        let event = ServiceEvent::parse(line)?;
        self.process(&event).await;
        Ok(())
    }
}
