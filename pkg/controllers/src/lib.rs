pub mod config;
pub mod registry;
pub mod service;

pub use config::{FabricEndpoint, ReconcilerConfig};
pub use registry::Registry;
pub use service::dispatch::EventDispatcher;
pub use service::{ServiceParams, ServiceReconciler};
