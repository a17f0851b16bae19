//! Network control-plane collaborators: the object API the reconciler drives
//! and the cluster API used to publish Service external IPs.

pub mod api;
pub mod error;
pub mod patch;
pub mod store;

pub use api::{ControlPlane, FloatingIpRequest, LoadbalancerRequest};
pub use error::{ControlPlaneError, Result};
pub use patch::ServicePatcher;
pub use store::StoreControlPlane;
