use serde::{Deserialize, Serialize};

use crate::service::Service;

/// Type of change carried by a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for WatchEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchEventType::Added => write!(f, "ADDED"),
            WatchEventType::Modified => write!(f, "MODIFIED"),
            WatchEventType::Deleted => write!(f, "DELETED"),
        }
    }
}

/// A single Service watch event, in the Kubernetes watch JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEvent {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    pub object: Service,
}

impl ServiceEvent {
    pub fn parse(line: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}
