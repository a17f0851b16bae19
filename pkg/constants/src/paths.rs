//! Filesystem path constants.

/// Default config file path for the manager.
pub const DEFAULT_MANAGER_CONFIG: &str = "/etc/vnlb/config.yaml";

/// Default data directory for the SlateDB-backed control-plane store.
pub const DEFAULT_DATA_DIR: &str = "/tmp/vnlb-data";
