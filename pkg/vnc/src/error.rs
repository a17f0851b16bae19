use thiserror::Error;

/// Failure of a remote control-plane call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlPlaneError {
    /// The addressed object does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The create was rejected because the target already exists or is bound.
    #[error("{kind} {name} already exists")]
    Conflict { kind: &'static str, name: String },

    /// Store or transport failure that may succeed on a later attempt.
    #[error("transient control-plane failure: {0}")]
    Transient(String),

    /// Request the control plane will never accept as issued.
    #[error("control-plane request rejected: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, ControlPlaneError>;

impl ControlPlaneError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ControlPlaneError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(kind: &'static str, name: impl Into<String>) -> Self {
        ControlPlaneError::Conflict {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlPlaneError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ControlPlaneError::Conflict { .. })
    }

    /// Whether retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ControlPlaneError::Transient(_))
    }
}

impl From<anyhow::Error> for ControlPlaneError {
    fn from(e: anyhow::Error) -> Self {
        ControlPlaneError::Transient(format!("{:#}", e))
    }
}

/// Collapse NotFound on deletes into success: the object is already gone.
pub trait NotFoundExt {
    fn or_absent(self) -> Result<()>;
}

impl NotFoundExt for Result<()> {
    fn or_absent(self) -> Result<()> {
        match self {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(ControlPlaneError::not_found("pool", "p1").is_not_found());
        assert!(ControlPlaneError::conflict("floating-ip", "1.2.3.4").is_conflict());
        assert!(ControlPlaneError::Transient("timeout".into()).is_retryable());
        assert!(!ControlPlaneError::Fatal("bad".into()).is_retryable());
        assert!(!ControlPlaneError::conflict("floating-ip", "1.2.3.4").is_retryable());
    }

    #[test]
    fn or_absent_swallows_only_not_found() {
        let missing: Result<()> = Err(ControlPlaneError::not_found("listener", "l1"));
        assert!(missing.or_absent().is_ok());
        let in_use: Result<()> = Err(ControlPlaneError::Fatal("in use".into()));
        assert!(in_use.or_absent().is_err());
        let done: Result<()> = Ok(());
        assert!(done.or_absent().is_ok());
    }

    #[test]
    fn store_errors_are_transient() {
        let err: ControlPlaneError = anyhow::anyhow!("disk full").into();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "transient control-plane failure: disk full");
    }
}
