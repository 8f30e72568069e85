//! VAN adapter errors
//!
//! The adapter is the only place that interprets data-plane failure signals.
//! Reconcilers inspect failures through the `is_*` predicates.

use thiserror::Error;

/// Errors surfaced by data-plane operations
#[derive(Debug, Error)]
pub enum VanError {
    /// No VAN site is installed in the namespace
    #[error("VAN is not installed in namespace '{0}'")]
    NotInstalled(String),

    /// Object already exists (after the adapter's own retry, if any)
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Cluster policy rejected the request
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// Neither side holds the named link
    #[error("No such link \"{0}\"")]
    NoSuchLink(String),

    /// No service interface is defined for the address
    #[error("no service interfaces defined: {0}")]
    NoInterfaces(String),

    /// Request rejected before reaching the cluster
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Issuer has no routable claims endpoint yet
    #[error("claims endpoint not ready: {0}")]
    ClaimsEndpointNotReady(String),

    /// Kubernetes API failure
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Malformed data-plane record
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VanError {
    /// Site (or a resource it owns) is absent
    pub fn is_not_installed(&self) -> bool {
        matches!(self, VanError::NotInstalled(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, VanError::AlreadyExists(_))
    }

    pub fn is_no_such_link(&self) -> bool {
        matches!(self, VanError::NoSuchLink(_))
    }

    pub fn is_no_interfaces(&self) -> bool {
        matches!(self, VanError::NoInterfaces(_))
    }

    pub fn is_policy_denied(&self) -> bool {
        matches!(self, VanError::PolicyDenied(_))
    }
}

/// True when `err` is an API status error with `code`
pub(crate) fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == code)
}
