//! Cluster access errors

use thiserror::Error;

/// Errors resolving a member cluster connection
#[derive(Debug, Error)]
pub enum AccessError {
    /// The deployment manager does not know the cluster (anymore)
    #[error("cluster {0} not found")]
    ClusterNotFound(String),

    /// Required setting missing at construction
    #[error("{0}")]
    MissingConfig(String),

    /// M2M token could not be obtained
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Deployment-manager RPC failed
    #[error("RPC error ({code:?}): {message}")]
    Rpc { code: tonic::Code, message: String },

    /// Returned or local kubeconfig is unusable
    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    /// Secret store or identity provider request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AccessError {
    /// The cluster no longer exists; teardown against it can be skipped
    pub fn is_cluster_gone(&self) -> bool {
        matches!(self, AccessError::ClusterNotFound(_))
    }
}

impl From<tonic::Status> for AccessError {
    fn from(status: tonic::Status) -> Self {
        AccessError::Rpc {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_not_found_is_cluster_gone() {
        assert!(AccessError::ClusterNotFound("c1".to_string()).is_cluster_gone());
        assert!(!AccessError::from(tonic::Status::unavailable("down")).is_cluster_gone());
        assert!(!AccessError::Auth("token is empty".to_string()).is_cluster_gone());
    }

    #[test]
    fn test_status_conversion_keeps_code() {
        let err = AccessError::from(tonic::Status::permission_denied("nope"));
        assert!(matches!(err, AccessError::Rpc { code: tonic::Code::PermissionDenied, .. }));
    }
}
