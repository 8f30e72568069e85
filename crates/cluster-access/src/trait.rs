//! ClusterAccessProvider trait for mocking

use crate::error::AccessError;
use kube::Config;

/// Resolves `(cluster id, project id)` to a connection for that member cluster
#[async_trait::async_trait]
pub trait ClusterAccessProvider: Send + Sync {
    /// Connection to `cluster_id`, acting within `project_id`.
    ///
    /// Returns [`AccessError::ClusterNotFound`] when the cluster is gone.
    async fn cluster_config(&self, cluster_id: &str, project_id: &str) -> Result<Config, AccessError>;
}
