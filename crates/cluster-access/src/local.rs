//! Local cluster access
//!
//! Every cluster id resolves to the controller's own cluster. Used in dev mode
//! where all "member clusters" are the local one.

use crate::access_trait::ClusterAccessProvider;
use crate::error::AccessError;
use kube::Config;
use tracing::debug;

/// Provider returning the ambient (in-cluster or kubeconfig) connection
#[derive(Clone)]
pub struct LocalClusterAccess {
    config: Config,
}

impl std::fmt::Debug for LocalClusterAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalClusterAccess")
            .field("cluster_url", &self.config.cluster_url)
            .finish()
    }
}

impl LocalClusterAccess {
    /// Infer the ambient connection once
    pub async fn new() -> Result<Self, AccessError> {
        let config = Config::infer()
            .await
            .map_err(|e| AccessError::Kubeconfig(e.to_string()))?;
        Ok(Self { config })
    }

    /// Provider over an explicit connection
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl ClusterAccessProvider for LocalClusterAccess {
    async fn cluster_config(&self, cluster_id: &str, _project_id: &str) -> Result<Config, AccessError> {
        debug!("Resolving cluster {} to the local cluster", cluster_id);
        Ok(self.config.clone())
    }
}
