//! Mock ClusterAccessProvider for unit testing
//!
//! Cluster `c1` resolves to `https://c1.cluster.test`, which `van_client`'s mock
//! maps back to `c1`.

use crate::access_trait::ClusterAccessProvider;
use crate::error::AccessError;
use kube::Config;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Mock provider for testing
#[derive(Clone, Default, Debug)]
pub struct MockClusterAccess {
    gone: Arc<Mutex<HashSet<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

/// URL a mock cluster resolves to
pub fn mock_cluster_url(cluster_id: &str) -> String {
    format!("https://{}.cluster.test", cluster_id)
}

impl MockClusterAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `cluster_id` resolve to [`AccessError::ClusterNotFound`]
    pub fn remove_cluster(&self, cluster_id: &str) {
        self.gone.lock().unwrap().insert(cluster_id.to_string());
    }

    /// Make `cluster_id` fail with a transient RPC error until cleared
    pub fn set_unavailable(&self, cluster_id: &str, unavailable: bool) {
        let mut failing = self.failing.lock().unwrap();
        if unavailable {
            failing.insert(cluster_id.to_string());
        } else {
            failing.remove(cluster_id);
        }
    }

    /// `(cluster id, project id)` of every lookup
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ClusterAccessProvider for MockClusterAccess {
    async fn cluster_config(&self, cluster_id: &str, project_id: &str) -> Result<Config, AccessError> {
        self.calls
            .lock()
            .unwrap()
            .push((cluster_id.to_string(), project_id.to_string()));
        if self.gone.lock().unwrap().contains(cluster_id) {
            return Err(AccessError::ClusterNotFound(cluster_id.to_string()));
        }
        if self.failing.lock().unwrap().contains(cluster_id) {
            return Err(tonic::Status::unavailable("mock cluster unavailable").into());
        }
        let url = mock_cluster_url(cluster_id)
            .parse()
            .map_err(|e| AccessError::Kubeconfig(format!("invalid cluster id {}: {}", cluster_id, e)))?;
        Ok(Config::new(url))
    }
}
