//! Deployment manager resources consumed by the topology reconcilers
//!
//! Only the fields the fabric reads are modelled; everything else the
//! deployment manager writes is ignored on deserialization. These CRDs are
//! owned by the deployment manager and are not emitted by `crdgen`.

use crate::references::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the deployment manager resources
pub const DEPLOYMENT_GROUP: &str = "app.edge-orchestrator.intel.com";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "app.edge-orchestrator.intel.com",
    version = "v1beta1",
    kind = "Deployment",
    namespaced,
    status = "DeploymentStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Network the deployment's services are interconnected over
    #[serde(default)]
    pub network_ref: ObjectReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct DeploymentStatus {}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "app.edge-orchestrator.intel.com",
    version = "v1beta1",
    kind = "DeploymentCluster",
    namespaced,
    status = "DeploymentClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentClusterSpec {
    /// UID of the owning Deployment
    #[serde(default)]
    pub deployment_id: String,

    /// Member cluster id
    #[serde(default)]
    pub cluster_id: String,

    /// Project namespace the member cluster is registered in
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct DeploymentClusterStatus {
    /// Per-app status on the cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<DeploymentApp>,
}

/// An application installed by a deployment on one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct DeploymentApp {
    /// App name
    #[serde(default)]
    pub name: String,

    /// App id; equals the Helm release name of its resources
    #[serde(default)]
    pub id: String,
}

impl DeploymentCluster {
    /// Ids of the apps installed on the member cluster
    pub fn app_ids(&self) -> impl Iterator<Item = &str> {
        self.status
            .iter()
            .flat_map(|s| s.apps.iter())
            .map(|app| app.id.as_str())
    }
}
