//! NetworkCluster CRD
//!
//! One per (Network, member cluster). Carries the hub/spoke role and the sets of
//! DeploymentClusters, NetworkServices and outgoing NetworkLinks bound to it.

use crate::references::{LocalObjectReference, ObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "network.app.edge-orchestrator.intel.com",
    version = "v1alpha1",
    kind = "NetworkCluster",
    status = "NetworkClusterStatus",
    printcolumn = r#"{"name":"Network","type":"string","jsonPath":".spec.networkRef.name"}"#,
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".spec.clusterRef.namespace"}"#,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterRef.name"}"#,
    printcolumn = r#"{"name":"Role","type":"string","jsonPath":".status.role"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkClusterSpec {
    /// Network this cluster participates in
    pub network_ref: ObjectReference,

    /// Member cluster (namespace = project namespace, name = cluster id)
    pub cluster_ref: ObjectReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkClusterStatus {
    /// Hub when the cluster exports at least one service
    #[serde(default)]
    pub role: NetworkClusterRole,

    /// DeploymentClusters keeping this NetworkCluster alive
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployment_cluster_refs: Vec<ObjectReference>,

    /// NetworkServices exported from this cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<LocalObjectReference>,

    /// NetworkLinks created while acting as a hub
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LocalObjectReference>,
}

/// Role of a cluster within a network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum NetworkClusterRole {
    /// No NetworkService has been observed yet
    #[default]
    Unknown,

    /// Consumes services only; hosts incoming links
    Spoke,

    /// Exports at least one service; owns outgoing links
    Hub,
}

impl std::fmt::Display for NetworkClusterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Spoke => write!(f, "Spoke"),
            Self::Hub => write!(f, "Hub"),
        }
    }
}

impl NetworkCluster {
    /// Current role, `Unknown` without status
    pub fn role(&self) -> NetworkClusterRole {
        self.status.as_ref().map(|s| s.role).unwrap_or_default()
    }

    /// Status, created on first access
    pub fn status_mut(&mut self) -> &mut NetworkClusterStatus {
        self.status.get_or_insert_with(NetworkClusterStatus::default)
    }

    /// Bound DeploymentCluster references
    pub fn deployment_cluster_refs(&self) -> &[ObjectReference] {
        self.status
            .as_ref()
            .map(|s| s.deployment_cluster_refs.as_slice())
            .unwrap_or_default()
    }

    /// Exported NetworkService references
    pub fn services(&self) -> &[LocalObjectReference] {
        self.status
            .as_ref()
            .map(|s| s.services.as_slice())
            .unwrap_or_default()
    }

    /// Outgoing NetworkLink references
    pub fn links(&self) -> &[LocalObjectReference] {
        self.status
            .as_ref()
            .map(|s| s.links.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_defaults_to_unknown() {
        let status: NetworkClusterStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(status.role, NetworkClusterRole::Unknown);
    }

    #[test]
    fn test_role_serializes_pascal_case() {
        let value = serde_json::to_value(NetworkClusterRole::Hub).unwrap();
        assert_eq!(value, serde_json::json!("Hub"));
    }
}
