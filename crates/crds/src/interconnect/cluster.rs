//! Cluster CRD
//!
//! One per physical member cluster, shared by every NetworkCluster that lands on it.

use crate::references::{LocalObjectReference, ObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "interconnect.app.edge-orchestrator.intel.com",
    version = "v1alpha1",
    kind = "Cluster",
    status = "ClusterStatus",
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".spec.clusterRef.namespace"}"#,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterRef.name"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"IngressType","type":"string","jsonPath":".status.ingress"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Member cluster (namespace = project namespace, name = cluster id)
    pub cluster_ref: ObjectReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Installation phase
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Ingress the site is (or will be) installed with
    #[serde(default)]
    pub ingress: IngressType,

    /// Fabric Services exposed from this cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<LocalObjectReference>,
}

/// Cluster installation phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default, Hash)]
pub enum ClusterPhase {
    /// Finalizer added, nothing installed yet
    #[default]
    Pending,
    /// Site is being (re)installed
    Configuring,
    /// Site installed with the requested ingress
    Running,
    /// Site is being removed
    Terminating,
}

/// Ingress mode of a VAN site.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default, Hash)]
pub enum IngressType {
    /// No inbound links accepted
    #[default]
    None,
    /// Inbound links accepted through a LoadBalancer Service
    LoadBalancer,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Configuring => "Configuring",
            Self::Running => "Running",
            Self::Terminating => "Terminating",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for IngressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::LoadBalancer => f.write_str("LoadBalancer"),
        }
    }
}

impl Cluster {
    /// Current phase, `Pending` without status
    pub fn phase(&self) -> ClusterPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Current ingress, `None` without status
    pub fn ingress(&self) -> IngressType {
        self.status.as_ref().map(|s| s.ingress).unwrap_or_default()
    }

    /// Bound fabric Services
    pub fn services(&self) -> &[LocalObjectReference] {
        self.status
            .as_ref()
            .map(|s| s.services.as_slice())
            .unwrap_or_default()
    }

    /// Status, created on first access
    pub fn status_mut(&mut self) -> &mut ClusterStatus {
        self.status.get_or_insert_with(ClusterStatus::default)
    }
}
