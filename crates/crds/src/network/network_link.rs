//! NetworkLink CRD
//!
//! Directed spoke -> hub link inside a Network. Owned by the hub NetworkCluster.

use crate::references::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "network.app.edge-orchestrator.intel.com",
    version = "v1alpha1",
    kind = "NetworkLink",
    status = "NetworkLinkStatus",
    printcolumn = r#"{"name":"Network","type":"string","jsonPath":".spec.networkRef.name"}"#,
    printcolumn = r#"{"name":"Source","type":"string","jsonPath":".spec.sourceClusterRef.name"}"#,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetClusterRef.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkLinkSpec {
    /// Network the link belongs to
    pub network_ref: ObjectReference,

    /// Spoke side
    pub source_cluster_ref: ObjectReference,

    /// Hub side
    pub target_cluster_ref: ObjectReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct NetworkLinkStatus {}
