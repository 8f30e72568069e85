//! Network CRD
//!
//! A user-declared fabric. Deployments bind themselves to a Network by name.

use crate::references::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "network.app.edge-orchestrator.intel.com",
    version = "v1alpha1",
    kind = "Network",
    status = "NetworkStatus",
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".spec.networkRef.namespace"}"#,
    printcolumn = r#"{"name":"Network","type":"string","jsonPath":".spec.networkRef.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Optional reference to an externally managed network definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_ref: Option<ObjectReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Deployments currently bound to this network, keyed by UID
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployment_refs: Vec<ObjectReference>,
}

impl Network {
    /// Status, created on first access
    pub fn status_mut(&mut self) -> &mut NetworkStatus {
        self.status.get_or_insert_with(NetworkStatus::default)
    }

    /// Bound deployments, empty when no status has been written yet
    pub fn deployment_refs(&self) -> &[ObjectReference] {
        self.status
            .as_ref()
            .map(|s| s.deployment_refs.as_slice())
            .unwrap_or_default()
    }
}
