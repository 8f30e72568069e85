//! NetworkService CRD
//!
//! A member-cluster Service exported into a Network.

use crate::references::{ExposePort, ObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "network.app.edge-orchestrator.intel.com",
    version = "v1alpha1",
    kind = "NetworkService",
    status = "NetworkServiceStatus",
    printcolumn = r#"{"name":"Network","type":"string","jsonPath":".spec.networkRef.name"}"#,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterRef.name"}"#,
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".spec.serviceRef.namespace"}"#,
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.serviceRef.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkServiceSpec {
    /// Network the service is exported into
    pub network_ref: ObjectReference,

    /// Member cluster hosting the service
    pub cluster_ref: ObjectReference,

    /// Member Service (namespace and name)
    pub service_ref: ObjectReference,

    /// Ports to expose; never empty once created
    #[serde(default)]
    pub expose_ports: Vec<ExposePort>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct NetworkServiceStatus {}
