//! Service CRD (fabric-level)
//!
//! One per (Cluster, exported member service).

use crate::references::{ExposePort, ObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "interconnect.app.edge-orchestrator.intel.com",
    version = "v1alpha1",
    kind = "Service",
    status = "ServiceStatus",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterRef.name"}"#,
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".spec.serviceRef.namespace"}"#,
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.serviceRef.name"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Cluster hosting the member service
    pub cluster_ref: ObjectReference,

    /// Member Service (namespace and name)
    pub service_ref: ObjectReference,

    /// Ports bound into the fabric
    #[serde(default)]
    pub expose_ports: Vec<ExposePort>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// Exposure phase
    #[serde(default)]
    pub phase: ServicePhase,
}

/// Service exposure phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default, Hash)]
pub enum ServicePhase {
    /// Finalizer added, nothing exposed yet
    #[default]
    Pending,
    /// Interface is being bound
    Exposing,
    /// Interface bound with the requested ports
    Exposed,
    /// Interface is being unbound
    Unexposing,
}

impl std::fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Exposing => "Exposing",
            Self::Exposed => "Exposed",
            Self::Unexposing => "Unexposing",
        };
        f.write_str(s)
    }
}

impl Service {
    /// Current phase, `Pending` without status
    pub fn phase(&self) -> ServicePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    pub fn status_mut(&mut self) -> &mut ServiceStatus {
        self.status.get_or_insert_with(ServiceStatus::default)
    }

    /// Exposed port numbers in declaration order
    pub fn port_numbers(&self) -> Vec<i32> {
        self.spec.expose_ports.iter().map(|p| p.port).collect()
    }
}
