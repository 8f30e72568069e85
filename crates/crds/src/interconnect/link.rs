//! Link CRD
//!
//! One per unordered pair of Clusters. Shared by every NetworkLink over the same
//! physical pair through accumulated owner references.

use crate::references::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "interconnect.app.edge-orchestrator.intel.com",
    version = "v1alpha1",
    kind = "Link",
    status = "LinkStatus",
    printcolumn = r#"{"name":"Source","type":"string","jsonPath":".spec.sourceClusterRef.name"}"#,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetClusterRef.name"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LinkSpec {
    /// Lexicographically smaller cluster of the pair
    pub source_cluster_ref: ObjectReference,

    /// Lexicographically larger cluster of the pair
    pub target_cluster_ref: ObjectReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    /// Linking phase
    #[serde(default)]
    pub phase: LinkPhase,
}

/// Link phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default, Hash)]
pub enum LinkPhase {
    /// Finalizer added, nothing exchanged yet
    #[default]
    Pending,
    /// Token is being issued and redeemed
    Linking,
    /// Connector established
    Linked,
    /// Connector is being removed
    Unlinking,
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Linking => "Linking",
            Self::Linked => "Linked",
            Self::Unlinking => "Unlinking",
        };
        f.write_str(s)
    }
}

impl Link {
    /// Current phase, `Pending` without status
    pub fn phase(&self) -> LinkPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    pub fn status_mut(&mut self) -> &mut LinkStatus {
        self.status.get_or_insert_with(LinkStatus::default)
    }
}
