//! Object references shared by the network and interconnect CRDs
//!
//! These mirror the core Kubernetes `ObjectReference` and `LocalObjectReference`
//! shapes so that CRs written by other tooling round-trip unchanged.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to another object, possibly in another namespace or cluster.
///
/// Only `name` is required. `namespace` is used for cluster references to carry
/// the project namespace the member cluster is registered in.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// API version of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Kind of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Namespace of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name of the referent
    #[serde(default)]
    pub name: String,

    /// UID of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl ObjectReference {
    /// Reference by name only
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Reference by namespace and name
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Namespace of the referent, or the empty string
    pub fn namespace_or_empty(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }
}

/// Reference to a cluster-scoped object by name.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct LocalObjectReference {
    /// Name of the referent
    #[serde(default)]
    pub name: String,
}

impl LocalObjectReference {
    /// Creates a reference to `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A single port exposed over the fabric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default, Hash)]
pub struct ExposePort {
    /// Port number on the member service
    pub port: i32,
}

impl From<u16> for ExposePort {
    fn from(port: u16) -> Self {
        Self {
            port: i32::from(port),
        }
    }
}
