//! Controller-specific error types.
//!
//! Adapter, access and store failures are wrapped unchanged so reconcilers can
//! keep using their typed predicates after `?`.

use crate::member::MemberError;
use crate::store::StoreError;
use cluster_access::AccessError;
use kube::Error as KubeError;
use thiserror::Error;
use van_client::VanError;

/// Errors that can occur in the interconnect controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Shared object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// VAN data-plane error
    #[error("VAN error: {0}")]
    Van(#[from] VanError),

    /// Cluster access error
    #[error("Cluster access error: {0}")]
    Access(#[from] AccessError),

    /// Member cluster API error
    #[error("Member cluster error: {0}")]
    Member(#[from] MemberError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object is missing a field the reconciler needs
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Health probe server failed
    #[error("Health probe error: {0}")]
    Probe(#[from] std::io::Error),
}

impl ControllerError {
    /// Optimistic concurrency failure on a write
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::Store(e) if e.is_conflict())
    }

    /// The cluster-access provider no longer knows the cluster
    pub fn is_cluster_gone(&self) -> bool {
        matches!(self, ControllerError::Access(e) if e.is_cluster_gone())
    }
}
