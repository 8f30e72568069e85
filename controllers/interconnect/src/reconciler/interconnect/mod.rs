//! Per-cluster reconcilers
//!
//! Handles: Cluster, ClusterStatus (on fabric Services), Link, Service.
//! These are the only reconcilers that call the VAN data plane.

pub mod cluster;
pub mod cluster_status;
pub mod link;
#[cfg(test)]
mod link_test;
pub mod service;

use crds::IngressType;
use van_client::IngressMode;

/// Site ingress for a Cluster's recorded ingress
pub(crate) fn ingress_mode(ingress: IngressType) -> IngressMode {
    match ingress {
        IngressType::None => IngressMode::None,
        IngressType::LoadBalancer => IngressMode::LoadBalancer,
    }
}
