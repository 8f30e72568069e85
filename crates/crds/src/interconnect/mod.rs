//! `interconnect.app.edge-orchestrator.intel.com` resources
//!
//! The realized topology: one Cluster per member cluster, one Link per cluster
//! pair, one Service per exported member service. Each carries a phase driven
//! by the per-cluster reconcilers.

pub mod cluster;
pub mod link;
pub mod service;

pub use cluster::*;
pub use link::*;
pub use service::*;

/// API group of the interconnect resources
pub const INTERCONNECT_GROUP: &str = "interconnect.app.edge-orchestrator.intel.com";

/// Namespace the VAN data plane lives in on every member cluster
pub const FABRIC_NAMESPACE: &str = "interconnect";
