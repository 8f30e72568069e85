//! `network.app.edge-orchestrator.intel.com` resources
//!
//! The target topology: what should be connected, derived from deployments.

pub mod network;
pub mod network_cluster;
pub mod network_link;
pub mod network_service;

pub use network::*;
pub use network_cluster::*;
pub use network_link::*;
pub use network_service::*;

/// API group of the network resources
pub const NETWORK_GROUP: &str = "network.app.edge-orchestrator.intel.com";
