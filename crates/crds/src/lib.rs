//! Interconnect Fabric CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the interconnect fabric controller:
//! - `network`: target topology derived from deployments
//! - `interconnect`: realized topology driven against the VAN data plane
//! - `deployment`: deployment manager resources consumed as input

pub mod deployment;
pub mod interconnect;
pub mod labels;
pub mod network;
pub mod references;

pub use deployment::*;
pub use interconnect::*;
pub use labels::*;
pub use network::*;
pub use references::*;
