//! Interconnect Controller
//!
//! Multi-cluster controller set for the interconnect fabric:
//! - network reconcilers derive the target topology (NetworkClusters,
//!   NetworkLinks, NetworkServices) from Deployments and Networks
//! - interconnect reconcilers drive Clusters, Links and Services against the
//!   VAN data plane of every member cluster
//!
//! The binary in `main.rs` parses [`config::Args`], serves health probes and
//! runs a [`controller::Controller`].

pub mod backoff;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod health;
pub mod indexes;
pub mod mappers;
pub mod member;
pub mod naming;
pub mod reconcile_helpers;
pub mod reconciler;
pub mod service_watcher;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod reconcile_helpers_test;
#[cfg(test)]
mod scenarios_test;
#[cfg(test)]
pub mod test_utils;
