//! NetworkClusterStatus reconciler
//!
//! Records every NetworkService in `status.services` of its NetworkCluster and
//! derives the role from it: a NetworkCluster exporting at least one service is
//! a Hub, otherwise a Spoke. New NetworkClusters start out `Unknown`;
//! [`Reconciler::reconcile_network_cluster_role`] lifts the ones nothing has
//! been exported from yet.

use super::super::{Reconciler, ensure_finalizer, release_finalizer, write_status};
use crate::config::DEPENDENCY_WAIT;
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crate::naming::network_cluster_name;
use crate::reconcile_helpers::{has_finalizer, is_deleting};
use crate::store::ObjectKey;
use crds::{LocalObjectReference, NetworkCluster, NetworkClusterRole, NetworkService, finalizers};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{debug, info};

/// Role of a NetworkCluster exporting `services`
pub fn role_for(services: &[LocalObjectReference]) -> NetworkClusterRole {
    if services.is_empty() {
        NetworkClusterRole::Spoke
    } else {
        NetworkClusterRole::Hub
    }
}

impl Reconciler {
    pub async fn reconcile_network_cluster_status(&self, ns: &NetworkService) -> Result<Action, ControllerError> {
        let name = ns.name_any();
        info!("Reconciling NetworkClusterStatus for NetworkService {}", name);

        let nc_key = ObjectKey::cluster(network_cluster_name(
            &ns.spec.network_ref.name,
            &ns.spec.cluster_ref.name,
        ));
        let nc = self.stores.network_clusters.get(&nc_key).await?;

        if is_deleting(ns) {
            if !has_finalizer(ns, finalizers::NETWORK_CLUSTER_STATUS) {
                return Ok(Action::await_change());
            }
            match nc {
                Some(nc) => {
                    self.update_exported_services(&nc, |services| services.retain(|s| s.name != name))
                        .await?
                }
                None => debug!("NetworkCluster {} already gone", nc_key),
            }
            release_finalizer(&*self.stores.network_services, ns, finalizers::NETWORK_CLUSTER_STATUS).await?;
            return Ok(Action::await_change());
        }

        let Some(nc) = nc else {
            debug!("NetworkCluster {} of NetworkService {} does not exist yet", nc_key, name);
            return Ok(Action::requeue(DEPENDENCY_WAIT));
        };

        if ensure_finalizer(&*self.stores.network_services, ns, finalizers::NETWORK_CLUSTER_STATUS)
            .await?
            .is_some()
        {
            return Ok(Action::await_change());
        }

        let entry = LocalObjectReference::new(name);
        self.update_exported_services(&nc, |services| {
            if let Err(pos) = services.binary_search(&entry) {
                services.insert(pos, entry);
            }
        })
        .await?;
        Ok(Action::await_change())
    }

    /// Lift a NetworkCluster out of `Unknown`
    pub async fn reconcile_network_cluster_role(&self, nc: &NetworkCluster) -> Result<Action, ControllerError> {
        if is_deleting(nc) || nc.role() != NetworkClusterRole::Unknown {
            return Ok(Action::await_change());
        }
        info!("Reconciling role of NetworkCluster {}", nc.name_any());

        let mut updated = nc.clone();
        let role = role_for(nc.services());
        updated.status_mut().role = role;
        let written = write_status(&*self.stores.network_clusters, &updated).await?;
        self.role_changed(&written, NetworkClusterRole::Unknown, role).await;
        Ok(Action::await_change())
    }

    /// Apply `change` to the exported services of `nc` and derive its role;
    /// writes only when something changed
    async fn update_exported_services<F>(&self, nc: &NetworkCluster, change: F) -> Result<(), ControllerError>
    where
        F: FnOnce(&mut Vec<LocalObjectReference>),
    {
        let from = nc.role();
        let mut updated = nc.clone();
        let status = updated.status_mut();
        change(&mut status.services);
        status.role = role_for(&status.services);

        if updated.status == nc.status {
            return Ok(());
        }
        let written = write_status(&*self.stores.network_clusters, &updated).await?;
        debug!(
            "NetworkCluster {} exports {} services",
            nc.name_any(),
            written.services().len()
        );
        if written.role() != from {
            self.role_changed(&written, from, written.role()).await;
        }
        Ok(())
    }

    async fn role_changed(&self, nc: &NetworkCluster, from: NetworkClusterRole, to: NetworkClusterRole) {
        info!("NetworkCluster {} role {} -> {}", nc.name_any(), from, to);
        self.record(
            nc,
            reasons::ROLE_CHANGED,
            actions::RECONCILE,
            format!("Role changed from {} to {}", from, to),
        )
        .await;
    }
}
