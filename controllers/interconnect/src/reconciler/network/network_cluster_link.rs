//! NetworkClusterLink reconciler
//!
//! A Hub NetworkCluster owns one NetworkLink to every other NetworkCluster of
//! its network, oriented peer -> hub and recorded in `status.links`. Two Hubs
//! each own a NetworkLink into themselves; both map onto the same fabric Link.
//! Spokes own no links; demotion and deletion remove everything the
//! NetworkCluster created.

use super::super::{Reconciler, ensure_finalizer, release_finalizer, write_status};
use crate::error::ControllerError;
use crate::naming::network_link_name;
use crate::reconcile_helpers::{add_owner_ref, has_finalizer, is_deleting, label, update_labels, write_failed};
use crate::store::ObjectKey;
use crds::labels::{NETWORK_NAME_LABEL, NETWORK_PROJECT_ID_LABEL};
use crds::{LocalObjectReference, NetworkCluster, NetworkClusterRole, NetworkLink, NetworkLinkSpec, finalizers};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// NetworkLink from `spoke` into `hub`
pub(crate) fn desired_network_link(hub: &NetworkCluster, spoke: &NetworkCluster) -> NetworkLink {
    let network = &hub.spec.network_ref.name;
    let mut link = NetworkLink::new(
        &network_link_name(network, &hub.spec.cluster_ref.name, &spoke.spec.cluster_ref.name),
        NetworkLinkSpec {
            network_ref: hub.spec.network_ref.clone(),
            source_cluster_ref: spoke.spec.cluster_ref.clone(),
            target_cluster_ref: hub.spec.cluster_ref.clone(),
        },
    );
    update_labels(
        &mut link,
        &[
            (NETWORK_NAME_LABEL, network.as_str()),
            (NETWORK_PROJECT_ID_LABEL, label(hub, NETWORK_PROJECT_ID_LABEL)),
        ],
    );
    add_owner_ref(&mut link, hub);
    link
}

/// Whether `hub` owns the link to `peer`
fn links_to(hub: &NetworkCluster, peer: &NetworkCluster) -> bool {
    peer.name_any() != hub.name_any() && !is_deleting(peer)
}

impl Reconciler {
    pub async fn reconcile_network_cluster_link(&self, nc: &NetworkCluster) -> Result<Action, ControllerError> {
        info!("Reconciling links of NetworkCluster {}", ObjectKey::of(nc));

        if is_deleting(nc) {
            if has_finalizer(nc, finalizers::NETWORK_CLUSTER_LINK) {
                self.remove_network_links(nc).await?;
                release_finalizer(&*self.stores.network_clusters, nc, finalizers::NETWORK_CLUSTER_LINK).await?;
            }
            return Ok(Action::await_change());
        }

        if ensure_finalizer(&*self.stores.network_clusters, nc, finalizers::NETWORK_CLUSTER_LINK)
            .await?
            .is_some()
        {
            return Ok(Action::await_change());
        }

        match nc.role() {
            NetworkClusterRole::Unknown => debug!("NetworkCluster {} has no role yet", nc.name_any()),
            NetworkClusterRole::Spoke => {
                if !nc.links().is_empty() {
                    self.remove_network_links(nc).await?;
                    let mut updated = nc.clone();
                    updated.status_mut().links.clear();
                    write_status(&*self.stores.network_clusters, &updated).await?;
                }
            }
            NetworkClusterRole::Hub => self.add_network_links(nc).await?,
        }
        Ok(Action::await_change())
    }

    /// Create the links of hub `nc` to its peers and prune the ones no longer wanted
    async fn add_network_links(&self, nc: &NetworkCluster) -> Result<(), ControllerError> {
        let network = nc.spec.network_ref.name.as_str();
        let peers = self
            .stores
            .network_clusters
            .list(&[(NETWORK_NAME_LABEL, network)])
            .await?;

        let wanted: Vec<NetworkLink> = peers
            .iter()
            .filter(|peer| links_to(nc, peer))
            .map(|peer| desired_network_link(nc, peer))
            .collect();
        let wanted_refs: BTreeSet<LocalObjectReference> = wanted
            .iter()
            .map(|link| LocalObjectReference::new(link.name_any()))
            .collect();
        let recorded: BTreeSet<LocalObjectReference> = nc.links().iter().cloned().collect();

        // Every link that may exist is recorded before it is created.
        let mut current = nc.clone();
        if !wanted_refs.is_subset(&recorded) {
            let mut updated = nc.clone();
            updated.status_mut().links = recorded.union(&wanted_refs).cloned().collect();
            current = write_status(&*self.stores.network_clusters, &updated).await?;
        }

        for link in &wanted {
            self.create_network_link(nc, link).await?;
        }

        let stale: Vec<LocalObjectReference> = recorded.difference(&wanted_refs).cloned().collect();
        if stale.is_empty() {
            return Ok(());
        }
        for link in &stale {
            self.delete_network_link(&link.name).await?;
        }
        let mut updated = current;
        updated.status_mut().links = wanted_refs.into_iter().collect();
        write_status(&*self.stores.network_clusters, &updated).await?;
        info!("NetworkCluster {} dropped {} links", nc.name_any(), stale.len());
        Ok(())
    }

    async fn create_network_link(&self, hub: &NetworkCluster, link: &NetworkLink) -> Result<(), ControllerError> {
        let key = ObjectKey::of(link);
        if self.stores.network_links.get(&key).await?.is_some() {
            return Ok(());
        }
        match self.stores.network_links.create(link).await {
            Ok(_) => {
                info!(
                    "Network {}: created NetworkLink {} [{} -> {}]",
                    hub.spec.network_ref.name,
                    key,
                    link.spec.source_cluster_ref.name,
                    link.spec.target_cluster_ref.name
                );
                Ok(())
            }
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(write_failed(&format!("NetworkLink {}", key), e).into()),
        }
    }

    async fn delete_network_link(&self, name: &str) -> Result<(), ControllerError> {
        let key = ObjectKey::cluster(name);
        self.stores
            .network_links
            .delete(&key)
            .await
            .map_err(|e| write_failed(&format!("NetworkLink {}", key), e))?;
        info!("Deleted NetworkLink {}", key);
        Ok(())
    }

    /// Delete every NetworkLink recorded on `nc`
    async fn remove_network_links(&self, nc: &NetworkCluster) -> Result<(), ControllerError> {
        for link in nc.links() {
            self.delete_network_link(&link.name).await?;
        }
        Ok(())
    }
}
