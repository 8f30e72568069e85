//! DeploymentCluster reconciler
//!
//! Keeps one NetworkCluster per network and member cluster, named
//! `<network>-<cluster>`, and records every DeploymentCluster placed there in
//! `status.deploymentClusterRefs`. The NetworkCluster is deleted with the last
//! of them.

use super::super::{Reconciler, ensure_finalizer, release_finalizer, write_status};
use crate::config::DEPENDENCY_WAIT;
use crate::error::ControllerError;
use crate::naming::network_cluster_name;
use crate::reconcile_helpers::{add_owner_ref, has_finalizer, is_deleting, label, update_labels, write_failed};
use crate::store::ObjectKey;
use crds::labels::{APP_PROJECT_ID_LABEL, NETWORK_NAME_LABEL, NETWORK_PROJECT_ID_LABEL};
use crds::{DeploymentCluster, NetworkCluster, NetworkClusterSpec, ObjectReference, finalizers};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

fn deployment_cluster_reference(dc: &DeploymentCluster, uid: &str) -> ObjectReference {
    ObjectReference {
        api_version: Some(DeploymentCluster::api_version(&()).into_owned()),
        kind: Some(DeploymentCluster::kind(&()).into_owned()),
        namespace: dc.namespace(),
        name: dc.name_any(),
        uid: Some(uid.to_string()),
    }
}

impl Reconciler {
    pub async fn reconcile_deployment_cluster(&self, dc: &DeploymentCluster) -> Result<Action, ControllerError> {
        let key = ObjectKey::of(dc);
        info!("Reconciling DeploymentCluster {}", key);

        let network = label(dc, NETWORK_NAME_LABEL);
        if network.is_empty() {
            if is_deleting(dc) {
                release_finalizer(&*self.stores.deployment_clusters, dc, finalizers::DEPLOYMENT_CLUSTER).await?;
            }
            debug!("DeploymentCluster {} has no network yet", key);
            return Ok(Action::await_change());
        }

        let uid = dc
            .uid()
            .ok_or_else(|| ControllerError::MissingField(format!("uid of DeploymentCluster {}", key)))?;
        let nc_key = ObjectKey::cluster(network_cluster_name(network, &dc.spec.cluster_id));

        if is_deleting(dc) {
            if !has_finalizer(dc, finalizers::DEPLOYMENT_CLUSTER) {
                return Ok(Action::await_change());
            }
            if let Some(nc) = self.stores.network_clusters.get(&nc_key).await? {
                self.remove_deployment_cluster_ref(&nc, &uid).await?;
            }
            release_finalizer(&*self.stores.deployment_clusters, dc, finalizers::DEPLOYMENT_CLUSTER).await?;
            return Ok(Action::await_change());
        }

        if ensure_finalizer(&*self.stores.deployment_clusters, dc, finalizers::DEPLOYMENT_CLUSTER)
            .await?
            .is_some()
        {
            return Ok(Action::await_change());
        }

        let nc = match self.stores.network_clusters.get(&nc_key).await? {
            Some(nc) => nc,
            None => match self.create_network_cluster(dc, network, &nc_key).await? {
                Some(nc) => nc,
                None => return Ok(Action::requeue(DEPENDENCY_WAIT)),
            },
        };

        if nc.deployment_cluster_refs().iter().any(|r| r.uid.as_deref() == Some(uid.as_str())) {
            return Ok(Action::await_change());
        }
        let mut updated = nc.clone();
        updated
            .status_mut()
            .deployment_cluster_refs
            .push(deployment_cluster_reference(dc, &uid));
        write_status(&*self.stores.network_clusters, &updated).await?;
        info!("Added DeploymentCluster {} to NetworkCluster {}", key, nc_key);
        Ok(Action::await_change())
    }

    /// Create the NetworkCluster for `dc`, owned by its Network. `None` while
    /// the Network does not exist yet.
    async fn create_network_cluster(
        &self,
        dc: &DeploymentCluster,
        network: &str,
        nc_key: &ObjectKey,
    ) -> Result<Option<NetworkCluster>, ControllerError> {
        let Some(owner) = self.stores.networks.get(&ObjectKey::cluster(network)).await? else {
            warn!("Network {} of DeploymentCluster {} does not exist yet", network, ObjectKey::of(dc));
            return Ok(None);
        };

        let project = match label(&owner, NETWORK_PROJECT_ID_LABEL) {
            "" => label(dc, APP_PROJECT_ID_LABEL),
            project => project,
        };
        let mut nc = NetworkCluster::new(
            &nc_key.name,
            NetworkClusterSpec {
                network_ref: ObjectReference::named(network),
                cluster_ref: ObjectReference::namespaced(dc.spec.namespace.clone(), dc.spec.cluster_id.clone()),
            },
        );
        update_labels(&mut nc, &[(NETWORK_NAME_LABEL, network), (NETWORK_PROJECT_ID_LABEL, project)]);
        add_owner_ref(&mut nc, &owner);

        match self.stores.network_clusters.create(&nc).await {
            Ok(created) => {
                info!("Created NetworkCluster {} for DeploymentCluster {}", nc_key, ObjectKey::of(dc));
                Ok(Some(created))
            }
            Err(e) if e.is_already_exists() => Ok(self.stores.network_clusters.get(nc_key).await?),
            Err(e) => Err(write_failed(&format!("NetworkCluster {}", nc_key), e).into()),
        }
    }

    /// Drop the DeploymentCluster with `uid` from `nc`; an emptied NetworkCluster is deleted
    async fn remove_deployment_cluster_ref(&self, nc: &NetworkCluster, uid: &str) -> Result<(), ControllerError> {
        let key = ObjectKey::of(nc);
        let mut updated = nc.clone();
        let refs = &mut updated.status_mut().deployment_cluster_refs;
        let before = refs.len();
        refs.retain(|r| r.uid.as_deref() != Some(uid));
        let removed = refs.len() != before;

        if refs.is_empty() {
            self.stores
                .network_clusters
                .delete(&key)
                .await
                .map_err(|e| write_failed(&format!("NetworkCluster {}", key), e))?;
            info!("Deleted NetworkCluster {} with its last DeploymentCluster", key);
        } else if removed {
            write_status(&*self.stores.network_clusters, &updated).await?;
            info!("Removed DeploymentCluster {} from NetworkCluster {}", uid, key);
        }
        Ok(())
    }
}
