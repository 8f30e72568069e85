//! NetworkCluster reconciler
//!
//! Binds every NetworkCluster to the fabric Cluster of its member cluster.
//! A Cluster shared by several networks is owned by each of their
//! NetworkClusters and deleted with the last one.

use super::super::{Reconciler, ensure_finalizer, release_finalizer};
use super::{Binding, bind_owned, unbind_owned};
use crate::config::DEPENDENCY_WAIT;
use crate::error::ControllerError;
use crate::reconcile_helpers::{has_finalizer, is_deleting, label, update_labels};
use crate::store::ObjectKey;
use crds::labels::{CLUSTER_NAME_LABEL, CLUSTER_NAMESPACE_LABEL, INTERCONNECT_PROJECT_ID_LABEL, NETWORK_PROJECT_ID_LABEL};
use crds::{Cluster, ClusterSpec, NetworkCluster, finalizers};
use kube_runtime::controller::Action;
use tracing::info;

/// Fabric Cluster wanted by `nc`
pub(crate) fn desired_cluster(nc: &NetworkCluster) -> Cluster {
    let cluster_ref = &nc.spec.cluster_ref;
    let mut cluster = Cluster::new(
        &cluster_ref.name,
        ClusterSpec {
            cluster_ref: cluster_ref.clone(),
        },
    );
    update_labels(
        &mut cluster,
        &[
            (CLUSTER_NAMESPACE_LABEL, cluster_ref.namespace_or_empty()),
            (CLUSTER_NAME_LABEL, cluster_ref.name.as_str()),
            (INTERCONNECT_PROJECT_ID_LABEL, label(nc, NETWORK_PROJECT_ID_LABEL)),
        ],
    );
    cluster
}

impl Reconciler {
    pub async fn reconcile_network_cluster(&self, nc: &NetworkCluster) -> Result<Action, ControllerError> {
        info!("Reconciling NetworkCluster {}", ObjectKey::of(nc));
        let cluster_key = ObjectKey::cluster(&nc.spec.cluster_ref.name);

        if is_deleting(nc) {
            if has_finalizer(nc, finalizers::NETWORK_CLUSTER) {
                unbind_owned(&*self.stores.clusters, &cluster_key, nc).await?;
                release_finalizer(&*self.stores.network_clusters, nc, finalizers::NETWORK_CLUSTER).await?;
            }
            return Ok(Action::await_change());
        }

        if ensure_finalizer(&*self.stores.network_clusters, nc, finalizers::NETWORK_CLUSTER)
            .await?
            .is_some()
        {
            return Ok(Action::await_change());
        }

        match bind_owned(&*self.stores.clusters, nc, desired_cluster(nc)).await? {
            Binding::Bound => Ok(Action::await_change()),
            Binding::ChildDeleting => Ok(Action::requeue(DEPENDENCY_WAIT)),
        }
    }
}
