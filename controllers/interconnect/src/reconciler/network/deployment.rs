//! Deployment reconciler
//!
//! Propagates the deployment labels to every DeploymentCluster of a Deployment
//! and binds the Deployment to the Network it references. The Network exists
//! for as long as at least one Deployment is bound to it.

use super::super::{Reconciler, ensure_finalizer, release_finalizer, write_status};
use crate::error::ControllerError;
use crate::reconcile_helpers::{has_finalizer, is_deleting, label, update_labels, write_failed};
use crate::store::ObjectKey;
use crds::labels::{
    APP_PROJECT_ID_LABEL, DEPLOYMENT_ID_LABEL, DEPLOYMENT_NAME_LABEL, DEPLOYMENT_NAMESPACE_LABEL, NETWORK_NAME_LABEL,
    NETWORK_PROJECT_ID_LABEL,
};
use crds::{Deployment, Network, NetworkSpec, ObjectReference, finalizers};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use tracing::{debug, info};

/// Reference to `deployment` as kept in `Network.status.deploymentRefs`
pub(crate) fn deployment_reference(deployment: &Deployment, uid: &str) -> ObjectReference {
    ObjectReference {
        api_version: Some(Deployment::api_version(&()).into_owned()),
        kind: Some(Deployment::kind(&()).into_owned()),
        namespace: deployment.namespace(),
        name: deployment.name_any(),
        uid: Some(uid.to_string()),
    }
}

fn deployment_uid(deployment: &Deployment) -> Result<String, ControllerError> {
    deployment
        .uid()
        .ok_or_else(|| ControllerError::MissingField(format!("uid of Deployment {}", ObjectKey::of(deployment))))
}

impl Reconciler {
    pub async fn reconcile_deployment(&self, deployment: &Deployment) -> Result<Action, ControllerError> {
        let key = ObjectKey::of(deployment);
        info!("Reconciling Deployment {}", key);

        if is_deleting(deployment) {
            if has_finalizer(deployment, finalizers::DEPLOYMENT) {
                self.unbind_network(deployment).await?;
                release_finalizer(&*self.stores.deployments, deployment, finalizers::DEPLOYMENT).await?;
            }
            return Ok(Action::await_change());
        }

        self.label_deployment_clusters(deployment).await?;

        if deployment.spec.network_ref.name.is_empty() {
            debug!("Deployment {} references no Network", key);
            return Ok(Action::await_change());
        }

        if ensure_finalizer(&*self.stores.deployments, deployment, finalizers::DEPLOYMENT)
            .await?
            .is_some()
        {
            return Ok(Action::await_change());
        }

        self.bind_network(deployment).await?;
        Ok(Action::await_change())
    }

    /// Label the DeploymentClusters of `deployment` with its name, namespace
    /// and network
    async fn label_deployment_clusters(&self, deployment: &Deployment) -> Result<(), ControllerError> {
        let uid = deployment_uid(deployment)?;
        let name = deployment.name_any();
        let namespace = deployment.namespace().unwrap_or_default();
        let network = deployment.spec.network_ref.name.as_str();

        let mut labels = vec![(DEPLOYMENT_NAME_LABEL, name.as_str()), (DEPLOYMENT_NAMESPACE_LABEL, namespace.as_str())];
        if !network.is_empty() {
            labels.push((NETWORK_NAME_LABEL, network));
        }

        let clusters = self
            .stores
            .deployment_clusters
            .list(&[(DEPLOYMENT_ID_LABEL, uid.as_str())])
            .await?;
        for dc in clusters.iter().filter(|dc| dc.namespace() == deployment.namespace()) {
            let mut updated = dc.clone();
            if !update_labels(&mut updated, &labels) {
                continue;
            }
            self.stores
                .deployment_clusters
                .update(&updated)
                .await
                .map_err(|e| write_failed(&format!("DeploymentCluster {}", ObjectKey::of(dc)), e))?;
            info!("Labelled DeploymentCluster {} with network {:?}", ObjectKey::of(dc), network);
        }
        Ok(())
    }

    /// Create the Network if needed and add `deployment` to its references
    async fn bind_network(&self, deployment: &Deployment) -> Result<(), ControllerError> {
        let uid = deployment_uid(deployment)?;
        let name = &deployment.spec.network_ref.name;

        let network = match self.stores.networks.get(&ObjectKey::cluster(name)).await? {
            Some(network) => network,
            None => {
                let mut network = Network::new(name, NetworkSpec::default());
                update_labels(
                    &mut network,
                    &[
                        (NETWORK_NAME_LABEL, name.as_str()),
                        (NETWORK_PROJECT_ID_LABEL, label(deployment, APP_PROJECT_ID_LABEL)),
                    ],
                );
                match self.stores.networks.create(&network).await {
                    Ok(created) => {
                        info!("Created Network {} for Deployment {}", name, ObjectKey::of(deployment));
                        created
                    }
                    Err(e) if e.is_already_exists() => {
                        debug!("Network {} was created concurrently", name);
                        return Ok(());
                    }
                    Err(e) => return Err(write_failed(&format!("Network {}", name), e).into()),
                }
            }
        };

        if network.deployment_refs().iter().any(|r| r.uid.as_deref() == Some(uid.as_str())) {
            return Ok(());
        }

        let mut updated = network.clone();
        updated
            .status_mut()
            .deployment_refs
            .push(deployment_reference(deployment, &uid));
        write_status(&*self.stores.networks, &updated).await?;
        info!(
            "Bound Deployment {} to Network {} ({} deployments)",
            ObjectKey::of(deployment),
            name,
            updated.deployment_refs().len()
        );
        Ok(())
    }

    /// Remove `deployment` from its Network; the Network goes with its last Deployment
    async fn unbind_network(&self, deployment: &Deployment) -> Result<(), ControllerError> {
        let name = &deployment.spec.network_ref.name;
        if name.is_empty() {
            return Ok(());
        }
        let key = ObjectKey::cluster(name);
        let Some(network) = self.stores.networks.get(&key).await? else {
            debug!("Network {} already gone", name);
            return Ok(());
        };
        let uid = deployment_uid(deployment)?;

        let mut updated = network.clone();
        let refs = &mut updated.status_mut().deployment_refs;
        let before = refs.len();
        refs.retain(|r| r.uid.as_deref() != Some(uid.as_str()));
        let removed = refs.len() != before;

        if refs.is_empty() {
            self.stores
                .networks
                .delete(&key)
                .await
                .map_err(|e| write_failed(&format!("Network {}", name), e))?;
            info!("Deleted Network {} with its last Deployment {}", name, ObjectKey::of(deployment));
        } else if removed {
            write_status(&*self.stores.networks, &updated).await?;
            info!("Unbound Deployment {} from Network {}", ObjectKey::of(deployment), name);
        }
        Ok(())
    }
}
