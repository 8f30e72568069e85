//! Topology reconcilers
//!
//! Handles: Deployment, DeploymentCluster, DeploymentService, NetworkCluster,
//! NetworkClusterStatus, NetworkClusterLink, NetworkLink, NetworkService.
//! They derive network and fabric objects from deployments and never call the
//! VAN data plane.
//!
//! Fabric Clusters, Links and Services can be owned by several network objects
//! at once. [`bind_owned`] and [`unbind_owned`] keep that owner set: the child is
//! created by its first owner and deleted when the last one lets go.

pub mod deployment;
pub mod deployment_cluster;
pub mod deployment_service;
#[cfg(test)]
mod deployment_service_test;
pub mod network_cluster;
#[cfg(test)]
mod network_cluster_test;
pub mod network_cluster_link;
pub mod network_cluster_status;
pub mod network_link;
pub mod network_service;

use super::describe;
use crate::error::ControllerError;
use crate::reconcile_helpers::{add_owner_ref, ignore_not_found, is_deleting, owner_count, remove_owner_ref, write_failed};
use crate::store::{ObjectKey, ObjectStore, StoreError, StoredObject};
use kube::Resource;
use tracing::{debug, info};

/// Outcome of [`bind_owned`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    /// The child exists and lists the owner
    Bound,
    /// The child is being deleted; bind again once it is gone
    ChildDeleting,
}

/// Create `child` owned by `owner`, or add `owner` to the owners of the
/// existing object with the same name. An existing child keeps its spec.
pub(crate) async fn bind_owned<K, O>(store: &dyn ObjectStore<K>, owner: &O, mut child: K) -> Result<Binding, ControllerError>
where
    K: StoredObject,
    O: Resource<DynamicType = ()>,
{
    let key = ObjectKey::of(&child);
    let existing = match store.get(&key).await? {
        Some(existing) => existing,
        None => {
            add_owner_ref(&mut child, owner);
            match store.create(&child).await {
                Ok(_) => {
                    info!("Created {} owned by {}", describe(&child), describe(owner));
                    return Ok(Binding::Bound);
                }
                Err(e) if e.is_already_exists() => {
                    debug!("{} was created concurrently", describe(&child));
                    store
                        .get(&key)
                        .await?
                        .ok_or_else(|| StoreError::NotFound(key.to_string()))?
                }
                Err(e) => return Err(write_failed(&describe(&child), e).into()),
            }
        }
    };

    if is_deleting(&existing) {
        debug!("{} is being deleted, not binding {}", describe(&existing), describe(owner));
        return Ok(Binding::ChildDeleting);
    }

    let mut updated = existing;
    if add_owner_ref(&mut updated, owner) {
        store
            .update(&updated)
            .await
            .map_err(|e| write_failed(&describe(&updated), e))?;
        info!(
            "Added owner {} to {} ({} owners)",
            describe(owner),
            describe(&updated),
            owner_count(&updated)
        );
    }
    Ok(Binding::Bound)
}

/// Remove `owner` from the owners of the child at `key`; the child is deleted
/// once no owner is left
pub(crate) async fn unbind_owned<K, O>(store: &dyn ObjectStore<K>, key: &ObjectKey, owner: &O) -> Result<(), ControllerError>
where
    K: StoredObject,
    O: Resource<DynamicType = ()>,
{
    let Some(mut child) = store.get(key).await? else {
        debug!("{} {} already gone", K::kind(&()), key);
        return Ok(());
    };
    if !remove_owner_ref(&mut child, owner) {
        return Ok(());
    }

    if owner_count(&child) == 0 {
        store
            .delete(key)
            .await
            .map_err(|e| write_failed(&describe(&child), e))?;
        info!("Deleted {} after its last owner {} let go", describe(&child), describe(owner));
    } else {
        ignore_not_found(store.update(&child).await).map_err(|e| write_failed(&describe(&child), e))?;
        info!(
            "Removed owner {} from {} ({} owners left)",
            describe(owner),
            describe(&child),
            owner_count(&child)
        );
    }
    Ok(())
}
