//! NetworkLink reconciler
//!
//! Binds every NetworkLink to the fabric Link of its cluster pair. The pair is
//! sorted, so NetworkLinks of different networks over the same two clusters
//! share one Link.

use super::super::{Reconciler, ensure_finalizer, release_finalizer};
use super::{Binding, bind_owned, unbind_owned};
use crate::config::DEPENDENCY_WAIT;
use crate::error::ControllerError;
use crate::naming::link_name;
use crate::reconcile_helpers::{has_finalizer, is_deleting, label, update_labels};
use crate::store::ObjectKey;
use crds::labels::{INTERCONNECT_PROJECT_ID_LABEL, NETWORK_PROJECT_ID_LABEL};
use crds::{Link, LinkSpec, NetworkLink, ObjectReference, finalizers};
use kube_runtime::controller::Action;
use tracing::info;

/// Fabric Link wanted by `nl`
pub(crate) fn desired_link(nl: &NetworkLink) -> Link {
    let pair = link_name(&nl.spec.source_cluster_ref.name, &nl.spec.target_cluster_ref.name);
    let mut link = Link::new(
        &pair.name,
        LinkSpec {
            source_cluster_ref: ObjectReference::named(pair.source),
            target_cluster_ref: ObjectReference::named(pair.target),
        },
    );
    update_labels(
        &mut link,
        &[(INTERCONNECT_PROJECT_ID_LABEL, label(nl, NETWORK_PROJECT_ID_LABEL))],
    );
    link
}

impl Reconciler {
    pub async fn reconcile_network_link(&self, nl: &NetworkLink) -> Result<Action, ControllerError> {
        info!("Reconciling NetworkLink {}", ObjectKey::of(nl));

        if is_deleting(nl) {
            if has_finalizer(nl, finalizers::NETWORK_LINK) {
                let pair = link_name(&nl.spec.source_cluster_ref.name, &nl.spec.target_cluster_ref.name);
                unbind_owned(&*self.stores.links, &ObjectKey::cluster(pair.name), nl).await?;
                release_finalizer(&*self.stores.network_links, nl, finalizers::NETWORK_LINK).await?;
            }
            return Ok(Action::await_change());
        }

        if ensure_finalizer(&*self.stores.network_links, nl, finalizers::NETWORK_LINK)
            .await?
            .is_some()
        {
            return Ok(Action::await_change());
        }

        match bind_owned(&*self.stores.links, nl, desired_link(nl)).await? {
            Binding::Bound => Ok(Action::await_change()),
            Binding::ChildDeleting => Ok(Action::requeue(DEPENDENCY_WAIT)),
        }
    }
}
