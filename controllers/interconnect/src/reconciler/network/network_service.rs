//! NetworkService reconciler
//!
//! Binds every NetworkService to the fabric Service exposing the same member
//! service. The fabric Service is named after the cluster, not the network, so
//! networks exporting the same member service share it.

use super::super::{Reconciler, ensure_finalizer, release_finalizer};
use super::{Binding, bind_owned, unbind_owned};
use crate::config::DEPENDENCY_WAIT;
use crate::error::ControllerError;
use crate::naming::service_name;
use crate::reconcile_helpers::{has_finalizer, is_deleting, label, update_labels};
use crate::store::ObjectKey;
use crds::labels::{INTERCONNECT_PROJECT_ID_LABEL, NETWORK_NAME_LABEL, NETWORK_PROJECT_ID_LABEL};
use crds::{NetworkService, Service, ServiceSpec, finalizers};
use kube_runtime::controller::Action;
use tracing::info;

fn fabric_service_name(ns: &NetworkService) -> String {
    let cluster_ref = &ns.spec.cluster_ref;
    service_name(&cluster_ref.name, cluster_ref.namespace_or_empty(), &ns.spec.service_ref.name)
}

/// Fabric Service wanted by `ns`
pub(crate) fn desired_service(ns: &NetworkService) -> Service {
    let mut service = Service::new(
        &fabric_service_name(ns),
        ServiceSpec {
            cluster_ref: ns.spec.cluster_ref.clone(),
            service_ref: ns.spec.service_ref.clone(),
            expose_ports: ns.spec.expose_ports.clone(),
        },
    );
    update_labels(
        &mut service,
        &[
            (INTERCONNECT_PROJECT_ID_LABEL, label(ns, NETWORK_PROJECT_ID_LABEL)),
            (NETWORK_NAME_LABEL, ns.spec.network_ref.name.as_str()),
        ],
    );
    service
}

impl Reconciler {
    pub async fn reconcile_network_service(&self, ns: &NetworkService) -> Result<Action, ControllerError> {
        info!("Reconciling NetworkService {}", ObjectKey::of(ns));

        if is_deleting(ns) {
            if has_finalizer(ns, finalizers::NETWORK_SERVICE) {
                unbind_owned(&*self.stores.services, &ObjectKey::cluster(fabric_service_name(ns)), ns).await?;
                release_finalizer(&*self.stores.network_services, ns, finalizers::NETWORK_SERVICE).await?;
            }
            return Ok(Action::await_change());
        }

        if ensure_finalizer(&*self.stores.network_services, ns, finalizers::NETWORK_SERVICE)
            .await?
            .is_some()
        {
            return Ok(Action::await_change());
        }

        match bind_owned(&*self.stores.services, ns, desired_service(ns)).await? {
            Binding::Bound => Ok(Action::await_change()),
            Binding::ChildDeleting => Ok(Action::requeue(DEPENDENCY_WAIT)),
        }
    }
}
