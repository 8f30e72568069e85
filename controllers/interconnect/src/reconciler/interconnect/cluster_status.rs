//! ClusterStatus reconciler
//!
//! Keeps `Cluster.status.services` in step with the fabric Services placed on
//! the cluster, and with it the cluster's ingress: `LoadBalancer` while any
//! Service is exposed there, `None` once the last one is gone.

use super::super::{Reconciler, ensure_finalizer, release_finalizer, write_status};
use crate::config::DEPENDENCY_WAIT;
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crate::reconcile_helpers::{has_finalizer, is_deleting};
use crate::store::ObjectKey;
use crds::finalizers;
use crds::{Cluster, ClusterPhase, IngressType, LocalObjectReference, Service};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{debug, info};

impl Reconciler {
    pub async fn reconcile_cluster_status(&self, service: &Service) -> Result<Action, ControllerError> {
        let name = service.name_any();
        let cluster_name = &service.spec.cluster_ref.name;
        debug!("Reconciling status of Cluster {} for Service {}", cluster_name, name);

        let cluster = self
            .stores
            .clusters
            .get(&ObjectKey::cluster(cluster_name.as_str()))
            .await?;

        if is_deleting(service) {
            if !has_finalizer(service, finalizers::CLUSTER_STATUS) {
                return Ok(Action::await_change());
            }
            match cluster {
                Some(cluster) => self.remove_cluster_service(&cluster, &name).await?,
                None => info!("Cluster {} is gone, releasing Service {}", cluster_name, name),
            }
            release_finalizer(&*self.stores.services, service, finalizers::CLUSTER_STATUS).await?;
            return Ok(Action::await_change());
        }

        let Some(cluster) = cluster else {
            debug!("Cluster {} for Service {} not found yet", cluster_name, name);
            return Ok(Action::requeue(DEPENDENCY_WAIT));
        };

        ensure_finalizer(&*self.stores.services, service, finalizers::CLUSTER_STATUS).await?;
        self.add_cluster_service(&cluster, &name).await?;
        Ok(Action::await_change())
    }

    async fn add_cluster_service(&self, cluster: &Cluster, service: &str) -> Result<(), ControllerError> {
        let mut updated = cluster.clone();
        let status = updated.status_mut();
        let reference = LocalObjectReference::new(service);

        let mut changed = false;
        if let Err(pos) = status.services.binary_search(&reference) {
            status.services.insert(pos, reference);
            changed = true;
        }

        let enable_ingress = status.ingress != IngressType::LoadBalancer;
        if enable_ingress {
            status.ingress = IngressType::LoadBalancer;
            if !is_deleting(cluster) {
                status.phase = ClusterPhase::Configuring;
            }
            changed = true;
        }

        if !changed {
            return Ok(());
        }
        let written = write_status(&*self.stores.clusters, &updated).await?;
        if enable_ingress {
            info!(
                "Enabled LoadBalancer ingress on Cluster {} for Service {}",
                cluster.name_any(),
                service
            );
            self.record(
                &written,
                reasons::INGRESS_ENABLED,
                actions::RECONCILE,
                format!("Service {} needs LoadBalancer ingress", service),
            )
            .await;
        }
        Ok(())
    }

    async fn remove_cluster_service(&self, cluster: &Cluster, service: &str) -> Result<(), ControllerError> {
        let mut updated = cluster.clone();
        let status = updated.status_mut();
        let before = status.services.len();
        status.services.retain(|s| s.name != service);

        let mut changed = status.services.len() != before;
        if status.services.is_empty() && status.ingress != IngressType::None {
            status.ingress = IngressType::None;
            changed = true;
        }
        if !changed {
            return Ok(());
        }

        write_status(&*self.stores.clusters, &updated).await?;
        debug!("Removed Service {} from Cluster {}", service, cluster.name_any());
        Ok(())
    }
}
