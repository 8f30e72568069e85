//! Cluster reconciler
//!
//! Drives a member cluster's VAN site through
//! `Pending -> Configuring -> Running`, and `Terminating` on deletion.
//!
//! `Configuring` always starts by removing whatever site is installed. Once
//! the data plane reports nothing installed, the site is initialised with the
//! ingress recorded in the Cluster status. The ClusterStatus reconciler resets
//! the phase to `Configuring` whenever that ingress changes.

use super::super::{Reconciler, ensure_finalizer, release_finalizer, write_status};
use super::ingress_mode;
use crate::config::CONFIGURING_RECHECK;
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crate::reconcile_helpers::{has_finalizer, is_deleting, label};
use crds::finalizers;
use crds::labels::INTERCONNECT_PROJECT_ID_LABEL;
use crds::{Cluster, ClusterPhase};
use kube::{Config, ResourceExt};
use kube_runtime::controller::Action;
use tracing::{debug, info};

impl Reconciler {
    pub async fn reconcile_cluster(&self, cluster: &Cluster) -> Result<Action, ControllerError> {
        let name = cluster.name_any();
        info!("Reconciling Cluster {}", name);

        if is_deleting(cluster) {
            if !has_finalizer(cluster, finalizers::CLUSTER) {
                return Ok(Action::await_change());
            }
            if cluster.phase() != ClusterPhase::Terminating {
                self.set_cluster_phase(cluster, ClusterPhase::Terminating).await?;
                return Ok(Action::await_change());
            }
            return self.terminate_cluster(cluster).await;
        }

        if ensure_finalizer(&*self.stores.clusters, cluster, finalizers::CLUSTER)
            .await?
            .is_some()
        {
            return Ok(Action::await_change());
        }

        match cluster.phase() {
            ClusterPhase::Pending => {
                self.set_cluster_phase(cluster, ClusterPhase::Configuring).await?;
                self.record(
                    cluster,
                    reasons::SITE_CONFIGURING,
                    actions::RECONCILE,
                    format!("Configuring site with ingress {}", cluster.ingress()),
                )
                .await;
                Ok(Action::await_change())
            }
            ClusterPhase::Configuring => self.configure_site(cluster).await,
            ClusterPhase::Running | ClusterPhase::Terminating => {
                debug!("Cluster {} is {}, nothing to do", name, cluster.phase());
                Ok(Action::await_change())
            }
        }
    }

    async fn cluster_connection(&self, cluster: &Cluster) -> Result<Config, ControllerError> {
        self.connect(
            &cluster.spec.cluster_ref.name,
            label(cluster, INTERCONNECT_PROJECT_ID_LABEL),
        )
        .await
    }

    async fn configure_site(&self, cluster: &Cluster) -> Result<Action, ControllerError> {
        let name = cluster.name_any();
        let conn = self.cluster_connection(cluster).await?;

        match self.van.delete_site(&conn).await {
            Ok(()) => {
                info!(
                    "Removed existing site on cluster {}, checking again in {:?}",
                    name, CONFIGURING_RECHECK
                );
                Ok(Action::requeue(CONFIGURING_RECHECK))
            }
            Err(e) if e.is_not_installed() => {
                let ingress = cluster.ingress();
                self.van.init_site(&conn, ingress_mode(ingress)).await?;
                self.set_cluster_phase(cluster, ClusterPhase::Running).await?;
                self.record(
                    cluster,
                    reasons::SITE_READY,
                    actions::RECONCILE,
                    format!("Site installed with ingress {}", ingress),
                )
                .await;
                Ok(Action::await_change())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn terminate_cluster(&self, cluster: &Cluster) -> Result<Action, ControllerError> {
        let name = cluster.name_any();
        let conn = match self.cluster_connection(cluster).await {
            Ok(conn) => Some(conn),
            Err(e) if e.is_cluster_gone() => {
                info!("Cluster {} no longer exists, skipping site removal", name);
                self.record(
                    cluster,
                    reasons::CLUSTER_GONE,
                    actions::DELETE,
                    "Member cluster is gone, site left in place".to_string(),
                )
                .await;
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(conn) = conn {
            match self.van.delete_site(&conn).await {
                Ok(()) => info!("Removed site from cluster {}", name),
                Err(e) if e.is_not_installed() => debug!("No site installed on cluster {}", name),
                Err(e) => return Err(e.into()),
            }
            self.record(cluster, reasons::SITE_DELETED, actions::DELETE, "Site removed".to_string())
                .await;
        }

        release_finalizer(&*self.stores.clusters, cluster, finalizers::CLUSTER).await?;
        Ok(Action::await_change())
    }

    async fn set_cluster_phase(&self, cluster: &Cluster, phase: ClusterPhase) -> Result<Cluster, ControllerError> {
        let from = cluster.phase();
        let mut updated = cluster.clone();
        updated.status_mut().phase = phase;
        let written = write_status(&*self.stores.clusters, &updated).await?;
        info!("Cluster {} phase {} -> {}", cluster.name_any(), from, phase);
        Ok(written)
    }
}
