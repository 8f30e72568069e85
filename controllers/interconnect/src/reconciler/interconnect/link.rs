//! Link reconciler
//!
//! Establishes the data-plane link between the two clusters of a Link:
//! `Pending -> Linking -> Linked`, and `Unlinking` on deletion.
//!
//! The issuer of the claim token is whichever side has LoadBalancer ingress,
//! the source when both do. The other side redeems it with `CreateLink`.

use super::super::{Reconciler, ensure_finalizer, release_finalizer, write_status};
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crate::reconcile_helpers::{has_finalizer, is_deleting, label};
use crate::store::ObjectKey;
use crds::finalizers;
use crds::labels::INTERCONNECT_PROJECT_ID_LABEL;
use crds::{Cluster, ClusterPhase, IngressType, Link, LinkPhase};
use kube::{Config, ResourceExt};
use kube_runtime::controller::Action;
use tracing::{debug, info};

/// Which end of a Link issues the claim token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Issuer {
    Source,
    Target,
}

/// Issuer for a link between `source` and `target`, if either accepts links
pub(crate) fn choose_issuer(source: IngressType, target: IngressType) -> Option<Issuer> {
    match (source, target) {
        (IngressType::LoadBalancer, _) => Some(Issuer::Source),
        (_, IngressType::LoadBalancer) => Some(Issuer::Target),
        _ => None,
    }
}

impl Reconciler {
    pub async fn reconcile_link(&self, link: &Link) -> Result<Action, ControllerError> {
        let name = link.name_any();
        info!("Reconciling Link {}", name);

        if is_deleting(link) {
            if !has_finalizer(link, finalizers::LINK) {
                return Ok(Action::await_change());
            }
            if link.phase() != LinkPhase::Unlinking {
                self.set_link_phase(link, LinkPhase::Unlinking).await?;
                return Ok(Action::await_change());
            }
            return self.unlink(link).await;
        }

        if ensure_finalizer(&*self.stores.links, link, finalizers::LINK)
            .await?
            .is_some()
        {
            return Ok(Action::await_change());
        }

        match link.phase() {
            LinkPhase::Pending => {
                self.set_link_phase(link, LinkPhase::Linking).await?;
                self.record(
                    link,
                    reasons::LINKING,
                    actions::RECONCILE,
                    format!(
                        "Linking {} and {}",
                        link.spec.source_cluster_ref.name, link.spec.target_cluster_ref.name
                    ),
                )
                .await;
                Ok(Action::await_change())
            }
            LinkPhase::Linking => self.establish_link(link).await,
            LinkPhase::Linked | LinkPhase::Unlinking => {
                debug!("Link {} is {}, nothing to do", name, link.phase());
                Ok(Action::await_change())
            }
        }
    }

    async fn link_cluster(&self, cluster: &str) -> Result<Option<Cluster>, ControllerError> {
        Ok(self.stores.clusters.get(&ObjectKey::cluster(cluster)).await?)
    }

    async fn establish_link(&self, link: &Link) -> Result<Action, ControllerError> {
        let name = link.name_any();
        let project = label(link, INTERCONNECT_PROJECT_ID_LABEL);
        let source_id = &link.spec.source_cluster_ref.name;
        let target_id = &link.spec.target_cluster_ref.name;

        let (Some(source), Some(target)) = (self.link_cluster(source_id).await?, self.link_cluster(target_id).await?)
        else {
            debug!("Link {} waiting for Clusters {} and {}", name, source_id, target_id);
            return Ok(Action::await_change());
        };

        let Some(issuer) = choose_issuer(source.ingress(), target.ingress()) else {
            info!(
                "Neither {} nor {} has LoadBalancer ingress, Link {} waits",
                source_id, target_id, name
            );
            self.record(
                link,
                reasons::NO_ISSUER,
                actions::RECONCILE,
                "No cluster can issue a link token yet".to_string(),
            )
            .await;
            return Ok(Action::await_change());
        };

        if source.phase() != ClusterPhase::Running || target.phase() != ClusterPhase::Running {
            debug!(
                "Link {} waiting for sites: {} is {}, {} is {}",
                name,
                source_id,
                source.phase(),
                target_id,
                target.phase()
            );
            return Ok(Action::await_change());
        }

        let source_conn = self.connect(source_id, project).await?;
        let target_conn = self.connect(target_id, project).await?;
        let (issuer_id, issuer_conn, redeemer_id, redeemer_conn) = match issuer {
            Issuer::Source => (source_id, &source_conn, target_id, &target_conn),
            Issuer::Target => (target_id, &target_conn, source_id, &source_conn),
        };

        let secret = self.van.create_token_claim(issuer_conn, &name).await?;
        self.van.create_link(redeemer_conn, &secret, &name).await?;
        info!("Linked {} to issuer {} as {}", redeemer_id, issuer_id, name);

        self.set_link_phase(link, LinkPhase::Linked).await?;
        self.record(
            link,
            reasons::LINKED,
            actions::RECONCILE,
            format!("{} linked to {}", redeemer_id, issuer_id),
        )
        .await;
        Ok(Action::await_change())
    }

    /// Connection to one end of a Link being removed; `None` once the cluster is gone
    async fn unlink_connection(&self, cluster_id: &str, project: &str) -> Result<Option<Config>, ControllerError> {
        match self.connect(cluster_id, project).await {
            Ok(conn) => Ok(Some(conn)),
            Err(e) if e.is_cluster_gone() => {
                info!("Cluster {} no longer exists, skipping link removal", cluster_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn unlink(&self, link: &Link) -> Result<Action, ControllerError> {
        let name = link.name_any();
        let project = label(link, INTERCONNECT_PROJECT_ID_LABEL);

        let source = self
            .unlink_connection(&link.spec.source_cluster_ref.name, project)
            .await?;
        let target = self
            .unlink_connection(&link.spec.target_cluster_ref.name, project)
            .await?;

        if let (Some(source), Some(target)) = (source, target) {
            match self.van.delete_link(&source, &target, &name).await {
                Ok(()) => info!("Removed link {}", name),
                Err(e) if e.is_no_such_link() || e.is_not_installed() => {
                    debug!("Link {} already absent: {}", name, e)
                }
                Err(e) => return Err(e.into()),
            }
        }

        release_finalizer(&*self.stores.links, link, finalizers::LINK).await?;
        self.record(link, reasons::UNLINKED, actions::DELETE, "Link removed".to_string())
            .await;
        Ok(Action::await_change())
    }

    async fn set_link_phase(&self, link: &Link, phase: LinkPhase) -> Result<Link, ControllerError> {
        let from = link.phase();
        let mut updated = link.clone();
        updated.status_mut().phase = phase;
        let written = write_status(&*self.stores.links, &updated).await?;
        info!("Link {} phase {} -> {}", link.name_any(), from, phase);
        Ok(written)
    }
}
