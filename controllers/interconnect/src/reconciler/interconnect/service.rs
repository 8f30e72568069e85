//! Service reconciler
//!
//! Exposes a member-cluster Service on the fabric:
//! `Pending -> Exposing -> Exposed`, and `Unexposing` on deletion.

use super::super::{Reconciler, ensure_finalizer, release_finalizer, write_status};
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crate::reconcile_helpers::{has_finalizer, is_deleting, label};
use crds::labels::INTERCONNECT_PROJECT_ID_LABEL;
use crds::{FABRIC_NAMESPACE, Service, ServicePhase, finalizers};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{debug, info};
use van_client::interface::TARGET_TYPE_SERVICE;

/// Name the data plane knows the member Service by: `name.namespace`, or just
/// `name` inside the fabric namespace
pub fn target_name(service: &Service) -> String {
    let reference = &service.spec.service_ref;
    match reference.namespace.as_deref() {
        Some(ns) if !ns.is_empty() && ns != FABRIC_NAMESPACE => format!("{}.{}", reference.name, ns),
        _ => reference.name.clone(),
    }
}

impl Reconciler {
    pub async fn reconcile_service(&self, service: &Service) -> Result<Action, ControllerError> {
        let name = service.name_any();
        info!("Reconciling Service {}", name);

        if is_deleting(service) {
            if !has_finalizer(service, finalizers::SERVICE) {
                return Ok(Action::await_change());
            }
            if service.phase() != ServicePhase::Unexposing {
                self.set_service_phase(service, ServicePhase::Unexposing).await?;
                return Ok(Action::await_change());
            }
            return self.unexpose(service).await;
        }

        if ensure_finalizer(&*self.stores.services, service, finalizers::SERVICE)
            .await?
            .is_some()
        {
            return Ok(Action::await_change());
        }

        match service.phase() {
            ServicePhase::Pending => {
                self.set_service_phase(service, ServicePhase::Exposing).await?;
                self.record(
                    service,
                    reasons::EXPOSING,
                    actions::RECONCILE,
                    format!("Exposing {} on {}", target_name(service), service.spec.cluster_ref.name),
                )
                .await;
                Ok(Action::await_change())
            }
            ServicePhase::Exposing => self.expose(service).await,
            ServicePhase::Exposed | ServicePhase::Unexposing => {
                debug!("Service {} is {}, nothing to do", name, service.phase());
                Ok(Action::await_change())
            }
        }
    }

    async fn expose(&self, service: &Service) -> Result<Action, ControllerError> {
        let cluster = &service.spec.cluster_ref.name;
        let conn = self
            .connect(cluster, label(service, INTERCONNECT_PROJECT_ID_LABEL))
            .await?;
        let target = target_name(service);
        let address = &service.spec.service_ref.name;
        let ports = service.port_numbers();

        self.van
            .expose_service(&conn, &target, TARGET_TYPE_SERVICE, address, &ports)
            .await?;
        info!("Exposed {} on cluster {} as {} {:?}", target, cluster, address, ports);

        self.set_service_phase(service, ServicePhase::Exposed).await?;
        self.record(
            service,
            reasons::EXPOSED,
            actions::RECONCILE,
            format!("{} exposed as {}", target, address),
        )
        .await;
        Ok(Action::await_change())
    }

    async fn unexpose(&self, service: &Service) -> Result<Action, ControllerError> {
        let name = service.name_any();
        let cluster = &service.spec.cluster_ref.name;
        let target = target_name(service);
        let address = &service.spec.service_ref.name;

        match self
            .connect(cluster, label(service, INTERCONNECT_PROJECT_ID_LABEL))
            .await
        {
            Ok(conn) => match self
                .van
                .unexpose_service(&conn, &target, TARGET_TYPE_SERVICE, address)
                .await
            {
                Ok(()) => info!("Unexposed {} from cluster {}", target, cluster),
                Err(e) if e.is_no_interfaces() || e.is_not_installed() => {
                    debug!("Service {} already unexposed: {}", name, e)
                }
                Err(e) => return Err(e.into()),
            },
            Err(e) if e.is_cluster_gone() => {
                info!("Cluster {} no longer exists, skipping unexpose of {}", cluster, name)
            }
            Err(e) => return Err(e),
        }

        release_finalizer(&*self.stores.services, service, finalizers::SERVICE).await?;
        self.record(
            service,
            reasons::UNEXPOSED,
            actions::DELETE,
            format!("{} unexposed", target),
        )
        .await;
        Ok(Action::await_change())
    }

    async fn set_service_phase(&self, service: &Service, phase: ServicePhase) -> Result<Service, ControllerError> {
        let from = service.phase();
        let mut updated = service.clone();
        updated.status_mut().phase = phase;
        let written = write_status(&*self.stores.services, &updated).await?;
        info!("Service {} phase {} -> {}", service.name_any(), from, phase);
        Ok(written)
    }
}
