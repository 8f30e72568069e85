//! DeploymentService reconciler
//!
//! Binds the exposable member-cluster Services of a DeploymentCluster to
//! NetworkServices. A member Service is exposable when its Helm release is one
//! of the DeploymentCluster's apps and it carries `expose-service: "true"`.
//!
//! Bound member Services carry the DeploymentService finalizer, so their
//! deletion is seen here and turned into the deletion of the NetworkService.

use super::super::{Reconciler, ensure_finalizer, release_finalizer};
use crate::config::{DEPENDENCY_WAIT, LABEL_WAIT};
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crate::member::MemberService;
use crate::naming::{network_cluster_name, network_service_name};
use crate::reconcile_helpers::{
    add_finalizer, add_owner_ref, has_finalizer, is_deleting, label, parse_expose_ports, remove_finalizer,
    update_labels, write_failed,
};
use crate::store::ObjectKey;
use crds::labels::{
    APP_PROJECT_ID_LABEL, CLUSTER_NAME_LABEL, CLUSTER_NAMESPACE_LABEL, EXPOSE_SERVICE_ANNOTATION,
    HELM_RELEASE_NAME_ANNOTATION, NETWORK_NAME_LABEL, NETWORK_PROJECT_ID_LABEL,
};
use crds::{DeploymentCluster, ExposePort, NetworkCluster, NetworkService, NetworkServiceSpec, ObjectReference, finalizers};
use kube::{Config, ResourceExt};
use kube_runtime::controller::Action;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// `service` belongs to one of `apps` and asks to be exposed
pub(crate) fn is_eligible(service: &MemberService, apps: &BTreeSet<&str>) -> bool {
    let annotations = service.annotations();
    annotations
        .get(HELM_RELEASE_NAME_ANNOTATION)
        .is_some_and(|release| apps.contains(release.as_str()))
        && annotations.get(EXPOSE_SERVICE_ANNOTATION).map(String::as_str) == Some("true")
}

/// Ports every port of `service` exposes
fn service_ports(service: &MemberService) -> Vec<ExposePort> {
    service
        .spec
        .iter()
        .flat_map(|spec| spec.ports.iter().flatten())
        .map(|p| ExposePort { port: p.port })
        .collect()
}

/// Ports to expose for `service`: the annotated ports, or every port of the
/// Service when none are annotated
pub(crate) fn expose_ports(service: &MemberService) -> Result<Vec<ExposePort>, std::num::ParseIntError> {
    let annotated = parse_expose_ports(service.annotations())?;
    if annotated.is_empty() {
        return Ok(service_ports(service));
    }
    Ok(annotated.into_iter().map(ExposePort::from).collect())
}

/// Project a DeploymentCluster's cluster is reached under: the NetworkCluster's
/// project, else the DeploymentCluster's own
fn project_id<'a>(dc: &'a DeploymentCluster, nc: Option<&'a NetworkCluster>) -> &'a str {
    match nc.map(|nc| label(nc, NETWORK_PROJECT_ID_LABEL)) {
        Some(project) if !project.is_empty() => project,
        _ => label(dc, APP_PROJECT_ID_LABEL),
    }
}

fn member_key(service: &MemberService) -> String {
    format!("{}/{}", service.namespace().unwrap_or_default(), service.name_any())
}

impl Reconciler {
    pub async fn reconcile_deployment_service(&self, dc: &DeploymentCluster) -> Result<Action, ControllerError> {
        let key = ObjectKey::of(dc);
        info!("Reconciling Services of DeploymentCluster {}", key);

        if is_deleting(dc) {
            if !has_finalizer(dc, finalizers::DEPLOYMENT_SERVICE) {
                return Ok(Action::await_change());
            }
            self.unbind_services(dc).await?;
            self.service_watcher.unwatch(dc);
            release_finalizer(&*self.stores.deployment_clusters, dc, finalizers::DEPLOYMENT_SERVICE).await?;
            return Ok(Action::await_change());
        }

        if ensure_finalizer(&*self.stores.deployment_clusters, dc, finalizers::DEPLOYMENT_SERVICE)
            .await?
            .is_some()
        {
            return Ok(Action::await_change());
        }

        self.bind_services(dc).await
    }

    async fn bind_services(&self, dc: &DeploymentCluster) -> Result<Action, ControllerError> {
        let key = ObjectKey::of(dc);
        let network = label(dc, NETWORK_NAME_LABEL);
        if network.is_empty() {
            debug!("DeploymentCluster {} has no network yet", key);
            return Ok(Action::await_change());
        }

        let nc_key = ObjectKey::cluster(network_cluster_name(network, &dc.spec.cluster_id));
        let Some(nc) = self.stores.network_clusters.get(&nc_key).await? else {
            debug!("NetworkCluster {} of DeploymentCluster {} does not exist yet", nc_key, key);
            return Ok(Action::requeue(DEPENDENCY_WAIT));
        };

        let project = project_id(dc, Some(&nc));
        if project.is_empty() {
            info!("DeploymentCluster {} has no project id yet, retrying in {:?}", key, LABEL_WAIT);
            return Ok(Action::requeue(LABEL_WAIT));
        }

        let conn = self.connect(&dc.spec.cluster_id, project).await?;
        self.service_watcher.watch(dc, &conn);

        let services = match self.members.list_services(&conn).await {
            Ok(services) => services,
            Err(e) if e.is_missing_kind() => {
                warn!("Cluster {} does not serve Services yet: {}", dc.spec.cluster_id, e);
                return Ok(Action::requeue(DEPENDENCY_WAIT));
            }
            Err(e) => return Err(e.into()),
        };

        let apps: BTreeSet<&str> = dc.app_ids().collect();
        for service in services.iter().filter(|s| is_eligible(s, &apps)) {
            self.bind_service(dc, &nc, network, &conn, service).await?;
        }
        Ok(Action::await_change())
    }

    async fn bind_service(
        &self,
        dc: &DeploymentCluster,
        nc: &NetworkCluster,
        network: &str,
        conn: &Config,
        service: &MemberService,
    ) -> Result<(), ControllerError> {
        let svc_namespace = service.namespace().unwrap_or_default();
        let svc_name = service.name_any();
        let name = network_service_name(network, &nc.spec.cluster_ref.name, &svc_namespace, &svc_name);
        let ns_key = ObjectKey::cluster(&name);
        let existing = self.stores.network_services.get(&ns_key).await?;

        if is_deleting(service) {
            if existing.is_some() {
                self.stores
                    .network_services
                    .delete(&ns_key)
                    .await
                    .map_err(|e| write_failed(&format!("NetworkService {}", name), e))?;
                info!("Deleted NetworkService {} for removed Service {}", name, member_key(service));
            }
            return self.release_member_service(conn, service).await;
        }

        if existing.is_some() {
            return self.hold_member_service(conn, service).await;
        }

        let ports = match expose_ports(service) {
            Ok(ports) => ports,
            Err(e) => {
                warn!("Skipping Service {}: invalid expose ports: {}", member_key(service), e);
                self.warn(
                    dc,
                    reasons::INVALID_EXPOSE_PORTS,
                    actions::RECONCILE,
                    format!("Service {} has invalid expose ports: {}", member_key(service), e),
                )
                .await;
                return Ok(());
            }
        };
        self.hold_member_service(conn, service).await?;

        let cluster_ref = &nc.spec.cluster_ref;
        let mut ns = NetworkService::new(
            &name,
            NetworkServiceSpec {
                network_ref: ObjectReference::named(network),
                cluster_ref: cluster_ref.clone(),
                service_ref: ObjectReference::namespaced(svc_namespace.clone(), svc_name.clone()),
                expose_ports: ports,
            },
        );
        update_labels(
            &mut ns,
            &[
                (NETWORK_NAME_LABEL, network),
                (CLUSTER_NAMESPACE_LABEL, cluster_ref.namespace_or_empty()),
                (CLUSTER_NAME_LABEL, cluster_ref.name.as_str()),
                (NETWORK_PROJECT_ID_LABEL, label(nc, NETWORK_PROJECT_ID_LABEL)),
            ],
        );
        add_owner_ref(&mut ns, nc);

        match self.stores.network_services.create(&ns).await {
            Ok(_) => info!(
                "Created NetworkService {} for Service {} on cluster {}",
                name,
                member_key(service),
                cluster_ref.name
            ),
            Err(e) if e.is_already_exists() => debug!("NetworkService {} was created concurrently", name),
            Err(e) => return Err(write_failed(&format!("NetworkService {}", name), e).into()),
        }
        Ok(())
    }

    /// Put the DeploymentService finalizer on a member Service
    async fn hold_member_service(&self, conn: &Config, service: &MemberService) -> Result<(), ControllerError> {
        let mut updated = service.clone();
        if !add_finalizer(&mut updated, finalizers::DEPLOYMENT_SERVICE) {
            return Ok(());
        }
        self.members.update_service(conn, &updated).await?;
        debug!("Added finalizer to Service {}", member_key(service));
        Ok(())
    }

    /// Take the DeploymentService finalizer off a member Service
    async fn release_member_service(&self, conn: &Config, service: &MemberService) -> Result<(), ControllerError> {
        let mut updated = service.clone();
        if !remove_finalizer(&mut updated, finalizers::DEPLOYMENT_SERVICE) {
            return Ok(());
        }
        match self.members.update_service(conn, &updated).await {
            Ok(_) => debug!("Removed finalizer from Service {}", member_key(service)),
            Err(e) if e.is_not_found() => debug!("Service {} already gone", member_key(service)),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Delete the NetworkServices of `dc`'s network and cluster and release the
    /// member Services of its apps
    async fn unbind_services(&self, dc: &DeploymentCluster) -> Result<(), ControllerError> {
        let network = label(dc, NETWORK_NAME_LABEL);
        if network.is_empty() {
            return Ok(());
        }

        let bound = self
            .stores
            .network_services
            .list(&[
                (NETWORK_NAME_LABEL, network),
                (CLUSTER_NAMESPACE_LABEL, dc.spec.namespace.as_str()),
                (CLUSTER_NAME_LABEL, dc.spec.cluster_id.as_str()),
            ])
            .await?;
        for ns in &bound {
            let ns_key = ObjectKey::of(ns);
            self.stores
                .network_services
                .delete(&ns_key)
                .await
                .map_err(|e| write_failed(&format!("NetworkService {}", ns_key), e))?;
            info!("Deleted NetworkService {} of DeploymentCluster {}", ns_key, ObjectKey::of(dc));
        }

        let nc_key = ObjectKey::cluster(network_cluster_name(network, &dc.spec.cluster_id));
        let nc = self.stores.network_clusters.get(&nc_key).await?;
        let project = project_id(dc, nc.as_ref());
        if project.is_empty() {
            warn!(
                "DeploymentCluster {} has no project id, not releasing Services on cluster {}",
                ObjectKey::of(dc),
                dc.spec.cluster_id
            );
            return Ok(());
        }
        let conn = match self.connect(&dc.spec.cluster_id, project).await {
            Ok(conn) => conn,
            Err(e) if e.is_cluster_gone() => {
                info!("Cluster {} no longer exists, not releasing its Services", dc.spec.cluster_id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let services = match self.members.list_services(&conn).await {
            Ok(services) => services,
            Err(e) if e.is_missing_kind() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let apps: BTreeSet<&str> = dc.app_ids().collect();
        for service in services.iter().filter(|s| is_eligible(s, &apps)) {
            self.release_member_service(&conn, service).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_member_service, expose};

    #[test]
    fn test_eligibility_needs_release_and_annotation() {
        let apps = BTreeSet::from(["app-a"]);

        let plain = create_test_member_service("default", "web", "app-a", &[80]);
        assert!(!is_eligible(&plain, &apps));
        assert!(is_eligible(&expose(plain, None), &apps));

        let foreign = expose(create_test_member_service("default", "db", "app-b", &[5432]), None);
        assert!(!is_eligible(&foreign, &apps));
    }

    #[test]
    fn test_expose_service_must_be_true() {
        let apps = BTreeSet::from(["app-a"]);
        let mut service = expose(create_test_member_service("default", "web", "app-a", &[80]), None);
        service
            .metadata
            .annotations
            .as_mut()
            .unwrap()
            .insert(EXPOSE_SERVICE_ANNOTATION.to_string(), "yes".to_string());
        assert!(!is_eligible(&service, &apps));
    }

    #[test]
    fn test_expose_ports_annotation_wins() {
        let service = expose(create_test_member_service("default", "web", "app-a", &[80, 443]), Some("8080"));
        assert_eq!(expose_ports(&service).unwrap(), vec![ExposePort { port: 8080 }]);

        let service = expose(create_test_member_service("default", "web", "app-a", &[80]), Some("81,82"));
        assert_eq!(
            expose_ports(&service).unwrap(),
            vec![ExposePort { port: 81 }, ExposePort { port: 82 }]
        );
    }

    #[test]
    fn test_expose_ports_falls_back_to_spec() {
        let service = expose(create_test_member_service("default", "web", "app-a", &[80, 8080]), None);
        assert_eq!(
            expose_ports(&service).unwrap(),
            vec![ExposePort { port: 80 }, ExposePort { port: 8080 }]
        );
    }

    #[test]
    fn test_invalid_expose_port_is_an_error() {
        let service = expose(create_test_member_service("default", "web", "app-a", &[80]), Some("http"));
        assert!(expose_ports(&service).is_err());

        let service = expose(create_test_member_service("default", "web", "app-a", &[80]), Some("70000"));
        assert!(expose_ports(&service).is_err());
    }
}
