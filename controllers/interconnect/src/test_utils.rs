//! Test utilities for unit testing reconcilers
//!
//! [`TestContext`] wires a [`Reconciler`] to in-memory stores and the mock data
//! plane, member clusters and access provider, and keeps handles to all of them
//! for assertions. The `create_test_*` helpers build objects the way the
//! deployment manager and users would submit them.

use crate::events::RecordingEventPublisher;
use crate::member::{MemberService, MockMemberClusters};
use crate::reconciler::{MemoryStores, Reconciler};
use cluster_access::MockClusterAccess;
use crds::labels::{
    APP_PROJECT_ID_LABEL, DEPLOYMENT_ID_LABEL, EXPOSE_PORT_ANNOTATION, EXPOSE_PORTS_ANNOTATION,
    EXPOSE_SERVICE_ANNOTATION, HELM_RELEASE_NAME_ANNOTATION, INTERCONNECT_PROJECT_ID_LABEL, NETWORK_NAME_LABEL,
    NETWORK_PROJECT_ID_LABEL,
};
use crds::*;
use futures::channel::mpsc::{self, UnboundedReceiver};
use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec as MemberServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube_runtime::reflector::ObjectRef;
use std::collections::BTreeMap;
use std::sync::Arc;
use van_client::MockVanClient;

pub const PROJECT: &str = "project-1";
pub const PROJECT_NAMESPACE: &str = "proj";

/// A reconciler over in-memory collaborators
pub struct TestContext {
    pub memory: MemoryStores,
    pub van: MockVanClient,
    pub access: MockClusterAccess,
    pub members: MockMemberClusters,
    pub events: RecordingEventPublisher,
    pub member_events: UnboundedReceiver<ObjectRef<DeploymentCluster>>,
    pub reconciler: Arc<Reconciler>,
}

impl TestContext {
    pub fn new() -> Self {
        let memory = MemoryStores::new();
        let van = MockVanClient::new();
        let access = MockClusterAccess::new();
        let members = MockMemberClusters::new();
        let events = RecordingEventPublisher::new();
        let (tx, member_events) = mpsc::unbounded();
        let reconciler = Reconciler::new(
            memory.stores(),
            Arc::new(access.clone()),
            Arc::new(van.clone()),
            Arc::new(members.clone()),
            Arc::new(events.clone()),
            tx,
        );
        Self {
            memory,
            van,
            access,
            members,
            events,
            member_events,
            reconciler: Arc::new(reconciler),
        }
    }
}

fn labels(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    Some(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    )
}

/// Cluster labelled with the test project
pub fn create_test_cluster(name: &str) -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: labels(&[(INTERCONNECT_PROJECT_ID_LABEL, PROJECT)]),
            ..Default::default()
        },
        spec: ClusterSpec {
            cluster_ref: ObjectReference::namespaced(PROJECT_NAMESPACE, name),
        },
        status: None,
    }
}

/// Cluster with the given phase and ingress
pub fn create_test_cluster_with_status(name: &str, phase: ClusterPhase, ingress: IngressType) -> Cluster {
    let mut cluster = create_test_cluster(name);
    cluster.status = Some(ClusterStatus {
        phase,
        ingress,
        services: Vec::new(),
    });
    cluster
}

/// Link between `source` and `target`
pub fn create_test_link(name: &str, source: &str, target: &str) -> Link {
    Link {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: labels(&[(INTERCONNECT_PROJECT_ID_LABEL, PROJECT)]),
            ..Default::default()
        },
        spec: LinkSpec {
            source_cluster_ref: ObjectReference::named(source),
            target_cluster_ref: ObjectReference::named(target),
        },
        status: None,
    }
}

/// Fabric Service for `namespace/service` on `cluster`
pub fn create_test_service(name: &str, cluster: &str, namespace: &str, service: &str, ports: &[u16]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: labels(&[(INTERCONNECT_PROJECT_ID_LABEL, PROJECT)]),
            ..Default::default()
        },
        spec: crds::ServiceSpec {
            cluster_ref: ObjectReference::namespaced(PROJECT_NAMESPACE, cluster),
            service_ref: ObjectReference::namespaced(namespace, service),
            expose_ports: ports.iter().copied().map(ExposePort::from).collect(),
        },
        status: None,
    }
}

/// Deployment referencing `network`, labelled with the test project
pub fn create_test_deployment(name: &str, network: &str) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(PROJECT_NAMESPACE.to_string()),
            labels: labels(&[(APP_PROJECT_ID_LABEL, PROJECT)]),
            ..Default::default()
        },
        spec: DeploymentSpec {
            network_ref: ObjectReference::named(network),
        },
        status: None,
    }
}

/// DeploymentCluster of the Deployment with `deployment_uid` on `cluster`,
/// running apps `app_ids`
pub fn create_test_deployment_cluster(name: &str, deployment_uid: &str, cluster: &str, app_ids: &[&str]) -> DeploymentCluster {
    DeploymentCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(PROJECT_NAMESPACE.to_string()),
            labels: labels(&[(DEPLOYMENT_ID_LABEL, deployment_uid), (APP_PROJECT_ID_LABEL, PROJECT)]),
            ..Default::default()
        },
        spec: DeploymentClusterSpec {
            deployment_id: deployment_uid.to_string(),
            cluster_id: cluster.to_string(),
            namespace: PROJECT_NAMESPACE.to_string(),
        },
        status: Some(DeploymentClusterStatus {
            apps: app_ids
                .iter()
                .map(|id| DeploymentApp {
                    name: (*id).to_string(),
                    id: (*id).to_string(),
                })
                .collect(),
        }),
    }
}

/// NetworkCluster for `network` on `cluster`, labelled with the test project
pub fn create_test_network_cluster(network: &str, cluster: &str) -> NetworkCluster {
    NetworkCluster {
        metadata: ObjectMeta {
            name: Some(format!("{}-{}", network, cluster)),
            labels: labels(&[(NETWORK_NAME_LABEL, network), (NETWORK_PROJECT_ID_LABEL, PROJECT)]),
            ..Default::default()
        },
        spec: NetworkClusterSpec {
            network_ref: ObjectReference::named(network),
            cluster_ref: ObjectReference::namespaced(PROJECT_NAMESPACE, cluster),
        },
        status: None,
    }
}

/// NetworkCluster with a role and exported services
pub fn create_test_network_cluster_with_role(
    network: &str,
    cluster: &str,
    role: NetworkClusterRole,
    services: &[&str],
) -> NetworkCluster {
    let mut nc = create_test_network_cluster(network, cluster);
    nc.status = Some(NetworkClusterStatus {
        role,
        services: services.iter().map(|s| LocalObjectReference::new(*s)).collect(),
        ..Default::default()
    });
    nc
}

/// Member Service in `namespace` installed by Helm release `release`
pub fn create_test_member_service(namespace: &str, name: &str, release: &str, ports: &[i32]) -> MemberService {
    MemberService {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: labels(&[(HELM_RELEASE_NAME_ANNOTATION, release)]),
            ..Default::default()
        },
        spec: Some(MemberServiceSpec {
            ports: Some(
                ports
                    .iter()
                    .map(|port| ServicePort {
                        port: *port,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

/// Opt `service` into the fabric, optionally restricting it to `ports`
pub fn expose(mut service: MemberService, ports: Option<&str>) -> MemberService {
    let annotations = service.metadata.annotations.get_or_insert_with(BTreeMap::new);
    annotations.insert(EXPOSE_SERVICE_ANNOTATION.to_string(), "true".to_string());
    if let Some(ports) = ports {
        if ports.contains(',') {
            annotations.insert(EXPOSE_PORTS_ANNOTATION.to_string(), ports.to_string());
        } else {
            annotations.insert(EXPOSE_PORT_ANNOTATION.to_string(), ports.to_string());
        }
    }
    service
}
