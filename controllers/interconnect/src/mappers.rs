//! Secondary watch mappers
//!
//! Each function maps a changed secondary object to the primary objects whose
//! reconcile depends on it. Mappers that search take the primary controller's
//! reflector snapshot; mappers that follow owner references need nothing else.

use crate::indexes::IndexFields;
use crate::reconcile_helpers::owner_names;
use crds::{
    Cluster, Deployment, DeploymentCluster, Link, Network, NetworkCluster, NetworkClusterRole, NetworkLink,
    NetworkService, Service,
};
use kube::{Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;

fn refs<K>(objects: impl Iterator<Item = Arc<K>>) -> Vec<ObjectRef<K>>
where
    K: Resource<DynamicType = ()>,
{
    objects.map(|obj| ObjectRef::from_obj(&*obj)).collect()
}

/// Cluster-scoped owners of kind `O`
pub fn owners<K: Resource, O: Resource<DynamicType = ()>>(obj: &K) -> Vec<ObjectRef<O>> {
    owner_names::<K, O>(obj).map(ObjectRef::new).collect()
}

/// DeploymentCluster -> its Deployment
pub fn deployment_for_cluster(deployments: &[Arc<Deployment>], dc: &DeploymentCluster) -> Vec<ObjectRef<Deployment>> {
    let Some(uid) = dc.deployment_uid() else {
        return Vec::new();
    };
    refs(
        deployments
            .iter()
            .filter(|d| d.deployment_uid() == Some(uid))
            .cloned(),
    )
}

/// Network -> Deployments referencing it
pub fn deployments_for_network(deployments: &[Arc<Deployment>], network: &Network) -> Vec<ObjectRef<Deployment>> {
    let name = network.name_any();
    refs(
        deployments
            .iter()
            .filter(|d| d.network_name() == Some(name.as_str()))
            .cloned(),
    )
}

/// Deployment -> its DeploymentClusters
pub fn clusters_for_deployment(
    clusters: &[Arc<DeploymentCluster>],
    deployment: &Deployment,
) -> Vec<ObjectRef<DeploymentCluster>> {
    let Some(uid) = deployment.deployment_uid() else {
        return Vec::new();
    };
    refs(
        clusters
            .iter()
            .filter(|dc| dc.deployment_uid() == Some(uid))
            .cloned(),
    )
}

/// Network -> DeploymentClusters labelled with it
pub fn clusters_for_network(clusters: &[Arc<DeploymentCluster>], network: &Network) -> Vec<ObjectRef<DeploymentCluster>> {
    let name = network.name_any();
    refs(
        clusters
            .iter()
            .filter(|dc| dc.network_name() == Some(name.as_str()))
            .cloned(),
    )
}

/// NetworkCluster -> DeploymentClusters placed on the same network and cluster
pub fn clusters_for_network_cluster(
    clusters: &[Arc<DeploymentCluster>],
    nc: &NetworkCluster,
) -> Vec<ObjectRef<DeploymentCluster>> {
    refs(
        clusters
            .iter()
            .filter(|dc| {
                dc.network_name().is_some()
                    && dc.network_name() == nc.network_name()
                    && dc.cluster_namespace() == nc.cluster_namespace()
                    && dc.cluster_name() == nc.cluster_name()
            })
            .cloned(),
    )
}

/// NetworkCluster -> NetworkServices of the same network and cluster
pub fn services_for_network_cluster(services: &[Arc<NetworkService>], nc: &NetworkCluster) -> Vec<ObjectRef<NetworkService>> {
    refs(
        services
            .iter()
            .filter(|ns| {
                ns.network_name().is_some()
                    && ns.network_name() == nc.network_name()
                    && ns.cluster_name() == nc.cluster_name()
            })
            .cloned(),
    )
}

/// NetworkCluster -> the other Hubs of its network
pub fn hubs_for_network_cluster(clusters: &[Arc<NetworkCluster>], nc: &NetworkCluster) -> Vec<ObjectRef<NetworkCluster>> {
    let name = nc.name_any();
    refs(
        clusters
            .iter()
            .filter(|other| {
                other.name_any() != name
                    && other.role() == NetworkClusterRole::Hub
                    && other.network_name().is_some()
                    && other.network_name() == nc.network_name()
            })
            .cloned(),
    )
}

/// NetworkLink -> the hub NetworkCluster that owns it
pub fn hub_for_network_link(link: &NetworkLink) -> Vec<ObjectRef<NetworkCluster>> {
    owners::<_, NetworkCluster>(link)
}

/// Cluster -> NetworkClusters owning it
pub fn network_clusters_for_cluster(cluster: &Cluster) -> Vec<ObjectRef<NetworkCluster>> {
    owners::<_, NetworkCluster>(cluster)
}

/// Link -> NetworkLinks owning it
pub fn network_links_for_link(link: &Link) -> Vec<ObjectRef<NetworkLink>> {
    owners::<_, NetworkLink>(link)
}

/// Fabric Service -> NetworkServices owning it
pub fn network_services_for_service(service: &Service) -> Vec<ObjectRef<NetworkService>> {
    owners::<_, NetworkService>(service)
}

/// Cluster -> Links with the cluster at either end
pub fn links_for_cluster(links: &[Arc<Link>], cluster: &Cluster) -> Vec<ObjectRef<Link>> {
    let name = cluster.name_any();
    refs(
        links
            .iter()
            .filter(|l| l.source_name() == Some(name.as_str()) || l.target_name() == Some(name.as_str()))
            .cloned(),
    )
}
