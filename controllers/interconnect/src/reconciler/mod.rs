//! Reconciliation logic for the interconnect fabric.
//!
//! This module is organized by API group:
//! - `network`: topology reconcilers deriving NetworkClusters, NetworkLinks and
//!   NetworkServices from Deployments, then the interconnect resources from those
//! - `interconnect`: per-cluster reconcilers driving Clusters, Links and Services
//!   against the VAN data plane

pub mod interconnect;
pub mod network;

use crate::backoff::RateLimiter;
use crate::error::ControllerError;
use crate::events::EventPublisher;
use crate::member::MemberClusterClient;
use crate::reconcile_helpers::{add_finalizer, ignore_not_found, remove_finalizer, write_failed};
use crate::service_watcher::ServiceWatcher;
use crate::store::{KubeStore, MemoryStore, ObjectKey, ObjectStore, StoredObject};
use cluster_access::ClusterAccessProvider;
use crds::{
    Cluster, Deployment, DeploymentCluster, Link, Network, NetworkCluster, NetworkLink, NetworkService, Service,
};
use futures::channel::mpsc::UnboundedSender;
use kube::runtime::events::EventType;
use kube::{Client, Config, Resource};
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use tracing::debug;
use van_client::VanClientTrait;

/// One store per kind the reconcilers read or write
#[derive(Clone)]
pub struct Stores {
    pub networks: Arc<dyn ObjectStore<Network>>,
    pub network_clusters: Arc<dyn ObjectStore<NetworkCluster>>,
    pub network_links: Arc<dyn ObjectStore<NetworkLink>>,
    pub network_services: Arc<dyn ObjectStore<NetworkService>>,
    pub clusters: Arc<dyn ObjectStore<Cluster>>,
    pub links: Arc<dyn ObjectStore<Link>>,
    pub services: Arc<dyn ObjectStore<Service>>,
    pub deployments: Arc<dyn ObjectStore<Deployment>>,
    pub deployment_clusters: Arc<dyn ObjectStore<DeploymentCluster>>,
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

impl Stores {
    /// Stores backed by the Kubernetes API
    pub fn kube(client: &Client) -> Self {
        Self {
            networks: Arc::new(KubeStore::<Network>::cluster_scoped(client.clone())),
            network_clusters: Arc::new(KubeStore::<NetworkCluster>::cluster_scoped(client.clone())),
            network_links: Arc::new(KubeStore::<NetworkLink>::cluster_scoped(client.clone())),
            network_services: Arc::new(KubeStore::<NetworkService>::cluster_scoped(client.clone())),
            clusters: Arc::new(KubeStore::<Cluster>::cluster_scoped(client.clone())),
            links: Arc::new(KubeStore::<Link>::cluster_scoped(client.clone())),
            services: Arc::new(KubeStore::<Service>::cluster_scoped(client.clone())),
            deployments: Arc::new(KubeStore::<Deployment>::namespaced(client.clone())),
            deployment_clusters: Arc::new(KubeStore::<DeploymentCluster>::namespaced(client.clone())),
        }
    }
}

/// In-memory stores for every kind, shared with the [`Stores`] they hand out
#[derive(Debug, Clone, Default)]
pub struct MemoryStores {
    pub networks: MemoryStore<Network>,
    pub network_clusters: MemoryStore<NetworkCluster>,
    pub network_links: MemoryStore<NetworkLink>,
    pub network_services: MemoryStore<NetworkService>,
    pub clusters: MemoryStore<Cluster>,
    pub links: MemoryStore<Link>,
    pub services: MemoryStore<Service>,
    pub deployments: MemoryStore<Deployment>,
    pub deployment_clusters: MemoryStore<DeploymentCluster>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(&self) -> Stores {
        Stores {
            networks: Arc::new(self.networks.clone()),
            network_clusters: Arc::new(self.network_clusters.clone()),
            network_links: Arc::new(self.network_links.clone()),
            network_services: Arc::new(self.network_services.clone()),
            clusters: Arc::new(self.clusters.clone()),
            links: Arc::new(self.links.clone()),
            services: Arc::new(self.services.clone()),
            deployments: Arc::new(self.deployments.clone()),
            deployment_clusters: Arc::new(self.deployment_clusters.clone()),
        }
    }

    /// Writes across every store
    pub fn write_count(&self) -> usize {
        self.networks.write_count()
            + self.network_clusters.write_count()
            + self.network_links.write_count()
            + self.network_services.write_count()
            + self.clusters.write_count()
            + self.links.write_count()
            + self.services.write_count()
            + self.deployments.write_count()
            + self.deployment_clusters.write_count()
    }
}

/// Reconciles network and interconnect resources.
pub struct Reconciler {
    pub(crate) stores: Stores,
    pub(crate) access: Arc<dyn ClusterAccessProvider>,
    pub(crate) van: Arc<dyn VanClientTrait>,
    pub(crate) members: Arc<dyn MemberClusterClient>,
    pub(crate) service_watcher: ServiceWatcher,
    pub(crate) events: Arc<dyn EventPublisher>,
    pub(crate) limiter: RateLimiter,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("service_watcher", &self.service_watcher)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Member-cluster Service events for DeploymentClusters are sent on `member_events`
    pub fn new(
        stores: Stores,
        access: Arc<dyn ClusterAccessProvider>,
        van: Arc<dyn VanClientTrait>,
        members: Arc<dyn MemberClusterClient>,
        events: Arc<dyn EventPublisher>,
        member_events: UnboundedSender<ObjectRef<DeploymentCluster>>,
    ) -> Self {
        let service_watcher = ServiceWatcher::new(Arc::clone(&members), member_events);
        Self {
            stores,
            access,
            van,
            members,
            service_watcher,
            events,
            limiter: RateLimiter::default(),
        }
    }

    pub fn service_watcher(&self) -> &ServiceWatcher {
        &self.service_watcher
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Connection to member cluster `cluster_id` within `project_id`
    pub(crate) async fn connect(&self, cluster_id: &str, project_id: &str) -> Result<Config, ControllerError> {
        debug!("Resolving connection to cluster {} (project {:?})", cluster_id, project_id);
        Ok(self.access.cluster_config(cluster_id, project_id).await?)
    }

    /// Publish a Normal Event about `obj`
    pub(crate) async fn record<K: Resource<DynamicType = ()>>(&self, obj: &K, reason: &str, action: &str, note: String) {
        self.events
            .publish(&obj.object_ref(&()), EventType::Normal, reason, action, Some(note))
            .await;
    }

    /// Publish a Warning Event about `obj`
    pub(crate) async fn warn<K: Resource<DynamicType = ()>>(&self, obj: &K, reason: &str, action: &str, note: String) {
        self.events
            .publish(&obj.object_ref(&()), EventType::Warning, reason, action, Some(note))
            .await;
    }
}

/// Rate-limiter key of `obj`
pub fn limiter_key<K: Resource<DynamicType = ()>>(obj: &K) -> String {
    format!("{}/{}", K::kind(&()), ObjectKey::of(obj))
}

/// `Kind ns/name`, for log lines
pub(crate) fn describe<K: Resource<DynamicType = ()>>(obj: &K) -> String {
    format!("{} {}", K::kind(&()), ObjectKey::of(obj))
}

/// Add `finalizer` to `obj` if missing. Returns the written object, or `None`
/// when nothing had to change.
pub(crate) async fn ensure_finalizer<K: StoredObject>(
    store: &dyn ObjectStore<K>,
    obj: &K,
    finalizer: &str,
) -> Result<Option<K>, ControllerError> {
    let mut updated = obj.clone();
    if !add_finalizer(&mut updated, finalizer) {
        return Ok(None);
    }
    let written = store
        .update(&updated)
        .await
        .map_err(|e| write_failed(&describe(obj), e))?;
    debug!("Added finalizer {} to {}", finalizer, describe(obj));
    Ok(Some(written))
}

/// Remove `finalizer` from `obj` if present; an object that is already gone is fine
pub(crate) async fn release_finalizer<K: StoredObject>(
    store: &dyn ObjectStore<K>,
    obj: &K,
    finalizer: &str,
) -> Result<(), ControllerError> {
    let mut updated = obj.clone();
    if !remove_finalizer(&mut updated, finalizer) {
        return Ok(());
    }
    ignore_not_found(store.update(&updated).await).map_err(|e| write_failed(&describe(obj), e))?;
    debug!("Removed finalizer {} from {}", finalizer, describe(obj));
    Ok(())
}

/// Write the status of `obj`
pub(crate) async fn write_status<K: StoredObject>(store: &dyn ObjectStore<K>, obj: &K) -> Result<K, ControllerError> {
    Ok(store
        .update_status(obj)
        .await
        .map_err(|e| write_failed(&format!("{} status", describe(obj)), e))?)
}
