//! Dynamic cross-cluster Service watcher
//!
//! The DeploymentService reconciler needs to run again whenever an exposable
//! Service changes on a member cluster. The watcher keeps one Service watch per
//! member cluster, shared by every DeploymentCluster placed on that cluster,
//! and turns each event for a Service carrying the `expose-service` annotation
//! into a reconcile request for every such DeploymentCluster.
//!
//! A cluster's watch starts with its first DeploymentCluster and stops with its
//! last. Until the cluster serves Services the watch polls every
//! [`MEMBER_SYNC_POLL`]; once running it re-lists every [`MEMBER_RESYNC_PERIOD`].

use crate::config::{MEMBER_RESYNC_PERIOD, MEMBER_SYNC_POLL};
use crate::member::{MemberClusterClient, MemberService};
use crds::labels::EXPOSE_SERVICE_ANNOTATION;
use crds::DeploymentCluster;
use futures::channel::mpsc::UnboundedSender;
use futures::StreamExt;
use kube::{Config, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// `(cluster namespace, cluster id)`
pub type ClusterKey = (String, String);

type Handlers = Arc<Mutex<BTreeMap<String, ObjectRef<DeploymentCluster>>>>;

struct Source {
    handlers: Handlers,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    sources: HashMap<ClusterKey, Source>,
    /// DeploymentCluster uid -> cluster it is watched on
    placements: HashMap<String, ClusterKey>,
}

/// Per-member-cluster Service watches feeding the DeploymentService queue
pub struct ServiceWatcher {
    members: Arc<dyn MemberClusterClient>,
    events: UnboundedSender<ObjectRef<DeploymentCluster>>,
    state: Mutex<State>,
}

impl std::fmt::Debug for ServiceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWatcher")
            .field("clusters", &self.watched_clusters())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn cluster_key(dc: &DeploymentCluster) -> ClusterKey {
    (dc.spec.namespace.clone(), dc.spec.cluster_id.clone())
}

impl ServiceWatcher {
    /// Watcher publishing reconcile requests on `events`
    pub fn new(members: Arc<dyn MemberClusterClient>, events: UnboundedSender<ObjectRef<DeploymentCluster>>) -> Self {
        Self {
            members,
            events,
            state: Mutex::new(State::default()),
        }
    }

    /// Route Service events of `dc`'s cluster to `dc`, connecting with `conn`
    /// if the cluster is not watched yet. Moves `dc` if its cluster changed.
    pub fn watch(&self, dc: &DeploymentCluster, conn: &Config) {
        let Some(uid) = dc.uid() else {
            warn!("Not watching Services for DeploymentCluster {} without uid", dc.name_any());
            return;
        };
        let key = cluster_key(dc);
        let mut state = lock(&self.state);

        match state.placements.get(&uid).cloned() {
            Some(current) if current == key => return,
            Some(current) => {
                info!(
                    "DeploymentCluster {} moved from cluster {}/{} to {}/{}",
                    dc.name_any(),
                    current.0,
                    current.1,
                    key.0,
                    key.1
                );
                Self::remove_handler(&mut state, &current, &uid);
            }
            None => {}
        }

        let source = state.sources.entry(key.clone()).or_insert_with(|| {
            info!("Starting Service source for cluster {}/{}", key.0, key.1);
            let handlers = Handlers::default();
            let task = tokio::spawn(run_source(
                Arc::clone(&self.members),
                conn.clone(),
                key.clone(),
                Arc::clone(&handlers),
                self.events.clone(),
            ));
            Source { handlers, task }
        });
        lock(&source.handlers).insert(uid.clone(), ObjectRef::from_obj(dc));
        state.placements.insert(uid, key);
    }

    /// Stop routing events to `dc`; the cluster's watch stops with its last handler
    pub fn unwatch(&self, dc: &DeploymentCluster) {
        let Some(uid) = dc.uid() else {
            return;
        };
        let mut state = lock(&self.state);
        if let Some(key) = state.placements.remove(&uid) {
            Self::remove_handler(&mut state, &key, &uid);
        }
    }

    fn remove_handler(state: &mut State, key: &ClusterKey, uid: &str) {
        state.placements.remove(uid);
        let Some(source) = state.sources.get(key) else {
            return;
        };
        let remaining = {
            let mut handlers = lock(&source.handlers);
            handlers.remove(uid);
            handlers.len()
        };
        if remaining == 0 {
            info!("Stopping Service source for cluster {}/{}", key.0, key.1);
            if let Some(source) = state.sources.remove(key) {
                source.task.abort();
            }
        }
    }

    /// Clusters currently watched
    pub fn watched_clusters(&self) -> Vec<ClusterKey> {
        let mut clusters: Vec<_> = lock(&self.state).sources.keys().cloned().collect();
        clusters.sort();
        clusters
    }

    /// DeploymentClusters routed from `key`
    pub fn handler_count(&self, key: &ClusterKey) -> usize {
        lock(&self.state)
            .sources
            .get(key)
            .map_or(0, |s| lock(&s.handlers).len())
    }
}

impl Drop for ServiceWatcher {
    fn drop(&mut self) {
        for source in lock(&self.state).sources.values() {
            source.task.abort();
        }
    }
}

fn is_exposable(service: &MemberService) -> bool {
    service
        .annotations()
        .get(EXPOSE_SERVICE_ANNOTATION)
        .is_some_and(|v| !v.is_empty())
}

fn dispatch(
    key: &ClusterKey,
    handlers: &Handlers,
    events: &UnboundedSender<ObjectRef<DeploymentCluster>>,
    service: &MemberService,
) {
    if !is_exposable(service) {
        debug!(
            "Ignoring Service {} on cluster {}: {} annotation is missing",
            service.name_any(),
            key.1,
            EXPOSE_SERVICE_ANNOTATION
        );
        return;
    }
    let targets: Vec<_> = lock(handlers).values().cloned().collect();
    for target in targets {
        debug!("Service {} changed on cluster {}, requeueing {}", service.name_any(), key.1, target);
        if events.unbounded_send(target).is_err() {
            debug!("Reconcile queue closed, dropping Service event");
        }
    }
}

/// Wait until the cluster serves Services, replay them, then follow the watch
async fn run_source(
    members: Arc<dyn MemberClusterClient>,
    conn: Config,
    key: ClusterKey,
    handlers: Handlers,
    events: UnboundedSender<ObjectRef<DeploymentCluster>>,
) {
    loop {
        match members.list_services(&conn).await {
            Ok(services) => {
                for service in &services {
                    dispatch(&key, &handlers, &events, service);
                }
                match members.watch_services(&conn) {
                    Ok(stream) => follow(&*members, &conn, &key, &handlers, &events, stream).await,
                    Err(e) => error!("Failed to watch Services on cluster {}/{}: {}", key.0, key.1, e),
                }
            }
            Err(e) if e.is_missing_kind() => {
                error!(
                    "Services are not served by cluster {}/{}, retrying in {:?}: {}",
                    key.0, key.1, MEMBER_SYNC_POLL, e
                );
            }
            Err(e) => error!("Failed to list Services on cluster {}/{}: {}", key.0, key.1, e),
        }
        tokio::time::sleep(MEMBER_SYNC_POLL).await;
    }
}

/// Forward watch events until the stream ends, re-listing every resync period
async fn follow(
    members: &dyn MemberClusterClient,
    conn: &Config,
    key: &ClusterKey,
    handlers: &Handlers,
    events: &UnboundedSender<ObjectRef<DeploymentCluster>>,
    mut stream: crate::member::ServiceStream,
) {
    let mut resync = tokio::time::interval(MEMBER_RESYNC_PERIOD);
    resync.tick().await;
    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(service)) => dispatch(key, handlers, events, &service),
                Some(Err(e)) => warn!("Service watch error on cluster {}/{}: {}", key.0, key.1, e),
                None => {
                    warn!("Service watch on cluster {}/{} ended", key.0, key.1);
                    return;
                }
            },
            _ = resync.tick() => match members.list_services(conn).await {
                Ok(services) => {
                    for service in &services {
                        dispatch(key, handlers, events, service);
                    }
                }
                Err(e) => warn!("Service resync failed on cluster {}/{}: {}", key.0, key.1, e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::MockMemberClusters;
    use cluster_access::mock::mock_cluster_url;
    use crds::DeploymentClusterSpec;
    use futures::channel::mpsc;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn conn(cluster: &str) -> Config {
        Config::new(mock_cluster_url(cluster).parse().unwrap())
    }

    fn dc(name: &str, uid: &str, cluster: &str) -> DeploymentCluster {
        let mut dc = DeploymentCluster::new(
            name,
            DeploymentClusterSpec {
                deployment_id: "d1".to_string(),
                cluster_id: cluster.to_string(),
                namespace: "proj".to_string(),
            },
        );
        dc.metadata.namespace = Some("proj".to_string());
        dc.metadata.uid = Some(uid.to_string());
        dc
    }

    fn service(name: &str, exposed: bool) -> MemberService {
        let mut svc = MemberService::default();
        svc.metadata.namespace = Some("default".to_string());
        svc.metadata.name = Some(name.to_string());
        if exposed {
            svc.metadata.annotations = Some(BTreeMap::from([(
                EXPOSE_SERVICE_ANNOTATION.to_string(),
                "true".to_string(),
            )]));
        }
        svc
    }

    async fn wait_for_watch(members: &MockMemberClusters, cluster: &str) {
        for _ in 0..100 {
            if members.watcher_count(cluster) > 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("watch on {} never opened", cluster);
    }

    fn setup() -> (
        MockMemberClusters,
        ServiceWatcher,
        mpsc::UnboundedReceiver<ObjectRef<DeploymentCluster>>,
    ) {
        let members = MockMemberClusters::new();
        let (tx, rx) = mpsc::unbounded();
        let watcher = ServiceWatcher::new(Arc::new(members.clone()), tx);
        (members, watcher, rx)
    }

    #[tokio::test]
    async fn test_one_source_per_cluster() {
        let (_members, watcher, _rx) = setup();

        watcher.watch(&dc("dc1", "u1", "c1"), &conn("c1"));
        watcher.watch(&dc("dc2", "u2", "c1"), &conn("c1"));
        watcher.watch(&dc("dc1", "u1", "c1"), &conn("c1"));

        let key = ("proj".to_string(), "c1".to_string());
        assert_eq!(watcher.watched_clusters(), vec![key.clone()]);
        assert_eq!(watcher.handler_count(&key), 2);
    }

    #[tokio::test]
    async fn test_exposable_service_requeues_every_handler() {
        let (members, watcher, mut rx) = setup();
        watcher.watch(&dc("dc1", "u1", "c1"), &conn("c1"));
        watcher.watch(&dc("dc2", "u2", "c1"), &conn("c1"));
        wait_for_watch(&members, "c1").await;

        members.apply_service("c1", service("plain", false));
        members.apply_service("c1", service("web", true));

        let mut names = vec![
            rx.next().await.unwrap().name,
            rx.next().await.unwrap().name,
        ];
        names.sort();
        assert_eq!(names, vec!["dc1", "dc2"]);
        assert!(rx.try_next().is_err(), "unannotated Service must not requeue");
    }

    #[tokio::test]
    async fn test_existing_services_are_replayed() {
        let (members, watcher, mut rx) = setup();
        members.apply_service("c1", service("web", true));

        watcher.watch(&dc("dc1", "u1", "c1"), &conn("c1"));

        let request = tokio::time::timeout(Duration::from_secs(5), rx.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.name, "dc1");
        assert_eq!(request.namespace.as_deref(), Some("proj"));
    }

    #[tokio::test]
    async fn test_last_unwatch_stops_source() {
        let (_members, watcher, _rx) = setup();
        let first = dc("dc1", "u1", "c1");
        let second = dc("dc2", "u2", "c1");
        watcher.watch(&first, &conn("c1"));
        watcher.watch(&second, &conn("c1"));

        watcher.unwatch(&first);
        assert_eq!(watcher.watched_clusters().len(), 1);

        watcher.unwatch(&second);
        assert!(watcher.watched_clusters().is_empty());

        watcher.unwatch(&second);
    }

    #[tokio::test]
    async fn test_moved_deployment_cluster_follows_its_cluster() {
        let (_members, watcher, _rx) = setup();
        let mut moving = dc("dc1", "u1", "c1");
        watcher.watch(&moving, &conn("c1"));

        moving.spec.cluster_id = "c2".to_string();
        watcher.watch(&moving, &conn("c2"));

        assert_eq!(
            watcher.watched_clusters(),
            vec![("proj".to_string(), "c2".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_services_are_served() {
        let (members, watcher, mut rx) = setup();
        members.set_kind_missing("c1", true);
        watcher.watch(&dc("dc1", "u1", "c1"), &conn("c1"));

        tokio::time::sleep(MEMBER_SYNC_POLL * 2).await;
        assert_eq!(members.watcher_count("c1"), 0);

        members.set_kind_missing("c1", false);
        members.apply_service("c1", service("web", true));
        tokio::time::sleep(MEMBER_SYNC_POLL + Duration::from_secs(1)).await;

        let request = tokio::time::timeout(Duration::from_secs(1), rx.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.name, "dc1");
        assert_eq!(members.watcher_count("c1"), 1);
    }
}
