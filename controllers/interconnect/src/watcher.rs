//! Kubernetes resource watchers.
//!
//! Every reconciler runs in its own `kube_runtime::Controller` over its primary
//! kind, together with the secondary watches that map related objects back to
//! primary keys (see [`crate::mappers`]). Mappers that search use the primary
//! controller's own reflector store.
//!
//! All watchers share [`run_controller`]: a failed reconcile is requeued after
//! the per-key rate-limiter delay and a successful one resets the key.

use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crate::mappers;
use crate::reconciler::{Reconciler, limiter_key};
use crds::{
    Cluster, Deployment, DeploymentCluster, Link, Network, NetworkCluster, NetworkLink, NetworkService, Service,
};
use futures::channel::mpsc::UnboundedReceiver;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use kube::{Api, Client, Resource};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{
    Controller, watcher,
    controller::{Action, Config as ControllerConfig, Error as RunError},
};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Reconcile entry point of one controller
type ReconcileFn<K> = fn(Arc<Reconciler>, Arc<K>) -> BoxFuture<'static, Result<Action, ControllerError>>;

/// Run `controller` until shutdown, reconciling with `reconcile_fn`
async fn run_controller<K>(
    controller: Controller<K>,
    name: &'static str,
    reconciler: Arc<Reconciler>,
    concurrency: u16,
    reconcile_fn: ReconcileFn<K>,
) -> Result<(), ControllerError>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    info!("Starting {} controller", name);

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let key = format!("{}/{}", name, limiter_key(&*obj));
        async move {
            let action = reconcile_fn(Arc::clone(&ctx), obj).await?;
            ctx.limiter().forget(&key);
            Ok::<Action, ControllerError>(action)
        }
    };

    let error_policy = move |obj: Arc<K>, err: &ControllerError, ctx: Arc<Reconciler>| {
        let key = format!("{}/{}", name, limiter_key(&*obj));
        let delay = ctx.limiter().when(&key);
        if err.is_conflict() {
            warn!("{}: conflict on {}, retrying in {:?}: {}", name, key, delay, err);
        } else {
            error!("{}: reconcile of {} failed, retrying in {:?}: {}", name, key, delay, err);
            let note = err.to_string();
            tokio::spawn(async move {
                ctx.warn(&*obj, reasons::RECONCILE_FAILED, actions::RECONCILE, note).await;
            });
        }
        Action::requeue(delay)
    };

    controller
        .with_config(ControllerConfig::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => debug!("{}: reconciled {} ({:?})", name, obj, action),
                // already reported by the error policy
                Err(RunError::ReconcilerFailed(..)) => {}
                Err(e) => warn!("{}: controller error: {}", name, e),
            }
        })
        .await;

    info!("{} controller stopped", name);
    Ok(())
}

/// Starts one controller per reconciler.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    client: Client,
    concurrency: u16,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    pub fn new(reconciler: Arc<Reconciler>, client: Client, concurrency: u16) -> Self {
        Self {
            reconciler,
            client,
            concurrency,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<DynamicType = ()>,
    {
        Api::all(self.client.clone())
    }

    fn controller<K>(&self) -> Controller<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        Controller::new(self.api::<K>(), watcher::Config::default())
    }

    async fn run<K>(&self, controller: Controller<K>, name: &'static str, reconcile_fn: ReconcileFn<K>) -> Result<(), ControllerError>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        run_controller(controller, name, Arc::clone(&self.reconciler), self.concurrency, reconcile_fn).await
    }

    /// Deployment: DeploymentCluster and Network changes
    pub async fn watch_deployments(&self) -> Result<(), ControllerError> {
        let controller = self.controller::<Deployment>();
        let deployments = controller.store();
        let by_network = deployments.clone();
        let controller = controller
            .watches(self.api::<DeploymentCluster>(), watcher::Config::default(), move |dc| {
                mappers::deployment_for_cluster(&deployments.state(), &dc)
            })
            .watches(self.api::<Network>(), watcher::Config::default(), move |network| {
                mappers::deployments_for_network(&by_network.state(), &network)
            });
        self.run(controller, "deployment", |r, obj| {
            async move { r.reconcile_deployment(&obj).await }.boxed()
        })
        .await
    }

    /// DeploymentCluster: Deployment, Network and NetworkCluster changes
    pub async fn watch_deployment_clusters(&self) -> Result<(), ControllerError> {
        let controller = self.controller::<DeploymentCluster>();
        let clusters = controller.store();
        let (by_network, by_network_cluster) = (clusters.clone(), clusters.clone());
        let controller = controller
            .watches(self.api::<Deployment>(), watcher::Config::default(), move |deployment| {
                mappers::clusters_for_deployment(&clusters.state(), &deployment)
            })
            .watches(self.api::<Network>(), watcher::Config::default(), move |network| {
                mappers::clusters_for_network(&by_network.state(), &network)
            })
            .watches(self.api::<NetworkCluster>(), watcher::Config::default(), move |nc| {
                mappers::clusters_for_network_cluster(&by_network_cluster.state(), &nc)
            });
        self.run(controller, "deploymentcluster", |r, obj| {
            async move { r.reconcile_deployment_cluster(&obj).await }.boxed()
        })
        .await
    }

    /// DeploymentService: Deployment changes and member-cluster Service events
    pub async fn watch_deployment_services(
        &self,
        member_events: UnboundedReceiver<ObjectRef<DeploymentCluster>>,
    ) -> Result<(), ControllerError> {
        let controller = self.controller::<DeploymentCluster>();
        let clusters = controller.store();
        let controller = controller
            .watches(self.api::<Deployment>(), watcher::Config::default(), move |deployment| {
                mappers::clusters_for_deployment(&clusters.state(), &deployment)
            })
            .reconcile_on(member_events);
        self.run(controller, "deploymentservice", |r, obj| {
            async move { r.reconcile_deployment_service(&obj).await }.boxed()
        })
        .await
    }

    /// NetworkCluster: changes of the Cluster it owns
    pub async fn watch_network_clusters(&self) -> Result<(), ControllerError> {
        let controller = self
            .controller::<NetworkCluster>()
            .watches(self.api::<Cluster>(), watcher::Config::default(), |cluster| {
                mappers::network_clusters_for_cluster(&cluster)
            });
        self.run(controller, "networkcluster", |r, obj| {
            async move { r.reconcile_network_cluster(&obj).await }.boxed()
        })
        .await
    }

    /// NetworkCluster role lift out of `Unknown`
    pub async fn watch_network_cluster_roles(&self) -> Result<(), ControllerError> {
        let controller = self.controller::<NetworkCluster>();
        self.run(controller, "networkclusterrole", |r, obj| {
            async move { r.reconcile_network_cluster_role(&obj).await }.boxed()
        })
        .await
    }

    /// NetworkClusterStatus: NetworkServices, and their NetworkCluster's changes
    pub async fn watch_network_cluster_statuses(&self) -> Result<(), ControllerError> {
        let controller = self.controller::<NetworkService>();
        let services = controller.store();
        let controller = controller.watches(self.api::<NetworkCluster>(), watcher::Config::default(), move |nc| {
            mappers::services_for_network_cluster(&services.state(), &nc)
        });
        self.run(controller, "networkclusterstatus", |r, obj| {
            async move { r.reconcile_network_cluster_status(&obj).await }.boxed()
        })
        .await
    }

    /// NetworkClusterLink: peers of the same network and the hub's NetworkLinks
    pub async fn watch_network_cluster_links(&self) -> Result<(), ControllerError> {
        let controller = self.controller::<NetworkCluster>();
        let clusters = controller.store();
        let controller = controller
            .watches(self.api::<NetworkCluster>(), watcher::Config::default(), move |nc| {
                mappers::hubs_for_network_cluster(&clusters.state(), &nc)
            })
            .watches(self.api::<NetworkLink>(), watcher::Config::default(), |link| {
                mappers::hub_for_network_link(&link)
            });
        self.run(controller, "networkclusterlink", |r, obj| {
            async move { r.reconcile_network_cluster_link(&obj).await }.boxed()
        })
        .await
    }

    /// NetworkLink: changes of the Link it owns
    pub async fn watch_network_links(&self) -> Result<(), ControllerError> {
        let controller = self
            .controller::<NetworkLink>()
            .watches(self.api::<Link>(), watcher::Config::default(), |link| {
                mappers::network_links_for_link(&link)
            });
        self.run(controller, "networklink", |r, obj| {
            async move { r.reconcile_network_link(&obj).await }.boxed()
        })
        .await
    }

    /// NetworkService: changes of the fabric Service it owns
    pub async fn watch_network_services(&self) -> Result<(), ControllerError> {
        let controller = self
            .controller::<NetworkService>()
            .watches(self.api::<Service>(), watcher::Config::default(), |service| {
                mappers::network_services_for_service(&service)
            });
        self.run(controller, "networkservice", |r, obj| {
            async move { r.reconcile_network_service(&obj).await }.boxed()
        })
        .await
    }

    /// Cluster: site lifecycle
    pub async fn watch_clusters(&self) -> Result<(), ControllerError> {
        let controller = self.controller::<Cluster>();
        self.run(controller, "cluster", |r, obj| {
            async move { r.reconcile_cluster(&obj).await }.boxed()
        })
        .await
    }

    /// ClusterStatus: fabric Services feeding their Cluster's status
    pub async fn watch_cluster_statuses(&self) -> Result<(), ControllerError> {
        let controller = self.controller::<Service>();
        self.run(controller, "clusterstatus", |r, obj| {
            async move { r.reconcile_cluster_status(&obj).await }.boxed()
        })
        .await
    }

    /// Link: changes of either end's Cluster
    pub async fn watch_links(&self) -> Result<(), ControllerError> {
        let controller = self.controller::<Link>();
        let links = controller.store();
        let controller = controller.watches(self.api::<Cluster>(), watcher::Config::default(), move |cluster| {
            mappers::links_for_cluster(&links.state(), &cluster)
        });
        self.run(controller, "link", |r, obj| {
            async move { r.reconcile_link(&obj).await }.boxed()
        })
        .await
    }

    /// Service: interface exposure
    pub async fn watch_services(&self) -> Result<(), ControllerError> {
        let controller = self.controller::<Service>();
        self.run(controller, "service", |r, obj| {
            async move { r.reconcile_service(&obj).await }.boxed()
        })
        .await
    }
}
