//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the reconciler to
//! its stores and external clients and runs one watcher task per reconciler:
//! - network group: Deployment, DeploymentCluster, DeploymentService,
//!   NetworkCluster (owner, role, status and links), NetworkLink, NetworkService
//! - interconnect group: Cluster, ClusterStatus, Link, Service

use crate::config::{Args, Mode};
use crate::error::ControllerError;
use crate::events::KubeEventPublisher;
use crate::health::Readiness;
use crate::member::KubeMemberClusters;
use crate::reconciler::{Reconciler, Stores};
use crate::watcher::Watcher;
use cluster_access::{ClusterAccessProvider, LocalClusterAccess, OrchClusterAccess};
use futures::channel::mpsc;
use futures::future::select_all;
use kube::Client;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use van_client::VanClient;

type WatcherHandle = JoinHandle<Result<(), ControllerError>>;

/// Main controller for the interconnect fabric.
pub struct Controller {
    watchers: Vec<(&'static str, WatcherHandle)>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("watchers", &self.watchers.iter().map(|(name, _)| *name).collect::<Vec<_>>())
            .finish()
    }
}

impl Controller {
    /// Creates a new controller instance and starts every watcher.
    ///
    /// `readiness` is raised once all watcher tasks are spawned.
    pub async fn new(args: &Args, readiness: Readiness) -> Result<Self, ControllerError> {
        info!("Initializing Interconnect Controller");

        let kube_client = Client::try_default().await?;

        let access: Arc<dyn ClusterAccessProvider> = match args.mode {
            Mode::Dev => {
                info!("Dev mode: every cluster id resolves to the local cluster");
                Arc::new(LocalClusterAccess::new().await?)
            }
            Mode::Prod => {
                info!("Prod mode: kubeconfigs come from the deployment manager");
                Arc::new(OrchClusterAccess::from_env()?)
            }
        };

        let (member_tx, member_rx) = mpsc::unbounded();
        let reconciler = Arc::new(Reconciler::new(
            Stores::kube(&kube_client),
            access,
            Arc::new(VanClient::new()),
            Arc::new(KubeMemberClusters::new()),
            Arc::new(KubeEventPublisher::new(kube_client.clone())),
            member_tx,
        ));

        let watcher = Arc::new(Watcher::new(reconciler, kube_client, args.concurrency));
        let mut watchers = Vec::new();

        // Network
        spawn(&mut watchers, "Deployment", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_deployments().await }
        });
        spawn(&mut watchers, "DeploymentCluster", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_deployment_clusters().await }
        });
        spawn(&mut watchers, "DeploymentService", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_deployment_services(member_rx).await }
        });
        spawn(&mut watchers, "NetworkCluster", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_network_clusters().await }
        });
        spawn(&mut watchers, "NetworkClusterRole", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_network_cluster_roles().await }
        });
        spawn(&mut watchers, "NetworkClusterStatus", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_network_cluster_statuses().await }
        });
        spawn(&mut watchers, "NetworkClusterLink", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_network_cluster_links().await }
        });
        spawn(&mut watchers, "NetworkLink", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_network_links().await }
        });
        spawn(&mut watchers, "NetworkService", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_network_services().await }
        });

        // Interconnect
        spawn(&mut watchers, "Cluster", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_clusters().await }
        });
        spawn(&mut watchers, "ClusterStatus", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_cluster_statuses().await }
        });
        spawn(&mut watchers, "Link", {
            let watcher = Arc::clone(&watcher);
            async move { watcher.watch_links().await }
        });
        spawn(&mut watchers, "Service", {
            let watcher = watcher;
            async move { watcher.watch_services().await }
        });

        readiness.set_ready();
        info!("Started {} watchers", watchers.len());

        Ok(Self { watchers })
    }

    /// Runs until every watcher has stopped. The first watcher that fails or
    /// panics ends the run with [`ControllerError::Watch`].
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Interconnect Controller running");

        let (mut names, mut pending): (Vec<_>, Vec<_>) = self.watchers.into_iter().unzip();
        while !pending.is_empty() {
            let (result, index, rest) = select_all(pending).await;
            let name = names.remove(index);
            result
                .map_err(|e| ControllerError::Watch(format!("{} watcher panicked: {}", name, e)))?
                .map_err(|e| ControllerError::Watch(format!("{} watcher error: {}", name, e)))?;
            info!("{} watcher stopped", name);
            pending = rest;
        }

        info!("All watchers stopped");
        Ok(())
    }
}

fn spawn<F>(watchers: &mut Vec<(&'static str, WatcherHandle)>, name: &'static str, watch: F)
where
    F: Future<Output = Result<(), ControllerError>> + Send + 'static,
{
    watchers.push((name, tokio::spawn(watch)));
}
