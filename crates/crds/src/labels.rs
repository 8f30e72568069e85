//! Well-known label, annotation and finalizer keys

/// Deployment UID a DeploymentCluster belongs to (set by the deployment manager)
pub const DEPLOYMENT_ID_LABEL: &str = "app.edge-orchestrator.intel.com/deployment-id";
/// Namespace of the owning Deployment
pub const DEPLOYMENT_NAMESPACE_LABEL: &str = "app.edge-orchestrator.intel.com/deployment-namespace";
/// Name of the owning Deployment
pub const DEPLOYMENT_NAME_LABEL: &str = "app.edge-orchestrator.intel.com/deployment-name";
/// Project namespace of the member cluster
pub const CLUSTER_NAMESPACE_LABEL: &str = "app.edge-orchestrator.intel.com/cluster-namespace";
/// Member cluster id
pub const CLUSTER_NAME_LABEL: &str = "app.edge-orchestrator.intel.com/cluster-name";
/// Network the object participates in
pub const NETWORK_NAME_LABEL: &str = "app.edge-orchestrator.intel.com/network-name";

/// Project id as stamped by the deployment manager
pub const APP_PROJECT_ID_LABEL: &str = "app.edge-orchestrator.intel.com/project-id";
/// Project id carried on network.* resources
pub const NETWORK_PROJECT_ID_LABEL: &str = "network.app.edge-orchestrator.intel.com/project-id";
/// Project id carried on interconnect.* resources
pub const INTERCONNECT_PROJECT_ID_LABEL: &str = "interconnect.app.edge-orchestrator.intel.com/project-id";

/// Helm release that installed a member service
pub const HELM_RELEASE_NAME_ANNOTATION: &str = "meta.helm.sh/release-name";
/// Opt-in for exposing a member service over the fabric; must be `"true"`
pub const EXPOSE_SERVICE_ANNOTATION: &str = "network.app.edge-orchestrator.intel.com/expose-service";
/// Single decimal port to expose
pub const EXPOSE_PORT_ANNOTATION: &str = "network.app.edge-orchestrator.intel.com/expose-port";
/// Comma-separated decimal ports to expose
pub const EXPOSE_PORTS_ANNOTATION: &str = "network.app.edge-orchestrator.intel.com/expose-ports";

/// Finalizers, one per side-effecting reconciler.
pub mod finalizers {
    /// Cluster reconciler (site teardown)
    pub const CLUSTER: &str = "cluster.interconnect.app.edge-orchestrator.intel.com/finalizer";
    /// ClusterStatus reconciler (on fabric Services)
    pub const CLUSTER_STATUS: &str = "clusterstatus.interconnect.app.edge-orchestrator.intel.com/finalizer";
    /// Link reconciler (link teardown)
    pub const LINK: &str = "link.interconnect.app.edge-orchestrator.intel.com/finalizer";
    /// Service reconciler (unexpose)
    pub const SERVICE: &str = "service.interconnect.app.edge-orchestrator.intel.com/finalizer";

    /// Deployment reconciler
    pub const DEPLOYMENT: &str = "deployment.network.app.edge-orchestrator.intel.com/finalizer";
    /// DeploymentCluster reconciler
    pub const DEPLOYMENT_CLUSTER: &str = "deploymentcluster.network.app.edge-orchestrator.intel.com/finalizer";
    /// DeploymentService reconciler; also placed on member-cluster Services
    pub const DEPLOYMENT_SERVICE: &str = "deploymentservice.network.app.edge-orchestrator.intel.com/finalizer";
    /// NetworkCluster reconciler
    pub const NETWORK_CLUSTER: &str = "networkcluster.network.app.edge-orchestrator.intel.com/finalizer";
    /// NetworkClusterStatus reconciler (on NetworkServices)
    pub const NETWORK_CLUSTER_STATUS: &str = "networkclusterstatus.network.app.edge-orchestrator.intel.com/finalizer";
    /// NetworkClusterLink reconciler
    pub const NETWORK_CLUSTER_LINK: &str = "networkclusterlink.network.app.edge-orchestrator.intel.com/finalizer";
    /// NetworkLink reconciler
    pub const NETWORK_LINK: &str = "networklink.network.app.edge-orchestrator.intel.com/finalizer";
    /// NetworkService reconciler
    pub const NETWORK_SERVICE: &str = "networkservice.network.app.edge-orchestrator.intel.com/finalizer";
}
