//! Member cluster Service access
//!
//! The DeploymentService reconciler and the service watcher read application
//! Services on member clusters and put finalizers on them. Access goes through
//! [`MemberClusterClient`] so tests can drive it with [`MockMemberClusters`].

use async_trait::async_trait;
use cluster_access::AccessError;
use futures::StreamExt;
use futures::stream::BoxStream;
pub use k8s_openapi::api::core::v1::Service as MemberService;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, Config, ResourceExt};
use kube_runtime::WatchStreamExt;
use kube_runtime::watcher;
use thiserror::Error;

/// Member cluster errors
#[derive(Debug, Error)]
pub enum MemberError {
    /// The member cluster does not serve the Service kind (yet)
    #[error("kind not served by member cluster: {0}")]
    KindNotFound(String),

    /// The Service does not exist
    #[error("service not found: {0}")]
    NotFound(String),

    /// resourceVersion mismatch updating a Service
    #[error("conflict updating service: {0}")]
    Conflict(String),

    /// Watch stream failure
    #[error("watch failed: {0}")]
    Watch(String),

    /// Cluster connection could not be resolved
    #[error("cluster access: {0}")]
    Access(#[from] AccessError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl MemberError {
    /// Services are not listable on the member cluster yet
    pub fn is_missing_kind(&self) -> bool {
        matches!(self, MemberError::KindNotFound(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MemberError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, MemberError::Conflict(_))
    }
}

/// Stream of added or modified member Services
pub type ServiceStream = BoxStream<'static, Result<MemberService, MemberError>>;

/// Service operations against a member cluster
#[async_trait]
pub trait MemberClusterClient: Send + Sync {
    /// Every Service on the member cluster
    async fn list_services(&self, conn: &Config) -> Result<Vec<MemberService>, MemberError>;

    /// Replace a Service (used for finalizer changes)
    async fn update_service(&self, conn: &Config, service: &MemberService) -> Result<MemberService, MemberError>;

    /// Watch every Service on the member cluster
    fn watch_services(&self, conn: &Config) -> Result<ServiceStream, MemberError>;
}

/// [`MemberClusterClient`] talking to member clusters over the Kubernetes API
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeMemberClusters;

impl KubeMemberClusters {
    pub fn new() -> Self {
        Self
    }

    fn client(conn: &Config) -> Result<Client, MemberError> {
        Ok(Client::try_from(conn.clone())?)
    }
}

fn classify(err: kube::Error, what: &str) -> MemberError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => MemberError::NotFound(what.to_string()),
        kube::Error::Api(ae) if ae.code == 409 => MemberError::Conflict(what.to_string()),
        other => MemberError::Kube(other),
    }
}

#[async_trait]
impl MemberClusterClient for KubeMemberClusters {
    async fn list_services(&self, conn: &Config) -> Result<Vec<MemberService>, MemberError> {
        let api: Api<MemberService> = Api::all(Self::client(conn)?);
        match api.list(&ListParams::default()).await {
            Ok(list) => Ok(list.items),
            // A 404 on a collection means the kind itself is not served
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(MemberError::KindNotFound(format!("services: {}", ae.message)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_service(&self, conn: &Config, service: &MemberService) -> Result<MemberService, MemberError> {
        let namespace = service.namespace().unwrap_or_default();
        let name = service.name_any();
        let api: Api<MemberService> = Api::namespaced(Self::client(conn)?, &namespace);
        api.replace(&name, &PostParams::default(), service)
            .await
            .map_err(|e| classify(e, &format!("{}/{}", namespace, name)))
    }

    fn watch_services(&self, conn: &Config) -> Result<ServiceStream, MemberError> {
        let api: Api<MemberService> = Api::all(Self::client(conn)?);
        Ok(watcher(api, watcher::Config::default())
            .touched_objects()
            .map(|event| event.map_err(|e| MemberError::Watch(e.to_string())))
            .boxed())
    }
}

#[cfg(test)]
pub use mock::MockMemberClusters;
