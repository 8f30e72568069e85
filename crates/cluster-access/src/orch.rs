//! Cluster access through the deployment manager
//!
//! Kubeconfigs for member clusters are fetched from the deployment manager's
//! `ClusterService` on every call, authenticated with an M2M bearer token and
//! scoped to the caller's project through the `activeprojectid` metadata key.

use crate::access_trait::ClusterAccessProvider;
use crate::auth::{TokenSource, VaultAuth};
use crate::error::AccessError;
use crate::proto::{GetKubeConfigRequest, GetKubeConfigResponse, GET_KUBE_CONFIG_PATH};
use crate::retry::{with_retry, RetryPolicy};
use crate::ADM_SERVICE_ADDRESS_ENV;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Config;
use std::sync::Arc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

/// Metadata key carrying the project the call acts in
pub const ACTIVE_PROJECT_ID_METADATA_KEY: &str = "activeprojectid";

/// Provider backed by the deployment manager
pub struct OrchClusterAccess {
    channel: Channel,
    tokens: Arc<dyn TokenSource>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for OrchClusterAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchClusterAccess")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Turn kubeconfig bytes into a connection
pub async fn config_from_kubeconfig(bytes: &[u8]) -> Result<Config, AccessError> {
    let kubeconfig: Kubeconfig =
        serde_yaml::from_slice(bytes).map_err(|e| AccessError::Kubeconfig(e.to_string()))?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| AccessError::Kubeconfig(e.to_string()))
}

fn endpoint_uri(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

fn ascii_value(value: String) -> Result<MetadataValue<Ascii>, AccessError> {
    MetadataValue::try_from(value).map_err(|e| AccessError::Auth(format!("invalid metadata value: {}", e)))
}

async fn get_kube_config(
    channel: Channel,
    request: tonic::Request<GetKubeConfigRequest>,
) -> Result<GetKubeConfigResponse, tonic::Status> {
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| tonic::Status::unavailable(format!("service was not ready: {}", e)))?;
    let codec: ProstCodec<GetKubeConfigRequest, GetKubeConfigResponse> = ProstCodec::default();
    let response = grpc
        .unary(request, PathAndQuery::from_static(GET_KUBE_CONFIG_PATH), codec)
        .await?;
    Ok(response.into_inner())
}

impl OrchClusterAccess {
    /// Provider talking to the deployment manager at `adm_address`.
    ///
    /// The channel connects lazily on first use.
    pub fn new(adm_address: &str, tokens: Arc<dyn TokenSource>) -> Result<Self, AccessError> {
        let endpoint = Endpoint::from_shared(endpoint_uri(adm_address)).map_err(|e| {
            AccessError::MissingConfig(format!("invalid adm service address {}: {}", adm_address, e))
        })?;
        Ok(Self {
            channel: endpoint.connect_lazy(),
            tokens,
            retry: RetryPolicy::default(),
        })
    }

    /// Provider configured from `ADM_SERVICE_ADDRESS` and the Vault/Keycloak variables
    pub fn from_env() -> Result<Self, AccessError> {
        let address = std::env::var(ADM_SERVICE_ADDRESS_ENV)
            .map_err(|_| AccessError::MissingConfig("adm service address is not set".to_string()))?;
        info!("Using deployment manager at {}", address);
        Self::new(&address, Arc::new(VaultAuth::from_env()?))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_kubeconfig(&self, cluster_id: &str, project_id: &str) -> Result<Vec<u8>, AccessError> {
        let token = self.tokens.m2m_token().await?;
        if token.is_empty() {
            return Err(AccessError::Auth("token is empty".to_string()));
        }
        let bearer = ascii_value(format!("Bearer {}", token))?;
        let project = ascii_value(project_id.to_string())?;

        let result = with_retry(self.retry, || {
            let mut request = tonic::Request::new(GetKubeConfigRequest {
                cluster_id: cluster_id.to_string(),
            });
            request.metadata_mut().insert("authorization", bearer.clone());
            request
                .metadata_mut()
                .insert(ACTIVE_PROJECT_ID_METADATA_KEY, project.clone());
            get_kube_config(self.channel.clone(), request)
        })
        .await;

        match result {
            Ok(response) => response
                .kube_config_info
                .map(|info| info.kube_config)
                .filter(|kc| !kc.is_empty())
                .ok_or_else(|| AccessError::Kubeconfig(format!("empty kubeconfig for cluster {}", cluster_id))),
            Err(status) if status.code() == tonic::Code::NotFound => {
                Err(AccessError::ClusterNotFound(cluster_id.to_string()))
            }
            Err(status) => Err(status.into()),
        }
    }
}

#[async_trait::async_trait]
impl ClusterAccessProvider for OrchClusterAccess {
    async fn cluster_config(&self, cluster_id: &str, project_id: &str) -> Result<Config, AccessError> {
        debug!("Fetching kubeconfig for cluster {} in project {}", cluster_id, project_id);
        let kubeconfig = self.fetch_kubeconfig(cluster_id, project_id).await?;
        config_from_kubeconfig(&kubeconfig).await
    }
}
