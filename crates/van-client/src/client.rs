//! Kubernetes-backed VAN client
//!
//! Builds a fresh `kube::Client` from the supplied connection on every call and
//! operates on the data-plane objects in the fabric namespace.

use crate::error::{is_status, VanError};
use crate::site::IngressMode;
use crate::van_trait::VanClientTrait;
use crate::{interface, link, site, token, DEFAULT_NAMESPACE};
use k8s_openapi::api::core::v1::Secret;
use kube::api::DeleteParams;
use kube::{Api, Client, Config};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// VAN client operating on the `interconnect` namespace of each member cluster
#[derive(Debug, Clone)]
pub struct VanClient {
    namespace: String,
}

impl Default for VanClient {
    fn default() -> Self {
        Self::new()
    }
}

impl VanClient {
    /// Client for the default fabric namespace
    pub fn new() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    /// Client for a custom data-plane namespace
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Data-plane namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn connect(&self, conn: &Config) -> Result<Client, VanError> {
        debug!("Connecting to {}", conn.cluster_url);
        Ok(Client::try_from(conn.clone())?)
    }
}

/// Delete `name`, returning whether it existed.
pub(crate) async fn delete_if_present<K>(api: &Api<K>, name: &str) -> Result<bool, kube::Error>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(true),
        Err(e) if is_status(&e, 404) => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait::async_trait]
impl VanClientTrait for VanClient {
    async fn init_site(&self, conn: &Config, ingress: IngressMode) -> Result<(), VanError> {
        site::init(self.connect(conn)?, &self.namespace, ingress).await
    }

    async fn delete_site(&self, conn: &Config) -> Result<(), VanError> {
        site::delete(self.connect(conn)?, &self.namespace).await
    }

    async fn create_token_claim(&self, conn: &Config, name: &str) -> Result<Secret, VanError> {
        token::create_claim(self.connect(conn)?, &self.namespace, name).await
    }

    async fn create_link(&self, conn: &Config, secret: &Secret, name: &str) -> Result<(), VanError> {
        link::create(self.connect(conn)?, &self.namespace, secret, name).await
    }

    async fn delete_link(&self, source: &Config, target: &Config, name: &str) -> Result<(), VanError> {
        link::delete(self.connect(source)?, self.connect(target)?, &self.namespace, name).await
    }

    async fn expose_service(
        &self,
        conn: &Config,
        target_name: &str,
        target_type: &str,
        address: &str,
        ports: &[i32],
    ) -> Result<(), VanError> {
        // Validate before dialing the cluster
        interface::validate_target(target_type, address)?;
        interface::expose(self.connect(conn)?, &self.namespace, target_name, target_type, address, ports).await
    }

    async fn unexpose_service(
        &self,
        conn: &Config,
        target_name: &str,
        target_type: &str,
        address: &str,
    ) -> Result<(), VanError> {
        interface::validate_target(target_type, address)?;
        interface::unexpose(self.connect(conn)?, &self.namespace, target_name, target_type, address).await
    }
}
