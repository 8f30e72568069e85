//! VanClient trait for mocking
//!
//! Reconcilers depend on this trait; the Kubernetes-backed `VanClient` implements
//! it and tests use `MockVanClient`.

use crate::error::VanError;
use crate::site::IngressMode;
use k8s_openapi::api::core::v1::Secret;
use kube::Config;

/// Data-plane operations against a member cluster
///
/// Every method takes the cluster connection explicitly; implementations hold no
/// per-cluster state between calls.
#[async_trait::async_trait]
pub trait VanClientTrait: Send + Sync {
    /// Create or update the site configuration, then create the router.
    async fn init_site(&self, conn: &Config, ingress: IngressMode) -> Result<(), VanError>;

    /// Remove gateways and the site configuration.
    ///
    /// Returns [`VanError::NotInstalled`] when there was nothing to remove.
    async fn delete_site(&self, conn: &Config) -> Result<(), VanError>;

    /// Issue a single-use claim and return the token secret to hand to the far side.
    async fn create_token_claim(&self, conn: &Config, name: &str) -> Result<Secret, VanError>;

    /// Redeem `secret` on `conn` by creating an outgoing connector called `name`.
    async fn create_link(&self, conn: &Config, secret: &Secret, name: &str) -> Result<(), VanError>;

    /// Remove the connector and claim record called `name` from both clusters.
    async fn delete_link(&self, source: &Config, target: &Config, name: &str) -> Result<(), VanError>;

    /// Bind `target_name` into the fabric under `address` on `ports`.
    async fn expose_service(
        &self,
        conn: &Config,
        target_name: &str,
        target_type: &str,
        address: &str,
        ports: &[i32],
    ) -> Result<(), VanError>;

    /// Unbind `target_name` from `address`.
    async fn unexpose_service(
        &self,
        conn: &Config,
        target_name: &str,
        target_type: &str,
        address: &str,
    ) -> Result<(), VanError>;
}
