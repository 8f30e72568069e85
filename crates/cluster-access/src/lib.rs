//! Member cluster access
//!
//! Resolves a member cluster id (plus the project it belongs to) to a
//! `kube::Config` the VAN adapter and service watcher can connect with.
//!
//! Two providers implement [`ClusterAccessProvider`]:
//!
//! - [`LocalClusterAccess`] returns the controller's own cluster for every id
//!   (dev mode).
//! - [`OrchClusterAccess`] asks the deployment manager for the cluster's
//!   kubeconfig over gRPC, authenticated with an M2M token (prod mode).
//!
//! # Example
//!
//! ```no_run
//! use cluster_access::{ClusterAccessProvider, OrchClusterAccess};
//!
//! # async fn example() -> Result<(), cluster_access::AccessError> {
//! let access = OrchClusterAccess::from_env()?;
//! match access.cluster_config("cluster-1234", "project-a").await {
//!     Ok(config) => tracing::info!("connect to {}", config.cluster_url),
//!     Err(e) if e.is_cluster_gone() => tracing::info!("cluster was deleted"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod error;
pub mod local;
pub mod orch;
pub mod proto;
pub mod retry;
#[path = "trait.rs"]
pub mod access_trait;
#[cfg(feature = "test-util")]
pub mod mock;

/// Deployment-manager gRPC endpoint
pub const ADM_SERVICE_ADDRESS_ENV: &str = "ADM_SERVICE_ADDRESS";
pub const KEYCLOAK_SERVER_ENV: &str = "KEYCLOAK_SERVER";
pub const VAULT_SERVER_ENV: &str = "VAULT_SERVER";
pub const SERVICE_ACCOUNT_ENV: &str = "SERVICE_ACCOUNT";

pub use access_trait::ClusterAccessProvider;
pub use auth::{StaticToken, TokenSource, VaultAuth};
pub use error::AccessError;
pub use local::LocalClusterAccess;
pub use orch::OrchClusterAccess;
#[cfg(feature = "test-util")]
pub use mock::MockClusterAccess;
