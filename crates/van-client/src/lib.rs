//! VAN data-plane adapter
//!
//! Drives the VAN (virtual application network) agent on a member cluster by
//! managing its declarative objects: the site and router configuration, token
//! claims, link connectors and service interfaces. All operations take the
//! member cluster connection explicitly and hold no state between calls.
//!
//! # Example
//!
//! ```no_run
//! use van_client::{IngressMode, VanClient, VanClientTrait};
//!
//! # async fn example(hub: kube::Config, spoke: kube::Config) -> Result<(), van_client::VanError> {
//! let van = VanClient::new();
//!
//! // Install both sites; only the hub accepts incoming links
//! van.init_site(&hub, IngressMode::LoadBalancer).await?;
//! van.init_site(&spoke, IngressMode::None).await?;
//!
//! // Issue a claim on the hub and redeem it on the spoke
//! let token = van.create_token_claim(&hub, "hub-spoke").await?;
//! van.create_link(&spoke, &token, "hub-spoke").await?;
//!
//! // Expose a hub service over the fabric
//! van.expose_service(&hub, "web", "service", "web", &[80, 443]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Failures the reconcilers act on are typed: see [`VanError::is_not_installed`],
//! [`VanError::is_no_such_link`] and [`VanError::is_no_interfaces`].

pub mod client;
pub mod error;
pub mod interface;
pub mod link;
pub mod policy;
pub mod site;
pub mod token;
#[path = "trait.rs"]
pub mod van_trait;
#[cfg(feature = "test-util")]
pub mod mock;

/// Namespace the data plane lives in on every member cluster
pub const DEFAULT_NAMESPACE: &str = "interconnect";

/// Label carrying the VAN object type
pub const TYPE_LABEL: &str = "skupper.io/type";

pub use client::VanClient;
pub use error::VanError;
pub use site::IngressMode;
pub use van_trait::VanClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockVanClient, VanCall, VanOp};
