//! Mock VanClient for unit testing
//!
//! Keeps the data plane of every cluster in memory. A cluster is identified by
//! the first DNS label of the connection's host, so a connection to
//! `https://c1.cluster.test` operates on cluster `c1`.

use crate::error::VanError;
use crate::interface::validate_target;
use crate::link::{connector_secret, LINK_COST};
use crate::site::IngressMode;
use crate::token::claim_token;
use crate::van_trait::VanClientTrait;
use crate::DEFAULT_NAMESPACE;
use k8s_openapi::api::core::v1::Secret;
use kube::Config;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Operation kinds, used to script failures and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VanOp {
    InitSite,
    DeleteSite,
    CreateTokenClaim,
    CreateLink,
    DeleteLink,
    ExposeService,
    UnexposeService,
}

/// A recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VanCall {
    InitSite { cluster: String, ingress: IngressMode },
    DeleteSite { cluster: String },
    CreateTokenClaim { cluster: String, name: String },
    CreateLink { cluster: String, name: String },
    DeleteLink { source: String, target: String, name: String },
    ExposeService { cluster: String, target_name: String, address: String, ports: Vec<i32> },
    UnexposeService { cluster: String, target_name: String, address: String },
}

impl VanCall {
    pub fn op(&self) -> VanOp {
        match self {
            VanCall::InitSite { .. } => VanOp::InitSite,
            VanCall::DeleteSite { .. } => VanOp::DeleteSite,
            VanCall::CreateTokenClaim { .. } => VanOp::CreateTokenClaim,
            VanCall::CreateLink { .. } => VanOp::CreateLink,
            VanCall::DeleteLink { .. } => VanOp::DeleteLink,
            VanCall::ExposeService { .. } => VanOp::ExposeService,
            VanCall::UnexposeService { .. } => VanOp::UnexposeService,
        }
    }
}

/// An established link as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLink {
    /// Cluster that issued the claim
    pub issuer: String,
    /// Cluster holding the connector
    pub connector: String,
}

/// Mock VanClient for testing
#[derive(Clone, Default)]
pub struct MockVanClient {
    sites: Arc<Mutex<HashMap<String, IngressMode>>>,
    claims: Arc<Mutex<HashMap<String, String>>>,
    links: Arc<Mutex<HashMap<String, MockLink>>>,
    exposed: Arc<Mutex<HashMap<(String, String), Vec<i32>>>>,
    calls: Arc<Mutex<Vec<VanCall>>>,
    failures: Arc<Mutex<HashMap<VanOp, VecDeque<VanError>>>>,
}

impl std::fmt::Debug for MockVanClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockVanClient").finish_non_exhaustive()
    }
}

/// Cluster id a connection points at
pub fn cluster_of(conn: &Config) -> String {
    conn.cluster_url
        .host()
        .and_then(|host| host.split('.').next())
        .unwrap_or_default()
        .to_string()
}

fn not_installed() -> VanError {
    VanError::NotInstalled(DEFAULT_NAMESPACE.to_string())
}

impl MockVanClient {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-install a site on `cluster`
    pub fn install_site(&self, cluster: &str, ingress: IngressMode) {
        self.sites.lock().unwrap().insert(cluster.to_string(), ingress);
    }

    /// Make the next `op` fail with `err` (queued per operation)
    pub fn fail_next(&self, op: VanOp, err: VanError) {
        self.failures.lock().unwrap().entry(op).or_default().push_back(err);
    }

    /// Installed site ingress on `cluster`
    pub fn site(&self, cluster: &str) -> Option<IngressMode> {
        self.sites.lock().unwrap().get(cluster).copied()
    }

    pub fn link(&self, name: &str) -> Option<MockLink> {
        self.links.lock().unwrap().get(name).cloned()
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    /// Ports `address` is bound on in `cluster`
    pub fn exposed_ports(&self, cluster: &str, address: &str) -> Option<Vec<i32>> {
        self.exposed
            .lock()
            .unwrap()
            .get(&(cluster.to_string(), address.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<VanCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls of kind `op`
    pub fn count(&self, op: VanOp) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.op() == op).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: VanCall) -> Result<(), VanError> {
        let op = call.op();
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn require_site(&self, cluster: &str) -> Result<IngressMode, VanError> {
        self.site(cluster).ok_or_else(not_installed)
    }
}

#[async_trait::async_trait]
impl VanClientTrait for MockVanClient {
    async fn init_site(&self, conn: &Config, ingress: IngressMode) -> Result<(), VanError> {
        let cluster = cluster_of(conn);
        self.record(VanCall::InitSite {
            cluster: cluster.clone(),
            ingress,
        })?;
        self.sites.lock().unwrap().insert(cluster, ingress);
        Ok(())
    }

    async fn delete_site(&self, conn: &Config) -> Result<(), VanError> {
        let cluster = cluster_of(conn);
        self.record(VanCall::DeleteSite {
            cluster: cluster.clone(),
        })?;
        if self.sites.lock().unwrap().remove(&cluster).is_none() {
            return Err(not_installed());
        }
        self.exposed.lock().unwrap().retain(|(c, _), _| *c != cluster);
        Ok(())
    }

    async fn create_token_claim(&self, conn: &Config, name: &str) -> Result<Secret, VanError> {
        let cluster = cluster_of(conn);
        self.record(VanCall::CreateTokenClaim {
            cluster: cluster.clone(),
            name: name.to_string(),
        })?;
        if self.require_site(&cluster)? != IngressMode::LoadBalancer {
            return Err(VanError::ClaimsEndpointNotReady(cluster));
        }
        self.claims.lock().unwrap().insert(name.to_string(), cluster.clone());
        let url = format!("https://{}:8081/{}", cluster, name);
        Ok(claim_token(name, "mock-password", &url, &cluster))
    }

    async fn create_link(&self, conn: &Config, secret: &Secret, name: &str) -> Result<(), VanError> {
        let cluster = cluster_of(conn);
        self.record(VanCall::CreateLink {
            cluster: cluster.clone(),
            name: name.to_string(),
        })?;
        self.require_site(&cluster)?;
        connector_secret(secret, name, DEFAULT_NAMESPACE, LINK_COST)?;
        let issuer = self
            .claims
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| VanError::InvalidRequest(format!("no claim issued for {}", name)))?;
        self.links.lock().unwrap().insert(
            name.to_string(),
            MockLink {
                issuer,
                connector: cluster,
            },
        );
        Ok(())
    }

    async fn delete_link(&self, source: &Config, target: &Config, name: &str) -> Result<(), VanError> {
        self.record(VanCall::DeleteLink {
            source: cluster_of(source),
            target: cluster_of(target),
            name: name.to_string(),
        })?;
        let claimed = self.claims.lock().unwrap().remove(name).is_some();
        let linked = self.links.lock().unwrap().remove(name).is_some();
        if !claimed && !linked {
            return Err(VanError::NoSuchLink(name.to_string()));
        }
        Ok(())
    }

    async fn expose_service(
        &self,
        conn: &Config,
        target_name: &str,
        target_type: &str,
        address: &str,
        ports: &[i32],
    ) -> Result<(), VanError> {
        validate_target(target_type, address)?;
        let cluster = cluster_of(conn);
        self.record(VanCall::ExposeService {
            cluster: cluster.clone(),
            target_name: target_name.to_string(),
            address: address.to_string(),
            ports: ports.to_vec(),
        })?;
        self.require_site(&cluster)?;
        self.exposed
            .lock()
            .unwrap()
            .insert((cluster, address.to_string()), ports.to_vec());
        Ok(())
    }

    async fn unexpose_service(
        &self,
        conn: &Config,
        target_name: &str,
        target_type: &str,
        address: &str,
    ) -> Result<(), VanError> {
        validate_target(target_type, address)?;
        let cluster = cluster_of(conn);
        self.record(VanCall::UnexposeService {
            cluster: cluster.clone(),
            target_name: target_name.to_string(),
            address: address.to_string(),
        })?;
        self.require_site(&cluster)?;
        if self
            .exposed
            .lock()
            .unwrap()
            .remove(&(cluster, address.to_string()))
            .is_none()
        {
            return Err(VanError::NoInterfaces(address.to_string()));
        }
        Ok(())
    }
}
