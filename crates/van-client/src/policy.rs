//! Cluster policy gate
//!
//! When the `SkupperClusterPolicy` CRD is installed, exposing a resource and
//! creating a service address must be allowed by at least one policy that
//! applies to the site's namespace. Without the CRD everything is allowed.

use crate::error::{is_status, VanError};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::{Api, Client};
use serde::Deserialize;
use tracing::debug;

pub const POLICY_GROUP: &str = "skupper.io";
pub const POLICY_VERSION: &str = "v1alpha1";
pub const POLICY_KIND: &str = "SkupperClusterPolicy";
const POLICY_PLURAL: &str = "skupperclusterpolicies";

const WILDCARD: &str = "*";

/// The parts of a policy's spec the gate evaluates
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterPolicySpec {
    pub namespaces: Vec<String>,
    pub allowed_exposed_resources: Vec<String>,
    pub allowed_services: Vec<String>,
}

fn matches_any(patterns: &[String], value: &str) -> bool {
    patterns.iter().any(|p| p == WILDCARD || p == value)
}

/// Evaluates expose and service requests for one namespace
#[derive(Debug, Clone)]
pub struct PolicyGate {
    namespace: String,
    /// `None` when the policy CRD is not installed
    policies: Option<Vec<ClusterPolicySpec>>,
}

impl PolicyGate {
    /// Gate that allows everything
    pub fn disabled(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            policies: None,
        }
    }

    /// Gate over `policies`, keeping only those that apply to `namespace`
    pub fn new(namespace: impl Into<String>, policies: Vec<ClusterPolicySpec>) -> Self {
        let namespace = namespace.into();
        let applicable = policies
            .into_iter()
            .filter(|p| matches_any(&p.namespaces, &namespace))
            .collect();
        Self {
            namespace,
            policies: Some(applicable),
        }
    }

    /// Load the policies installed on the cluster behind `client`
    pub(crate) async fn load(client: Client, namespace: &str) -> Result<Self, VanError> {
        let gvk = GroupVersionKind::gvk(POLICY_GROUP, POLICY_VERSION, POLICY_KIND);
        let resource = ApiResource::from_gvk_with_plural(&gvk, POLICY_PLURAL);
        let api: Api<DynamicObject> = Api::all_with(client, &resource);

        let list = match api.list(&ListParams::default()).await {
            Ok(list) => list,
            Err(e) if is_status(&e, 404) => {
                debug!("{} is not installed, policy disabled", POLICY_KIND);
                return Ok(Self::disabled(namespace));
            }
            Err(e) => return Err(e.into()),
        };

        let mut policies = Vec::with_capacity(list.items.len());
        for item in list.items {
            let spec = item.data.get("spec").cloned().unwrap_or_else(|| serde_json::json!({}));
            policies.push(serde_json::from_value::<ClusterPolicySpec>(spec)?);
        }
        Ok(Self::new(namespace, policies))
    }

    pub fn is_enabled(&self) -> bool {
        self.policies.is_some()
    }

    /// Whether `target_type/target_name` may be exposed
    pub fn expose(&self, target_type: &str, target_name: &str) -> Result<(), VanError> {
        let Some(policies) = &self.policies else {
            return Ok(());
        };
        let resource = format!("{}/{}", target_type, target_name);
        if policies.iter().any(|p| matches_any(&p.allowed_exposed_resources, &resource)) {
            return Ok(());
        }
        Err(VanError::PolicyDenied(format!(
            "{} cannot be exposed in namespace {}",
            resource, self.namespace
        )))
    }

    /// Whether service address `address` may be created
    pub fn service(&self, address: &str) -> Result<(), VanError> {
        let Some(policies) = &self.policies else {
            return Ok(());
        };
        if policies.iter().any(|p| matches_any(&p.allowed_services, address)) {
            return Ok(());
        }
        Err(VanError::PolicyDenied(format!(
            "service {} is not allowed in namespace {}",
            address, self.namespace
        )))
    }
}
