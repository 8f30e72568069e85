//! Service interfaces
//!
//! Every fabric address is one JSON entry in the `skupper-services` ConfigMap,
//! keyed by address. Binding a member service adds it as a target of that
//! address; unbinding removes the target and drops the address once it has none.

use crate::error::{is_status, VanError};
use crate::policy::PolicyGate;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::PostParams;
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// ConfigMap holding all service interfaces of a site
pub const SERVICES_CONFIG_NAME: &str = "skupper-services";

/// The only supported target type
pub const TARGET_TYPE_SERVICE: &str = "service";

/// A fabric address and the local workloads backing it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInterface {
    pub address: String,
    pub protocol: String,
    pub ports: Vec<i32>,
    /// Set when the interface was synced from a remote site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default)]
    pub tls_credentials: String,
    #[serde(default)]
    pub publish_not_ready_addresses: bool,
    #[serde(default)]
    pub bridge_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_mode: Option<String>,
    #[serde(default)]
    pub targets: Vec<ServiceInterfaceTarget>,
}

/// A local Service bound to an address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInterfaceTarget {
    pub name: String,
    pub service: String,
    #[serde(default)]
    pub target_ports: BTreeMap<i32, i32>,
}

impl ServiceInterface {
    /// Plain TCP interface without TLS, bridge image override or ingress mode
    pub fn new(address: impl Into<String>, ports: &[i32]) -> Self {
        Self {
            address: address.into(),
            protocol: "tcp".to_string(),
            ports: ports.to_vec(),
            ..Self::default()
        }
    }

    /// Bind `target_name` on `ports`, replacing any previous binding of the same target.
    pub fn bind(&mut self, target_name: &str, ports: &[i32]) {
        self.origin = None;
        self.ports = ports.to_vec();
        let target = ServiceInterfaceTarget {
            name: target_name.to_string(),
            service: target_name.to_string(),
            target_ports: ports.iter().map(|p| (*p, *p)).collect(),
        };
        match self.targets.iter_mut().find(|t| t.name == target_name) {
            Some(existing) => *existing = target,
            None => self.targets.push(target),
        }
    }

    /// Remove `target_name`; true when no targets remain.
    pub fn unbind(&mut self, target_name: &str) -> bool {
        self.targets.retain(|t| t.name != target_name);
        self.targets.is_empty()
    }
}

/// Reject target types and addresses the fabric does not support.
pub fn validate_target(target_type: &str, address: &str) -> Result<(), VanError> {
    if target_type == "deployment" {
        return Err(VanError::InvalidRequest(
            "exposing target type deployment isn't supported".to_string(),
        ));
    }
    if target_type != TARGET_TYPE_SERVICE {
        return Err(VanError::InvalidRequest(format!("unsupported target type '{}'", target_type)));
    }
    if address.is_empty() {
        return Err(VanError::InvalidRequest(
            "address is required for target type 'service'".to_string(),
        ));
    }
    Ok(())
}

async fn write_services(api: &Api<ConfigMap>, namespace: &str, cm: &ConfigMap) -> Result<(), VanError> {
    match api.replace(SERVICES_CONFIG_NAME, &PostParams::default(), cm).await {
        Ok(_) => Ok(()),
        Err(e) if is_status(&e, 404) => Err(VanError::NotInstalled(namespace.to_string())),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn expose(
    client: Client,
    namespace: &str,
    target_name: &str,
    target_type: &str,
    address: &str,
    ports: &[i32],
) -> Result<(), VanError> {
    validate_target(target_type, address)?;

    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let mut cm = api
        .get_opt(SERVICES_CONFIG_NAME)
        .await?
        .ok_or_else(|| VanError::NotInstalled(namespace.to_string()))?;
    let policy = PolicyGate::load(client, namespace).await?;
    policy.expose(target_type, target_name)?;

    let data = cm.data.get_or_insert_with(BTreeMap::new);
    let mut interface = match data.get(address) {
        Some(raw) => serde_json::from_str::<ServiceInterface>(raw)?,
        None => {
            policy.service(address)?;
            ServiceInterface::new(address, ports)
        }
    };
    interface.bind(target_name, ports);
    data.insert(address.to_string(), serde_json::to_string(&interface)?);

    write_services(&api, namespace, &cm).await?;
    info!("{} {} exposed as {}", target_type, target_name, address);
    Ok(())
}

pub(crate) async fn unexpose(
    client: Client,
    namespace: &str,
    target_name: &str,
    target_type: &str,
    address: &str,
) -> Result<(), VanError> {
    validate_target(target_type, address)?;

    let api: Api<ConfigMap> = Api::namespaced(client, namespace);
    let mut cm = api
        .get_opt(SERVICES_CONFIG_NAME)
        .await?
        .ok_or_else(|| VanError::NotInstalled(namespace.to_string()))?;

    let data = cm.data.get_or_insert_with(BTreeMap::new);
    let Some(raw) = data.get(address) else {
        return Err(VanError::NoInterfaces(address.to_string()));
    };
    let mut interface = serde_json::from_str::<ServiceInterface>(raw)?;
    if interface.unbind(target_name) {
        data.remove(address);
    } else {
        data.insert(address.to_string(), serde_json::to_string(&interface)?);
    }

    write_services(&api, namespace, &cm).await?;
    info!("{} {} unexposed", target_type, target_name);
    Ok(())
}
