//! Site installation and removal
//!
//! A site is realised as two ConfigMaps in the data-plane namespace: the site
//! configuration (`skupper-site`) read by the VAN controller, and the router
//! configuration (`skupper-internal`). Gateways are ConfigMaps labelled
//! `skupper.io/type=gateway-definition`.

use crate::client::delete_if_present;
use crate::error::VanError;
use crate::TYPE_LABEL;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ListParams, ObjectMeta, PostParams};
use kube::{Api, Client};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Site configuration ConfigMap name
pub const SITE_CONFIG_NAME: &str = "skupper-site";
/// Router configuration ConfigMap name
pub const ROUTER_CONFIG_NAME: &str = "skupper-internal";
/// `skupper.io/type` value for gateway definitions
pub const GATEWAY_TYPE: &str = "gateway-definition";

/// Router defaults
pub const ROUTER_MAX_FRAME_SIZE_DEFAULT: u32 = 16384;
pub const ROUTER_MAX_SESSION_FRAMES_DEFAULT: u32 = 640;

const INTER_ROUTER_PORT: u16 = 55671;
const EDGE_PORT: u16 = 45671;

/// Ingress a site is installed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IngressMode {
    /// Site cannot accept incoming links
    #[default]
    None,
    /// Site exposes its listeners (and claims endpoint) through a LoadBalancer Service
    LoadBalancer,
}

impl IngressMode {
    /// Value written to the site configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            IngressMode::None => "none",
            IngressMode::LoadBalancer => "loadbalancer",
        }
    }
}

impl fmt::Display for IngressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options a site is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub name: String,
    pub ingress: IngressMode,
    pub service_sync: bool,
    pub cluster_permissions: bool,
    pub service_controller: bool,
    pub skupper_events: bool,
    pub console: bool,
    pub flow_collector: bool,
    pub network_policy: bool,
    pub rest_api: bool,
    pub max_frame_size: u32,
    pub max_session_frames: u32,
    pub mutual_tls: bool,
}

impl SiteConfig {
    /// Interior site with the fabric's fixed option set.
    ///
    /// Cluster-wide permissions are on so services in other namespaces can be
    /// bound; console, flow collector, network policy and REST API stay off.
    pub fn new(name: impl Into<String>, ingress: IngressMode) -> Self {
        Self {
            name: name.into(),
            ingress,
            service_sync: true,
            cluster_permissions: true,
            service_controller: true,
            skupper_events: true,
            console: false,
            flow_collector: false,
            network_policy: false,
            rest_api: false,
            max_frame_size: ROUTER_MAX_FRAME_SIZE_DEFAULT,
            max_session_frames: ROUTER_MAX_SESSION_FRAMES_DEFAULT,
            mutual_tls: true,
        }
    }

    /// ConfigMap data for `skupper-site`
    pub fn to_data(&self) -> BTreeMap<String, String> {
        let flag = |b: bool| b.to_string();
        BTreeMap::from([
            ("name".to_string(), self.name.clone()),
            ("router-mode".to_string(), "interior".to_string()),
            ("ingress".to_string(), self.ingress.as_str().to_string()),
            ("service-sync".to_string(), flag(self.service_sync)),
            ("cluster-permissions".to_string(), flag(self.cluster_permissions)),
            ("service-controller".to_string(), flag(self.service_controller)),
            ("enable-skupper-events".to_string(), flag(self.skupper_events)),
            ("console".to_string(), flag(self.console)),
            ("flow-collector".to_string(), flag(self.flow_collector)),
            ("create-network-policy".to_string(), flag(self.network_policy)),
            ("enable-rest-api".to_string(), flag(self.rest_api)),
            ("xp-router-max-frame-size".to_string(), self.max_frame_size.to_string()),
            ("xp-router-max-session-frames".to_string(), self.max_session_frames.to_string()),
            ("router-disable-mutual-tls".to_string(), flag(!self.mutual_tls)),
        ])
    }

    /// The `skupper-site` ConfigMap
    pub fn to_config_map(&self, namespace: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(SITE_CONFIG_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(self.to_data()),
            ..Default::default()
        }
    }

    /// Router configuration (`skrouterd.json`) for this site
    pub fn router_config(&self) -> serde_json::Value {
        let mut entries = vec![
            json!(["router", {
                "id": format!("{}-${{HOSTNAME}}", self.name),
                "mode": "interior",
                "metadata": json!({"id": self.name}).to_string(),
            }]),
            json!(["listener", {
                "name": "interior-listener",
                "role": "inter-router",
                "port": INTER_ROUTER_PORT,
                "maxFrameSize": self.max_frame_size,
                "maxSessionFrames": self.max_session_frames,
                "authenticatePeer": self.mutual_tls,
                "sslProfile": "skupper-internal",
            }]),
        ];
        if self.ingress == IngressMode::LoadBalancer {
            entries.push(json!(["listener", {
                "name": "edge-listener",
                "role": "edge",
                "port": EDGE_PORT,
                "maxFrameSize": self.max_frame_size,
                "maxSessionFrames": self.max_session_frames,
                "authenticatePeer": self.mutual_tls,
                "sslProfile": "skupper-internal",
            }]));
        }
        serde_json::Value::Array(entries)
    }

    /// The `skupper-internal` ConfigMap
    pub fn to_router_config_map(&self, namespace: &str) -> Result<ConfigMap, VanError> {
        let router = serde_json::to_string_pretty(&self.router_config())?;
        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(ROUTER_CONFIG_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("skrouterd.json".to_string(), router)])),
            ..Default::default()
        })
    }
}

/// Create or update `desired`, keeping the live object's metadata on update.
async fn apply_config_map(api: &Api<ConfigMap>, desired: ConfigMap) -> Result<bool, VanError> {
    let name = desired.metadata.name.clone().unwrap_or_default();
    match api.get_opt(&name).await? {
        None => {
            api.create(&PostParams::default(), &desired).await?;
            Ok(true)
        }
        Some(mut existing) => {
            existing.data = desired.data;
            api.replace(&name, &PostParams::default(), &existing).await?;
            Ok(false)
        }
    }
}

/// Install (or reconfigure) the site in `namespace`.
pub(crate) async fn init(client: Client, namespace: &str, ingress: IngressMode) -> Result<(), VanError> {
    let api: Api<ConfigMap> = Api::namespaced(client, namespace);
    let site = SiteConfig::new(namespace, ingress);

    if apply_config_map(&api, site.to_config_map(namespace)).await? {
        info!("Site config created in {} (ingress={})", namespace, ingress);
    } else {
        info!("Site config updated in {} (ingress={})", namespace, ingress);
    }

    apply_config_map(&api, site.to_router_config_map(namespace)?).await?;
    debug!("Router configured in {}", namespace);
    Ok(())
}

/// Remove gateways, the site configuration and the router from `namespace`.
pub(crate) async fn delete(client: Client, namespace: &str) -> Result<(), VanError> {
    let api: Api<ConfigMap> = Api::namespaced(client, namespace);

    let selector = format!("{}={}", TYPE_LABEL, GATEWAY_TYPE);
    let gateways = api.list(&ListParams::default().labels(&selector)).await?;
    for gateway in gateways {
        let Some(name) = gateway.metadata.name else { continue };
        // Gateways must be gone before the site
        if delete_if_present(&api, &name).await? {
            debug!("Removed gateway {} from {}", name, namespace);
        }
    }

    let site_removed = delete_if_present(&api, SITE_CONFIG_NAME).await?;
    let router_removed = delete_if_present(&api, ROUTER_CONFIG_NAME).await?;
    if !site_removed && !router_removed {
        return Err(VanError::NotInstalled(namespace.to_string()));
    }

    info!("VAN is now removed from {}", namespace);
    Ok(())
}
