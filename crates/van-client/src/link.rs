//! Links between sites
//!
//! A link is a token Secret re-created on the redeeming site with a cost
//! annotation; the VAN controller there claims it against the issuer and opens
//! the connector.

use crate::client::delete_if_present;
use crate::error::{is_status, VanError};
use crate::site::SITE_CONFIG_NAME;
use crate::token::{CLAIM_TOKEN_TYPE, CLAIM_URL_ANNOTATION, PASSWORD_KEY};
use crate::TYPE_LABEL;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client};
use tracing::info;

pub const COST_ANNOTATION: &str = "skupper.io/cost";
/// Cost of every fabric link
pub const LINK_COST: i32 = 1;

/// Build the connector Secret called `name` from a claim token.
pub fn connector_secret(token: &Secret, name: &str, namespace: &str, cost: i32) -> Result<Secret, VanError> {
    let labels = token.metadata.labels.clone().unwrap_or_default();
    if labels.get(TYPE_LABEL).map(String::as_str) != Some(CLAIM_TOKEN_TYPE) {
        return Err(VanError::InvalidRequest(format!(
            "secret {} is not a claim token",
            token.metadata.name.as_deref().unwrap_or_default()
        )));
    }

    let mut annotations = token.metadata.annotations.clone().unwrap_or_default();
    if !annotations.contains_key(CLAIM_URL_ANNOTATION) {
        return Err(VanError::InvalidRequest("claim token has no url".to_string()));
    }
    let has_password = token
        .data
        .as_ref()
        .is_some_and(|data| data.contains_key(PASSWORD_KEY));
    if !has_password {
        return Err(VanError::InvalidRequest("claim token has no password".to_string()));
    }
    annotations.insert(COST_ANNOTATION.to_string(), cost.to_string());

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        data: token.data.clone(),
        type_: token.type_.clone(),
        ..Default::default()
    })
}

/// Redeem `token` in `namespace` as connector `name`.
pub(crate) async fn create(client: Client, namespace: &str, token: &Secret, name: &str) -> Result<(), VanError> {
    let sites: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    if sites.get_opt(SITE_CONFIG_NAME).await?.is_none() {
        return Err(VanError::NotInstalled(namespace.to_string()));
    }

    let connector = connector_secret(token, name, namespace, LINK_COST)?;
    let secrets: Api<Secret> = Api::namespaced(client, namespace);
    match secrets.create(&PostParams::default(), &connector).await {
        Ok(_) => {}
        Err(e) if is_status(&e, 409) => {
            let mut existing = secrets.get(name).await?;
            existing.metadata.labels = connector.metadata.labels;
            existing.metadata.annotations = connector.metadata.annotations;
            existing.data = connector.data;
            secrets.replace(name, &PostParams::default(), &existing).await?;
        }
        Err(e) => return Err(e.into()),
    }

    let url = token
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(CLAIM_URL_ANNOTATION))
        .map(String::as_str)
        .unwrap_or_default();
    info!("Site configured to link to {} (name={})", url, name);
    Ok(())
}

/// Remove connector and claim record `name` from both namespaces' clusters.
pub(crate) async fn delete(source: Client, target: Client, namespace: &str, name: &str) -> Result<(), VanError> {
    let target_secrets: Api<Secret> = Api::namespaced(target, namespace);
    let source_secrets: Api<Secret> = Api::namespaced(source, namespace);

    let removed_target = delete_if_present(&target_secrets, name).await?;
    let removed_source = delete_if_present(&source_secrets, name).await?;
    if !removed_target && !removed_source {
        return Err(VanError::NoSuchLink(name.to_string()));
    }

    info!("Link {} removed", name);
    Ok(())
}
