//! Token claims
//!
//! The issuing site stores a claim record Secret (random password, expiry,
//! remaining uses). The caller receives a token Secret carrying the password and
//! the URL of the issuer's claims endpoint; redeeming it on another site is
//! [`crate::link`]'s job.

use crate::error::{is_status, VanError};
use crate::TYPE_LABEL;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, ObjectMeta, PostParams};
use kube::{Api, Client};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// `skupper.io/type` of the record kept by the issuer
pub const CLAIM_RECORD_TYPE: &str = "token-claim-record";
/// `skupper.io/type` of the secret handed to the redeeming site
pub const CLAIM_TOKEN_TYPE: &str = "token-claim";

pub const CLAIM_EXPIRATION_ANNOTATION: &str = "skupper.io/claim-expiration";
pub const CLAIMS_REMAINING_ANNOTATION: &str = "skupper.io/claims-remaining";
pub const CLAIM_URL_ANNOTATION: &str = "skupper.io/url";
pub const GENERATED_BY_ANNOTATION: &str = "skupper.io/generated-by";

/// Key of the password in both record and token
pub const PASSWORD_KEY: &str = "password";

/// Claim defaults
pub const CLAIM_PASSWORD_LENGTH: usize = 24;
pub const CLAIM_EXPIRY_MINUTES: i64 = 15;
pub const CLAIM_USES: u32 = 1;

/// LoadBalancer Service fronting the site's listeners and claims endpoint
pub const CLAIMS_SERVICE_NAME: &str = "skupper";
const CLAIMS_PORT_NAME: &str = "claims";
const CLAIMS_PORT_DEFAULT: i32 = 8081;

/// Random alphanumeric password of `len` characters
pub fn generate_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn password_data(password: &str) -> BTreeMap<String, ByteString> {
    BTreeMap::from([(PASSWORD_KEY.to_string(), ByteString(password.as_bytes().to_vec()))])
}

/// Claim record stored on the issuer
pub fn claim_record(name: &str, namespace: &str, password: &str, expiry: DateTime<Utc>, uses: u32) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(TYPE_LABEL.to_string(), CLAIM_RECORD_TYPE.to_string())])),
            annotations: Some(BTreeMap::from([
                (
                    CLAIM_EXPIRATION_ANNOTATION.to_string(),
                    expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                (CLAIMS_REMAINING_ANNOTATION.to_string(), uses.to_string()),
            ])),
            ..Default::default()
        },
        data: Some(password_data(password)),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Token handed to the redeeming site. Never persisted on the issuer.
pub fn claim_token(name: &str, password: &str, url: &str, issuer: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(TYPE_LABEL.to_string(), CLAIM_TOKEN_TYPE.to_string())])),
            annotations: Some(BTreeMap::from([
                (CLAIM_URL_ANNOTATION.to_string(), url.to_string()),
                (GENERATED_BY_ANNOTATION.to_string(), issuer.to_string()),
            ])),
            ..Default::default()
        },
        data: Some(password_data(password)),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Claims URL for record `name` served behind `service`, if it has an address yet.
pub fn claims_url_from_service(service: &Service, name: &str) -> Option<String> {
    let ingress = service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?;
    let host = ingress
        .ip
        .as_deref()
        .filter(|ip| !ip.is_empty())
        .or(ingress.hostname.as_deref().filter(|h| !h.is_empty()))?;

    let port = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.iter().find(|p| p.name.as_deref() == Some(CLAIMS_PORT_NAME)))
        .map(|p| p.port)
        .unwrap_or(CLAIMS_PORT_DEFAULT);

    Some(format!("https://{}:{}/{}", host, port, name))
}

/// Issue a claim called `name` in `namespace`.
///
/// An existing record with the same name is replaced once; a second conflict is
/// returned as [`VanError::AlreadyExists`].
pub(crate) async fn create_claim(client: Client, namespace: &str, name: &str) -> Result<Secret, VanError> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let service = services
        .get_opt(CLAIMS_SERVICE_NAME)
        .await?
        .ok_or_else(|| VanError::NotInstalled(namespace.to_string()))?;
    let url = claims_url_from_service(&service, name)
        .ok_or_else(|| VanError::ClaimsEndpointNotReady(format!("{}/{}", namespace, CLAIMS_SERVICE_NAME)))?;

    let secrets: Api<Secret> = Api::namespaced(client, namespace);
    let password = generate_password(CLAIM_PASSWORD_LENGTH);
    let expiry = Utc::now() + chrono::Duration::minutes(CLAIM_EXPIRY_MINUTES);
    let record = claim_record(name, namespace, &password, expiry, CLAIM_USES);
    let pp = PostParams::default();

    match secrets.create(&pp, &record).await {
        Ok(_) => {}
        Err(e) if is_status(&e, 409) => {
            info!("Token {} already exists, reissuing", name);
            secrets.delete(name, &DeleteParams::default()).await?;
            match secrets.create(&pp, &record).await {
                Ok(_) => {}
                Err(e) if is_status(&e, 409) => return Err(VanError::AlreadyExists(name.to_string())),
                Err(e) => return Err(e.into()),
            }
        }
        Err(e) => return Err(e.into()),
    }

    debug!("Claim {} issued in {} (expires {})", name, namespace, expiry);
    Ok(claim_token(name, &password, &url, namespace))
}
