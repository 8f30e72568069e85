//! Machine-to-machine tokens for deployment-manager calls
//!
//! The controller logs in to Vault with its Kubernetes service account, reads
//! its Keycloak client secret, and exchanges it for an access token using the
//! client-credentials grant. Tokens are cached until shortly before expiry.

use crate::error::AccessError;
use crate::{KEYCLOAK_SERVER_ENV, SERVICE_ACCOUNT_ENV, VAULT_SERVER_ENV};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const KEYCLOAK_REALM: &str = "master";
/// Refresh this long before the token actually expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Source of bearer tokens for outbound RPC
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn m2m_token(&self) -> Result<String, AccessError>;
}

/// Fixed token, for development and tests
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn m2m_token(&self) -> Result<String, AccessError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct VaultLoginResponse {
    auth: VaultAuthInfo,
}

#[derive(Debug, Deserialize)]
struct VaultAuthInfo {
    client_token: String,
}

#[derive(Debug, Deserialize)]
struct VaultSecretResponse {
    data: VaultSecretData,
}

#[derive(Debug, Deserialize)]
struct VaultSecretData {
    data: ClientCredentials,
}

#[derive(Debug, Deserialize)]
struct ClientCredentials {
    #[serde(default)]
    client_id: Option<String>,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

/// Vault + Keycloak token source
#[derive(Debug)]
pub struct VaultAuth {
    http: Client,
    keycloak_server: String,
    vault_server: String,
    service_account: String,
    cached: Mutex<Option<CachedToken>>,
}

fn required_env(name: &str) -> Result<String, AccessError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AccessError::MissingConfig(format!("{} is not set", name)))
}

impl VaultAuth {
    pub fn new(
        keycloak_server: impl Into<String>,
        vault_server: impl Into<String>,
        service_account: impl Into<String>,
    ) -> Result<Self, AccessError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            keycloak_server: keycloak_server.into().trim_end_matches('/').to_string(),
            vault_server: vault_server.into().trim_end_matches('/').to_string(),
            service_account: service_account.into(),
            cached: Mutex::new(None),
        })
    }

    /// Build from `KEYCLOAK_SERVER`, `VAULT_SERVER` and `SERVICE_ACCOUNT`
    pub fn from_env() -> Result<Self, AccessError> {
        Self::new(
            required_env(KEYCLOAK_SERVER_ENV)?,
            required_env(VAULT_SERVER_ENV)?,
            required_env(SERVICE_ACCOUNT_ENV)?,
        )
    }

    async fn vault_login(&self) -> Result<String, AccessError> {
        let jwt = tokio::fs::read_to_string(SERVICE_ACCOUNT_TOKEN_PATH)
            .await
            .map_err(|e| AccessError::Auth(format!("reading service account token: {}", e)))?;
        let url = format!("{}/v1/auth/kubernetes/login", self.vault_server);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "role": self.service_account, "jwt": jwt.trim() }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AccessError::Auth(format!("vault login failed: {}", response.status())));
        }
        let login: VaultLoginResponse = response.json().await?;
        Ok(login.auth.client_token)
    }

    async fn client_credentials(&self, vault_token: &str) -> Result<ClientCredentials, AccessError> {
        let url = format!("{}/v1/secret/data/{}", self.vault_server, self.service_account);
        let response = self
            .http
            .get(&url)
            .header("X-Vault-Token", vault_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AccessError::Auth(format!(
                "reading client secret from vault failed: {}",
                response.status()
            )));
        }
        let secret: VaultSecretResponse = response.json().await?;
        Ok(secret.data.data)
    }

    async fn vault_logout(&self, vault_token: &str) {
        let url = format!("{}/v1/auth/token/revoke-self", self.vault_server);
        if let Err(e) = self
            .http
            .post(&url)
            .header("X-Vault-Token", vault_token)
            .send()
            .await
        {
            warn!("Vault logout failed: {}", e);
        }
    }

    async fn fetch_token(&self) -> Result<CachedToken, AccessError> {
        let vault_token = self.vault_login().await?;
        let credentials = self.client_credentials(&vault_token).await;
        self.vault_logout(&vault_token).await;
        let credentials = credentials?;

        let client_id = credentials
            .client_id
            .unwrap_or_else(|| self.service_account.clone());
        let url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.keycloak_server, KEYCLOAK_REALM
        );
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AccessError::Auth(format!("token request failed: {}", response.status())));
        }
        let token: TokenResponse = response.json().await?;
        debug!("Obtained M2M token valid for {}s", token.expires_in);
        Ok(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

#[async_trait::async_trait]
impl TokenSource for VaultAuth {
    async fn m2m_token(&self) -> Result<String, AccessError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.token.clone());
        }
        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
