use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::core::errors::{EnvaultError, RemoteError, Result};
use crate::core::models::key::KeyOperation;
use crate::core::models::remote::{JsonWebKey, RemoteKey, RemoteSecret};
use crate::core::traits::remote_vault::RemoteKeyVault;

const API_VERSION: &str = "7.4";
const SCOPE: &str = "https://vault.azure.net/.default";
const SECRET_CONTENT_TYPE: &str = "application/aes";

/// Secret name read once at connect time. Any answer, including 404,
/// proves the vault is reachable and the credentials work.
const PROBE_SECRET: &str = "envault-connectivity-probe";

/// Refresh tokens this long before they actually expire.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// Connection settings for an Azure Key Vault.
#[derive(Debug, Clone)]
pub struct AzureVaultConfig {
    pub vault_name: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Azure Key Vault over its REST API, authenticated with a service
/// principal (OAuth2 client credentials).
///
/// Calls are blocking: each one drives the async HTTP client on a
/// private current-thread runtime.
pub struct AzureKeyVault {
    vault_url: String,
    token_url: String,
    config: AzureVaultConfig,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    token: Mutex<Option<CachedToken>>,
    available: bool,
}

impl AzureKeyVault {
    /// Build the adapter and probe the vault once.
    ///
    /// An unreachable vault is not an error: the adapter reports itself
    /// unavailable and the registry falls back to local keys.
    pub fn connect(config: AzureVaultConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EnvaultError::BackendUnavailable {
                reason: format!("Failed to create async runtime: {e}"),
            })?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("envault/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EnvaultError::BackendUnavailable {
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        let mut vault = Self {
            vault_url: vault_url(&config.vault_name),
            token_url: format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                config.tenant_id
            ),
            config,
            client,
            runtime,
            token: Mutex::new(None),
            available: false,
        };

        vault.available = match vault.fetch_secret(PROBE_SECRET) {
            Ok(_) | Err(RemoteError::NotFound) => {
                info!(vault = %vault.vault_url, "connected to key vault");
                true
            }
            Err(e) => {
                warn!(vault = %vault.vault_url, error = %e, "key vault unreachable, using local registry only");
                false
            }
        };
        Ok(vault)
    }

    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .filter(|t| t.expires_at > Instant::now())
            .map(|t| t.value.clone())
    }

    async fn access_token(&self) -> std::result::Result<String, RemoteError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        debug!(tenant = %self.config.tenant_id, "requesting vault access token");
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", SCOPE),
            ])
            .send()
            .await
            .map_err(|e| RemoteError::unavailable(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(RemoteError::unavailable(format!(
                "authentication failed with status {}",
                resp.status()
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::unavailable(format!("unreadable token response: {e}")))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SLACK);
        let mut guard = self.token.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    /// Send one authenticated request and return the response body.
    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> std::result::Result<String, RemoteError> {
        let url = format!("{}/{path}?api-version={API_VERSION}", self.vault_url);
        self.runtime.block_on(async {
            let token = self.access_token().await?;
            let mut request = self.client.request(method, &url).bearer_auth(token);
            if let Some(body) = body {
                request = request.json(&body);
            }

            let resp = request
                .send()
                .await
                .map_err(|e| RemoteError::unavailable(format!("request failed: {e}")))?;
            let status = resp.status();
            let text = resp
                .text()
                .await
                .map_err(|e| RemoteError::unavailable(format!("unreadable response: {e}")))?;

            if status.is_success() {
                Ok(text)
            } else {
                Err(classify(status, &text))
            }
        })
    }

    fn fetch_secret(&self, name: &str) -> std::result::Result<RemoteSecret, RemoteError> {
        let body = self.send(Method::GET, &format!("secrets/{name}"), None)?;
        parse_secret(&body)
    }
}

impl RemoteKeyVault for AzureKeyVault {
    fn is_available(&self) -> bool {
        self.available
    }

    fn create_secret(
        &self,
        name: &str,
        value: &str,
        tags: &BTreeMap<String, String>,
    ) -> std::result::Result<(), RemoteError> {
        let body = json!({
            "value": value,
            "contentType": SECRET_CONTENT_TYPE,
            "tags": tags,
        });
        self.send(Method::PUT, &format!("secrets/{name}"), Some(body))?;
        debug!(secret = %name, "secret stored in vault");
        Ok(())
    }

    fn get_secret(&self, name: &str) -> std::result::Result<RemoteSecret, RemoteError> {
        self.fetch_secret(name)
    }

    fn create_asymmetric_key(
        &self,
        name: &str,
        size_bits: u32,
        ops: &[KeyOperation],
        tags: &BTreeMap<String, String>,
    ) -> std::result::Result<RemoteKey, RemoteError> {
        let key_ops: Vec<&str> = ops.iter().map(KeyOperation::as_str).collect();
        let body = json!({
            "kty": "RSA",
            "key_size": size_bits,
            "key_ops": key_ops,
            "tags": tags,
        });
        let resp = self.send(Method::POST, &format!("keys/{name}/create"), Some(body))?;
        debug!(key = %name, size_bits, "key pair created in vault");
        parse_key(name, &resp)
    }

    fn get_asymmetric_key(&self, name: &str) -> std::result::Result<RemoteKey, RemoteError> {
        let resp = self.send(Method::GET, &format!("keys/{name}"), None)?;
        parse_key(name, &resp)
    }

    fn name(&self) -> &str {
        &self.config.vault_name
    }
}

fn vault_url(vault_name: &str) -> String {
    format!("https://{vault_name}.vault.azure.net")
}

/// 404 is an answer; everything else is an outage.
fn classify(status: StatusCode, body: &str) -> RemoteError {
    if status == StatusCode::NOT_FOUND {
        return RemoteError::NotFound;
    }
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    RemoteError::unavailable(format!("vault returned {status}: {message}"))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Default)]
struct Attributes {
    enabled: Option<bool>,
    /// Unix seconds.
    created: Option<i64>,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct KeyBundle {
    key: JsonWebKey,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

fn created_at(attributes: &Attributes) -> Option<DateTime<Utc>> {
    attributes
        .created
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn parse_secret(body: &str) -> std::result::Result<RemoteSecret, RemoteError> {
    let bundle: SecretBundle = serde_json::from_str(body)
        .map_err(|e| RemoteError::unavailable(format!("unreadable secret bundle: {e}")))?;
    Ok(RemoteSecret {
        created: created_at(&bundle.attributes),
        enabled: bundle.attributes.enabled.unwrap_or(true),
        value: bundle.value,
        tags: bundle.tags,
    })
}

fn parse_key(name: &str, body: &str) -> std::result::Result<RemoteKey, RemoteError> {
    let bundle: KeyBundle = serde_json::from_str(body)
        .map_err(|e| RemoteError::unavailable(format!("unreadable key bundle: {e}")))?;
    Ok(RemoteKey {
        id: bundle.key.kid.clone().unwrap_or_else(|| name.to_string()),
        created: created_at(&bundle.attributes),
        enabled: bundle.attributes.enabled.unwrap_or(true),
        jwk: bundle.key,
        tags: bundle.tags,
    })
}
