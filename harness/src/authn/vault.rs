//! Provider API key lookup in Vault

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::HarnessError;

/// Secret path used when `VAULT_PATH` is not set
pub const DEFAULT_VAULT_PATH: &str = "secret/stack-testing/estf-cloud-staging";

const API_KEY_FIELD: &str = "apiKey";
const READ_ATTEMPTS: u32 = 10;
const READ_RETRY_DELAY: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of the provider API key
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn api_key(&self) -> Result<SecretString, HarnessError>;
}

/// Vault connection settings
#[derive(Debug, Default)]
pub struct VaultSettings {
    pub addr: Option<String>,
    pub token: Option<SecretString>,
    pub path: Option<String>,
}

/// Vault KV v1 reader
pub struct VaultClient {
    client: Client,
    addr: String,
    token: SecretString,
    path: String,
}

impl VaultClient {
    /// `VAULT_ADDR` and `VAULT_TOKEN` are required
    pub fn new(settings: VaultSettings) -> Result<Self, HarnessError> {
        let addr = settings
            .addr
            .filter(|a| !a.is_empty())
            .ok_or_else(|| HarnessError::SecretError("VAULT_ADDR is not set".to_string()))?;
        let token = settings
            .token
            .filter(|t| !t.expose_secret().is_empty())
            .ok_or_else(|| HarnessError::SecretError("VAULT_TOKEN is not set".to_string()))?;
        let path = settings
            .path
            .unwrap_or_else(|| DEFAULT_VAULT_PATH.to_string());

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            addr: addr.trim_end_matches('/').to_string(),
            token,
            path: path.trim_start_matches('/').to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/v1/{}", self.addr, self.path)
    }

    async fn read_once(&self) -> Result<Value, HarnessError> {
        let url = self.url();
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Vault-Token", self.token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(HarnessError::TransportError {
                method: "GET".to_string(),
                path: format!("/v1/{}", self.path),
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Read the secret, retrying failed requests
    async fn read(&self) -> Result<Value, HarnessError> {
        let mut attempt = 1;
        loop {
            match self.read_once().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < READ_ATTEMPTS => {
                    warn!(
                        "Vault read attempt {}/{} failed: {}",
                        attempt, READ_ATTEMPTS, e
                    );
                    attempt += 1;
                    sleep(READ_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(HarnessError::SecretError(format!(
                        "Unable to read {} after {} attempts: {}",
                        self.path, READ_ATTEMPTS, e
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn api_key(&self) -> Result<SecretString, HarnessError> {
        let secret = self.read().await?;
        let key = extract_api_key(&secret)?;
        info!("Read provider API key from {}", self.path);
        Ok(key)
    }
}

fn extract_api_key(secret: &Value) -> Result<SecretString, HarnessError> {
    secret
        .get("data")
        .and_then(|data| data.get(API_KEY_FIELD))
        .and_then(Value::as_str)
        .map(|key| SecretString::from(key.to_string()))
        .ok_or_else(|| HarnessError::SecretError(format!("Secret has no {} field", API_KEY_FIELD)))
}
