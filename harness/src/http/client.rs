//! HTTP client implementation

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{header, Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, error};

use crate::errors::HarnessError;

/// Header Kibana requires on mutating API calls
pub const CSRF_HEADER: &str = "kbn-xsrf";
const CSRF_VALUE: &str = "automation";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authorization attached to every request
pub enum Auth {
    /// `Authorization: ApiKey <key>`, used by the provider API
    ApiKey(SecretString),

    /// `Authorization: Basic <base64(user:password)>`, used by the clusters
    Basic {
        username: String,
        password: SecretString,
    },
}

impl Auth {
    fn header_value(&self) -> String {
        match self {
            Auth::ApiKey(key) => format!("ApiKey {}", key.expose_secret()),
            Auth::Basic { username, password } => {
                let raw = format!("{}:{}", username, password.expose_secret());
                format!("Basic {}", STANDARD.encode(raw))
            }
        }
    }
}

/// Which response statuses count as success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPolicy {
    /// Any 2xx
    AnySuccess,

    /// Exactly 200
    OkOnly,
}

impl StatusPolicy {
    fn accepts(&self, status: StatusCode) -> bool {
        match self {
            StatusPolicy::AnySuccess => status.is_success(),
            StatusPolicy::OkOnly => status == StatusCode::OK,
        }
    }
}

/// Sends one request and returns the decoded JSON body
///
/// An empty body decodes to `Value::Null`. The CSRF flag is only honoured by
/// transports talking to Kibana.
#[async_trait]
pub trait RestTransport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        csrf: bool,
    ) -> Result<Value, HarnessError>;
}

/// HTTP client bound to one base URL and one set of credentials
pub struct HttpClient {
    client: Client,
    base_url: String,
    auth: Auth,
    policy: StatusPolicy,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, auth: Auth, policy: StatusPolicy) -> Result<Self, HarnessError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            policy,
        })
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<Value, HarnessError> {
        self.request(Method::GET, path, None, false).await
    }

    /// Make a POST request
    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value, HarnessError> {
        self.request(Method::POST, path, body, false).await
    }

    /// Make a PUT request
    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, HarnessError> {
        self.request(Method::PUT, path, Some(body), false).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<Value, HarnessError> {
        self.request(Method::DELETE, path, None, false).await
    }
}

#[async_trait]
impl RestTransport for HttpClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        csrf: bool,
    ) -> Result<Value, HarnessError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(header::AUTHORIZATION, self.auth.header_value())
            .header(header::CONTENT_TYPE, "application/json");

        if csrf {
            request = request.header(CSRF_HEADER, CSRF_VALUE);
        }

        if let Some(body) = body {
            debug!("Payload: {}", body);
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !self.policy.accepts(status) {
            error!("HTTP {} failed: {} {} - {}", method, status, path, text);
            return Err(HarnessError::TransportError {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&text)?)
    }
}
