//! Cloud provider deployments API

pub mod region;

use std::fmt;

use async_trait::async_trait;
use cloud_models::{
    DeploymentCreateRequest, DeploymentCreateResponse, DeploymentGetResponse,
    DeploymentResourceUpgradeResponse, DeploymentShutdownResponse, DeploymentUpdateRequest,
    DeploymentUpdateResponse, ResourceInfo,
};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::errors::HarnessError;
use crate::http::client::{Auth, HttpClient, StatusPolicy};
use crate::utils::request_id;

/// Provider API host used when `ESTF_CLOUD_HOST` is not set
pub const DEFAULT_CLOUD_HOST: &str = "public-api.staging.foundit.no";

/// Kind of a deployment resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Elasticsearch,
    Kibana,
    Apm,
    EnterpriseSearch,
}

impl ResourceKind {
    /// Ref id the harness gives each resource kind
    pub fn ref_id(&self) -> &'static str {
        match self {
            ResourceKind::Elasticsearch => "main-elasticsearch",
            ResourceKind::Kibana => "main-kibana",
            ResourceKind::Apm => "main-apm",
            ResourceKind::EnterpriseSearch => "main-enterprise_search",
        }
    }

    /// Kind as spelled in API paths and in the `kind` field of responses
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Elasticsearch => "elasticsearch",
            ResourceKind::Kibana => "kibana",
            ResourceKind::Apm => "apm",
            ResourceKind::EnterpriseSearch => "enterprise_search",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "elasticsearch" => Some(ResourceKind::Elasticsearch),
            "kibana" => Some(ResourceKind::Kibana),
            "apm" => Some(ResourceKind::Apm),
            "enterprise_search" => Some(ResourceKind::EnterpriseSearch),
            _ => None,
        }
    }

    /// Whether the kind is upgraded through the stateless `_upgrade` call
    pub fn is_stateless(&self) -> bool {
        !matches!(self, ResourceKind::Elasticsearch)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment operations of the provider API
#[async_trait]
pub trait DeploymentsApi: Send + Sync {
    async fn create_deployment(
        &self,
        request: &DeploymentCreateRequest,
    ) -> Result<DeploymentCreateResponse, HarnessError>;

    async fn get_deployment(&self, deployment_id: &str)
        -> Result<DeploymentGetResponse, HarnessError>;

    /// Resource info including the current plan
    async fn resource_info(
        &self,
        deployment_id: &str,
        kind: ResourceKind,
    ) -> Result<ResourceInfo, HarnessError>;

    async fn update_deployment(
        &self,
        deployment_id: &str,
        request: &DeploymentUpdateRequest,
    ) -> Result<DeploymentUpdateResponse, HarnessError>;

    async fn upgrade_stateless_resource(
        &self,
        deployment_id: &str,
        kind: ResourceKind,
    ) -> Result<DeploymentResourceUpgradeResponse, HarnessError>;

    async fn shutdown_deployment(
        &self,
        deployment_id: &str,
    ) -> Result<DeploymentShutdownResponse, HarnessError>;
}

/// One readiness check: a resource of a deployment and its started predicate
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProbe<'a> {
    pub deployment_id: &'a str,
    pub kind: ResourceKind,
}

impl<'a> ReadinessProbe<'a> {
    pub fn new(deployment_id: &'a str, kind: ResourceKind) -> Self {
        Self {
            deployment_id,
            kind,
        }
    }

    /// Query the provider once
    pub async fn is_ready(&self, api: &dyn DeploymentsApi) -> Result<bool, HarnessError> {
        let info = api.resource_info(self.deployment_id, self.kind).await?;
        debug!(
            "{} {} status: {}",
            self.kind, self.deployment_id, info.info.status
        );
        Ok(info.is_started())
    }

    pub fn describe(&self) -> String {
        format!("{} of deployment {}", self.kind, self.deployment_id)
    }
}

/// Normalize `ESTF_CLOUD_HOST`: a full URL is reduced to its host
pub fn cloud_host(configured: Option<&str>) -> Result<String, HarnessError> {
    let host = configured.unwrap_or(DEFAULT_CLOUD_HOST);
    if host.contains("http") {
        let url = Url::parse(host)
            .map_err(|e| HarnessError::ConfigError(format!("Invalid cloud host {}: {}", host, e)))?;
        return url
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| HarnessError::ConfigError(format!("No host in {}", host)));
    }
    Ok(host.to_string())
}

/// Provider API client
pub struct CloudApi {
    http: HttpClient,
}

impl CloudApi {
    /// Create a new client for `https://<host>/api/v1`
    pub fn new(host: &str, api_key: SecretString) -> Result<Self, HarnessError> {
        let base_url = format!("https://{}/api/v1", host);
        info!("Cloud API URL: {}", base_url);
        let http = HttpClient::new(&base_url, Auth::ApiKey(api_key), StatusPolicy::AnySuccess)?;
        Ok(Self { http })
    }

    fn resource_path(deployment_id: &str, kind: ResourceKind) -> String {
        format!(
            "/deployments/{}/{}/{}",
            deployment_id,
            kind.as_str(),
            kind.ref_id()
        )
    }

    fn decode<T: DeserializeOwned>(value: Value) -> Result<T, HarnessError> {
        // Empty bodies come back as null
        let value = match value {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl DeploymentsApi for CloudApi {
    async fn create_deployment(
        &self,
        request: &DeploymentCreateRequest,
    ) -> Result<DeploymentCreateResponse, HarnessError> {
        let path = format!(
            "/deployments?request_id={}&validate_only=false",
            request_id()
        );
        let body = serde_json::to_value(request)?;
        Self::decode(self.http.post(&path, Some(&body)).await?)
    }

    async fn get_deployment(
        &self,
        deployment_id: &str,
    ) -> Result<DeploymentGetResponse, HarnessError> {
        let path = format!("/deployments/{}", deployment_id);
        Self::decode(self.http.get(&path).await?)
    }

    async fn resource_info(
        &self,
        deployment_id: &str,
        kind: ResourceKind,
    ) -> Result<ResourceInfo, HarnessError> {
        let path = format!(
            "{}?show_plans=true&show_settings=true",
            Self::resource_path(deployment_id, kind)
        );
        Self::decode(self.http.get(&path).await?)
    }

    async fn update_deployment(
        &self,
        deployment_id: &str,
        request: &DeploymentUpdateRequest,
    ) -> Result<DeploymentUpdateResponse, HarnessError> {
        let path = format!("/deployments/{}?validate_only=false", deployment_id);
        let body = serde_json::to_value(request)?;
        Self::decode(self.http.put(&path, &body).await?)
    }

    async fn upgrade_stateless_resource(
        &self,
        deployment_id: &str,
        kind: ResourceKind,
    ) -> Result<DeploymentResourceUpgradeResponse, HarnessError> {
        if !kind.is_stateless() {
            return Err(HarnessError::PreconditionError(format!(
                "{} is not a stateless resource",
                kind
            )));
        }
        let path = format!(
            "{}/_upgrade?validate_only=false",
            Self::resource_path(deployment_id, kind)
        );
        Self::decode(self.http.post(&path, None).await?)
    }

    async fn shutdown_deployment(
        &self,
        deployment_id: &str,
    ) -> Result<DeploymentShutdownResponse, HarnessError> {
        let path = format!(
            "/deployments/{}/_shutdown?hide=true&skip_snapshot=true",
            deployment_id
        );
        Self::decode(self.http.post(&path, None).await?)
    }
}
