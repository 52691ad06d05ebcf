//! Identifiers and credentials of a provisioned deployment

use std::collections::BTreeMap;

use cloud_models::DeploymentResource;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::cloud::region::Region;
use crate::cloud::ResourceKind;
use crate::errors::HarnessError;

/// Elasticsearch credentials generated at creation
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// A created deployment
///
/// Fields are read-only; the handle is assembled by [`HandleBuilder`] from
/// the creation response.
#[derive(Debug)]
pub struct DeploymentHandle {
    deployment_id: String,
    elasticsearch_cluster_id: String,
    kibana_cluster_id: String,
    apm_id: Option<String>,
    enterprise_search_id: Option<String>,
    credentials: Credentials,
    region: Region,
    elasticsearch_url: String,
    kibana_url: String,
}

impl DeploymentHandle {
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn elasticsearch_cluster_id(&self) -> &str {
        &self.elasticsearch_cluster_id
    }

    pub fn kibana_cluster_id(&self) -> &str {
        &self.kibana_cluster_id
    }

    pub fn apm_id(&self) -> Option<&str> {
        self.apm_id.as_deref()
    }

    pub fn enterprise_search_id(&self) -> Option<&str> {
        self.enterprise_search_id.as_deref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn elasticsearch_url(&self) -> &str {
        &self.elasticsearch_url
    }

    pub fn kibana_url(&self) -> &str {
        &self.kibana_url
    }

    /// Properties persisted for later pipeline steps
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert("deployment_id".to_string(), self.deployment_id.clone());
        props.insert(
            "elasticsearch_cluster_id".to_string(),
            self.elasticsearch_cluster_id.clone(),
        );
        props.insert("es_username".to_string(), self.credentials.username.clone());
        props.insert(
            "es_password".to_string(),
            self.credentials.password.expose_secret().to_string(),
        );
        props.insert("kibana_cluster_id".to_string(), self.kibana_cluster_id.clone());
        props.insert("elasticsearch_url".to_string(), self.elasticsearch_url.clone());
        props.insert("kibana_url".to_string(), self.kibana_url.clone());
        props
    }
}

/// Collects resource ids as they are listed in the creation response
///
/// Each id is recorded once; a repeated kind keeps the first value.
#[derive(Debug, Default)]
pub struct HandleBuilder {
    deployment_id: String,
    elasticsearch_cluster_id: Option<String>,
    kibana_cluster_id: Option<String>,
    apm_id: Option<String>,
    enterprise_search_id: Option<String>,
    credentials: Option<Credentials>,
    region: Option<String>,
}

impl HandleBuilder {
    pub fn new(deployment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            ..Default::default()
        }
    }

    /// Record one resource of the creation response
    pub fn record(&mut self, resource: &DeploymentResource) {
        let Some(kind) = ResourceKind::parse(&resource.kind) else {
            warn!("Ignoring resource of unknown kind {}", resource.kind);
            return;
        };

        let slot = match kind {
            ResourceKind::Elasticsearch => &mut self.elasticsearch_cluster_id,
            ResourceKind::Kibana => &mut self.kibana_cluster_id,
            ResourceKind::Apm => &mut self.apm_id,
            ResourceKind::EnterpriseSearch => &mut self.enterprise_search_id,
        };
        if slot.is_some() {
            warn!("Duplicate {} resource {} ignored", kind, resource.id);
            return;
        }
        *slot = Some(resource.id.clone());

        if kind == ResourceKind::Elasticsearch {
            self.region = Some(resource.region.clone());
            self.credentials = resource.credentials.as_ref().map(|c| Credentials {
                username: c.username.clone(),
                password: SecretString::from(c.password.clone()),
            });
        }
    }

    /// Finish the handle, computing the endpoint URLs
    ///
    /// `fallback_region` is used when the provider omits the region.
    pub fn build(self, fallback_region: &Region) -> Result<DeploymentHandle, HarnessError> {
        let missing = |what: &str| {
            HarnessError::UnexpectedResponse(format!(
                "Creation response for deployment {} has no {}",
                self.deployment_id, what
            ))
        };

        let elasticsearch_cluster_id = self
            .elasticsearch_cluster_id
            .clone()
            .ok_or_else(|| missing("elasticsearch resource"))?;
        let kibana_cluster_id = self
            .kibana_cluster_id
            .clone()
            .ok_or_else(|| missing("kibana resource"))?;

        let region = match self.region.as_deref() {
            Some(name) if !name.is_empty() => Region::new(name),
            _ => fallback_region.clone(),
        };

        let credentials = match self.credentials {
            Some(credentials) => credentials,
            None => {
                return Err(HarnessError::UnexpectedResponse(format!(
                    "Creation response for deployment {} has no elasticsearch credentials",
                    self.deployment_id
                )))
            }
        };

        Ok(DeploymentHandle {
            elasticsearch_url: region.endpoint_url(&elasticsearch_cluster_id),
            kibana_url: region.endpoint_url(&kibana_cluster_id),
            deployment_id: self.deployment_id,
            elasticsearch_cluster_id,
            kibana_cluster_id,
            apm_id: self.apm_id,
            enterprise_search_id: self.enterprise_search_id,
            credentials,
            region,
        })
    }
}
