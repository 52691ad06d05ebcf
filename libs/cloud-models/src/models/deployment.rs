//! Deployment request and response models

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::plan::{
    ApmPlan, ElasticsearchClusterPlan, EnterpriseSearchPlan, KibanaClusterPlan,
};
use crate::models::resource::ClusterCredentials;

/// A resource entry of a create or update request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePayload<P> {
    pub region: String,

    pub ref_id: String,

    /// Required for every kind except elasticsearch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch_cluster_ref_id: Option<String>,

    pub plan: P,
}

/// Resources of a deployment, grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResources {
    #[serde(default)]
    pub elasticsearch: Vec<ResourcePayload<ElasticsearchClusterPlan>>,

    #[serde(default)]
    pub kibana: Vec<ResourcePayload<KibanaClusterPlan>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apm: Vec<ResourcePayload<ApmPlan>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enterprise_search: Vec<ResourcePayload<EnterpriseSearchPlan>>,
}

/// Body of `POST /deployments`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentCreateRequest {
    pub name: String,
    pub resources: DeploymentResources,
}

/// One created resource as listed in the create response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResource {
    pub kind: String,
    pub id: String,
    pub ref_id: String,

    #[serde(default)]
    pub region: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_id: Option<String>,

    /// Only returned for elasticsearch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<ClusterCredentials>,
}

/// Response of `POST /deployments`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentCreateResponse {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub created: bool,

    #[serde(default)]
    pub resources: Vec<DeploymentResource>,
}

/// Response of `GET /deployments/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentGetResponse {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub healthy: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `PUT /deployments/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentUpdateRequest {
    pub name: String,
    pub prune_orphans: bool,
    pub resources: DeploymentResources,
}

/// Response of `PUT /deployments/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentUpdateResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `POST /deployments/{id}/_shutdown`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentShutdownResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,
}

/// Response of `POST /deployments/{id}/{kind}/{ref_id}/_upgrade`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentResourceUpgradeResponse {
    #[serde(default)]
    pub resource_id: String,

    #[serde(default)]
    pub stateless_resource_kind: String,
}
