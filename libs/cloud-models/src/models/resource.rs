//! Resource info models

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status reported for a resource once it is running
pub const STATUS_STARTED: &str = "started";

/// Resource info returned by `GET /deployments/{id}/{kind}/{ref_id}`
///
/// The plan type defaults to raw JSON; use [`ResourceInfo::current_plan`] to
/// decode it into one of the typed plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo<P = Value> {
    pub ref_id: String,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub region: String,

    /// Set for resources that attach to an elasticsearch cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch_cluster_ref_id: Option<String>,

    pub info: ClusterInfo<P>,
}

/// Status and plan details of a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo<P = Value> {
    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,

    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub plan_info: Option<PlansInfo<P>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Current and pending plans of a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlansInfo<P = Value> {
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub current: Option<PlanAttempt<P>>,

    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub pending: Option<PlanAttempt<P>>,
}

/// One plan attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAttempt<P = Value> {
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub plan: Option<P>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_attempt_id: Option<String>,
}

impl<P> ResourceInfo<P> {
    /// Whether the provider reports the resource as started
    pub fn is_started(&self) -> bool {
        self.info.status == STATUS_STARTED
    }
}

impl ResourceInfo<Value> {
    /// Decode the current plan, if the provider returned one
    pub fn current_plan<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        match self
            .info
            .plan_info
            .as_ref()
            .and_then(|p| p.current.as_ref())
            .and_then(|c| c.plan.as_ref())
        {
            Some(plan) => serde_json::from_value(plan.clone()).map(Some),
            None => Ok(None),
        }
    }
}

/// Credentials generated for a new elasticsearch cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterCredentials {
    pub username: String,
    pub password: String,
}
