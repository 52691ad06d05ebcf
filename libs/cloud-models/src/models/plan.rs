//! Resource plan models

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Size of a topology element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySize {
    pub value: u32,
    pub resource: SizeResource,
}

impl TopologySize {
    /// Memory size in megabytes
    pub fn memory(value: u32) -> Self {
        Self {
            value,
            resource: SizeResource::Memory,
        }
    }
}

/// Unit a topology size is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeResource {
    Memory,
    Storage,
}

/// Roles of an elasticsearch node
///
/// Roles the provider leaves out read as false.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticsearchNodeType {
    pub data: bool,
    pub master: bool,
    pub ingest: bool,
    pub ml: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-script-type toggle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticsearchScriptTypeSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_mode: Option<bool>,
}

impl ElasticsearchScriptTypeSettings {
    pub fn enabled() -> Self {
        Self {
            enabled: Some(true),
            sandbox_mode: None,
        }
    }
}

/// Scripting settings of an elasticsearch cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticsearchScriptingUserSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expressions_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<ElasticsearchScriptTypeSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<ElasticsearchScriptTypeSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored: Option<ElasticsearchScriptTypeSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mustache_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub painless_enabled: Option<bool>,
}

/// System settings of an elasticsearch cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchSystemSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripting: Option<ElasticsearchScriptingUserSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watcher_trigger_engine: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_create_index: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destructive_requires_name: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Elasticsearch configuration shared by the plan and its topology elements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_settings_yaml: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_settings_override_yaml: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_settings: Option<ElasticsearchSystemSettings>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One sized, zoned unit of an elasticsearch plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchClusterTopologyElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_configuration_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<ElasticsearchNodeType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<TopologySize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch: Option<ElasticsearchConfiguration>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference to a deployment template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentTemplateReference {
    pub id: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Elasticsearch cluster plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchClusterPlan {
    #[serde(default)]
    pub cluster_topology: Vec<ElasticsearchClusterTopologyElement>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch: Option<ElasticsearchConfiguration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_template: Option<DeploymentTemplateReference>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Version and user settings of a stateless resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatelessConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_settings_yaml: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_settings_override_yaml: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Roles of an enterprise search node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnterpriseSearchNodeTypes {
    pub appserver: bool,
    pub worker: bool,
    pub connector: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Topology element of a kibana, apm or enterprise search plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatelessTopologyElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_configuration_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<TopologySize>,

    /// Only set for enterprise search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<EnterpriseSearchNodeTypes>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Kibana cluster plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KibanaClusterPlan {
    #[serde(default)]
    pub kibana: StatelessConfiguration,

    #[serde(default)]
    pub cluster_topology: Vec<StatelessTopologyElement>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// APM plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApmPlan {
    #[serde(default)]
    pub apm: StatelessConfiguration,

    #[serde(default)]
    pub cluster_topology: Vec<StatelessTopologyElement>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Enterprise search plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnterpriseSearchPlan {
    #[serde(default)]
    pub enterprise_search: StatelessConfiguration,

    #[serde(default)]
    pub cluster_topology: Vec<StatelessTopologyElement>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
