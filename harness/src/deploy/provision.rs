//! Deployment creation

use std::sync::Arc;

use cloud_models::{
    ApmPlan, DeploymentCreateRequest, DeploymentResources, DeploymentTemplateReference,
    ElasticsearchClusterPlan, ElasticsearchClusterTopologyElement, ElasticsearchConfiguration,
    ElasticsearchNodeType, EnterpriseSearchNodeTypes, EnterpriseSearchPlan, KibanaClusterPlan,
    ResourcePayload, StatelessConfiguration, StatelessTopologyElement, TopologySize,
};
use tracing::{error, info, warn};

use crate::cloud::region::Region;
use crate::cloud::{DeploymentsApi, ReadinessProbe, ResourceKind};
use crate::deploy::handle::{DeploymentHandle, HandleBuilder};
use crate::deploy::waiter::{wait_for_resource, WaitOptions};
use crate::errors::HarnessError;
use crate::storage::properties::PropertiesSink;

/// Deployment template every deployment is created from
pub const DEPLOYMENT_TEMPLATE: &str = "aws-io-optimized";

const ES_NODE_SIZE_MB: u32 = 1024;
const KIBANA_SIZE_MB: u32 = 1024;
const KIBANA_REPORTS_SIZE_MB: u32 = 2048;
const APM_SIZE_MB: u32 = 512;
const ENTERPRISE_SEARCH_SIZE_MB: u32 = 2048;
const ENTERPRISE_SEARCH_ZONES: u32 = 2;

/// Optional parts of the deployment topology
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopologyFlags {
    pub ml: bool,
    pub ingest: bool,
    pub apm: bool,
    pub enterprise_search: bool,
    /// Larger kibana instance for reporting tests
    pub kibana_reports: bool,
}

/// What to provision
#[derive(Debug, Clone)]
pub struct DeploymentTarget {
    pub stack_version: String,
    pub region: Region,
    pub flags: TopologyFlags,
    pub es_user_settings: Option<String>,
    pub kibana_user_settings: Option<String>,
    pub kibana_zone_count: u32,
}

impl DeploymentTarget {
    pub fn new(stack_version: impl Into<String>, region: Region) -> Self {
        Self {
            stack_version: stack_version.into(),
            region,
            flags: TopologyFlags::default(),
            es_user_settings: None,
            kibana_user_settings: None,
            kibana_zone_count: 1,
        }
    }
}

/// Parse `ESTF_CLOUD_KIBANA_ZONE`, defaulting to one zone
pub fn parse_kibana_zone_count(raw: Option<&str>) -> u32 {
    match raw.map(str::trim) {
        None | Some("") => 1,
        Some(raw) => match raw.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => {
                warn!("Invalid kibana zone count {}, using 1", raw);
                1
            }
        },
    }
}

fn es_element(
    instance_configuration_id: &str,
    node_type: ElasticsearchNodeType,
) -> ElasticsearchClusterTopologyElement {
    ElasticsearchClusterTopologyElement {
        instance_configuration_id: Some(instance_configuration_id.to_string()),
        node_type: Some(node_type),
        zone_count: Some(1),
        size: Some(TopologySize::memory(ES_NODE_SIZE_MB)),
        ..Default::default()
    }
}

fn stateless_element(
    instance_configuration_id: &str,
    zone_count: u32,
    size_mb: u32,
) -> StatelessTopologyElement {
    StatelessTopologyElement {
        instance_configuration_id: Some(instance_configuration_id.to_string()),
        zone_count: Some(zone_count),
        size: Some(TopologySize::memory(size_mb)),
        ..Default::default()
    }
}

fn stateless_configuration(version: &str, user_settings: Option<&str>) -> StatelessConfiguration {
    StatelessConfiguration {
        version: Some(version.to_string()),
        user_settings_yaml: user_settings.map(str::to_string),
        ..Default::default()
    }
}

fn payload<P>(region: &Region, kind: ResourceKind, plan: P) -> ResourcePayload<P> {
    ResourcePayload {
        region: region.name().to_string(),
        ref_id: kind.ref_id().to_string(),
        elasticsearch_cluster_ref_id: kind
            .is_stateless()
            .then(|| ResourceKind::Elasticsearch.ref_id().to_string()),
        plan,
    }
}

/// Build the creation payload for `target`
pub fn build_create_request(target: &DeploymentTarget, name: &str) -> DeploymentCreateRequest {
    let region = &target.region;
    let version = target.stack_version.as_str();
    let flags = target.flags;
    let instances = region.provider().instance_configurations();

    let mut topology = vec![es_element(
        instances.elasticsearch,
        ElasticsearchNodeType {
            data: true,
            master: true,
            ..Default::default()
        },
    )];
    if flags.ml {
        topology.push(es_element(
            instances.ml,
            ElasticsearchNodeType {
                ml: true,
                ..Default::default()
            },
        ));
    }
    if flags.ingest {
        topology.push(es_element(
            instances.ingest,
            ElasticsearchNodeType {
                ingest: true,
                ..Default::default()
            },
        ));
    }

    let es_plan = ElasticsearchClusterPlan {
        cluster_topology: topology,
        elasticsearch: Some(ElasticsearchConfiguration {
            version: Some(version.to_string()),
            user_settings_yaml: target.es_user_settings.clone(),
            ..Default::default()
        }),
        deployment_template: Some(DeploymentTemplateReference {
            id: DEPLOYMENT_TEMPLATE.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };

    let kibana_size = if flags.kibana_reports {
        KIBANA_REPORTS_SIZE_MB
    } else {
        KIBANA_SIZE_MB
    };
    let kibana_plan = KibanaClusterPlan {
        kibana: stateless_configuration(version, target.kibana_user_settings.as_deref()),
        cluster_topology: vec![stateless_element(
            instances.kibana,
            target.kibana_zone_count,
            kibana_size,
        )],
        ..Default::default()
    };

    let mut resources = DeploymentResources {
        elasticsearch: vec![payload(region, ResourceKind::Elasticsearch, es_plan)],
        kibana: vec![payload(region, ResourceKind::Kibana, kibana_plan)],
        ..Default::default()
    };

    if flags.apm {
        let plan = ApmPlan {
            apm: stateless_configuration(version, None),
            cluster_topology: vec![stateless_element(instances.apm, 1, APM_SIZE_MB)],
            ..Default::default()
        };
        resources.apm.push(payload(region, ResourceKind::Apm, plan));
    }

    if flags.enterprise_search {
        let mut element = stateless_element(
            instances.enterprise_search,
            ENTERPRISE_SEARCH_ZONES,
            ENTERPRISE_SEARCH_SIZE_MB,
        );
        element.node_type = Some(EnterpriseSearchNodeTypes {
            appserver: true,
            worker: true,
            connector: true,
            ..Default::default()
        });
        let plan = EnterpriseSearchPlan {
            enterprise_search: stateless_configuration(version, None),
            cluster_topology: vec![element],
            ..Default::default()
        };
        resources
            .enterprise_search
            .push(payload(region, ResourceKind::EnterpriseSearch, plan));
    }

    DeploymentCreateRequest {
        name: name.to_string(),
        resources,
    }
}

/// Creates deployments and waits for them to come up
pub struct Provisioner {
    api: Arc<dyn DeploymentsApi>,
    sink: Arc<dyn PropertiesSink>,
    wait: WaitOptions,
}

impl Provisioner {
    pub fn new(api: Arc<dyn DeploymentsApi>, sink: Arc<dyn PropertiesSink>, wait: WaitOptions) -> Self {
        Self { api, sink, wait }
    }

    /// Create a deployment named `name` for `target`
    ///
    /// Once creation succeeds, every later error is `ProvisioningIncomplete`
    /// carrying the deployment id.
    pub async fn provision(
        &self,
        target: &DeploymentTarget,
        name: &str,
    ) -> Result<DeploymentHandle, HarnessError> {
        if target.stack_version.trim().is_empty() {
            return Err(HarnessError::PreconditionError(
                "Stack version is required to create a deployment".to_string(),
            ));
        }

        info!(
            "Creating deployment {} with stack version {} in {}",
            name, target.stack_version, target.region
        );
        let request = build_create_request(target, name);
        let response = self.api.create_deployment(&request).await.map_err(|e| {
            error!("Deployment creation failed: {}", e);
            HarnessError::ProvisioningFailed {
                status: e.status(),
                message: e.to_string(),
            }
        })?;

        let deployment_id = response.id.clone();
        info!("Created deployment {}", deployment_id);

        let mut builder = HandleBuilder::new(&deployment_id);
        for resource in &response.resources {
            builder.record(resource);
        }
        let handle = builder
            .build(&target.region)
            .map_err(|e| incomplete(&deployment_id, e))?;

        let mut kinds = vec![ResourceKind::Elasticsearch, ResourceKind::Kibana];
        if target.flags.apm {
            kinds.push(ResourceKind::Apm);
        }
        if target.flags.enterprise_search {
            kinds.push(ResourceKind::EnterpriseSearch);
        }
        for kind in kinds {
            let probe = ReadinessProbe::new(&deployment_id, kind);
            wait_for_resource(self.api.as_ref(), probe, &self.wait)
                .await
                .map_err(|e| incomplete(&deployment_id, e))?;
        }

        info!("Elasticsearch URL: {}", handle.elasticsearch_url());
        info!("Kibana URL: {}", handle.kibana_url());
        if let Some(id) = handle.apm_id() {
            info!("APM resource: {}", id);
        }
        if let Some(id) = handle.enterprise_search_id() {
            info!("Enterprise Search resource: {}", id);
        }

        if let Err(e) = self
            .sink
            .write_properties(&deployment_id, &handle.properties())
            .await
        {
            error!("Unable to persist properties of {}: {}", deployment_id, e);
        }

        Ok(handle)
    }
}

fn incomplete(deployment_id: &str, source: HarnessError) -> HarnessError {
    HarnessError::ProvisioningIncomplete {
        deployment_id: deployment_id.to_string(),
        source: Box::new(source),
    }
}
