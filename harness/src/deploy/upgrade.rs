//! Stack version upgrade of an existing deployment

use std::sync::Arc;

use cloud_models::{
    ApmPlan, DeploymentResources, DeploymentUpdateRequest, ElasticsearchClusterPlan,
    ElasticsearchScriptTypeSettings, ElasticsearchScriptingUserSettings,
    ElasticsearchSystemSettings, EnterpriseSearchPlan, KibanaClusterPlan, ResourceInfo,
    ResourcePayload, TopologySize,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::cloud::{DeploymentsApi, ReadinessProbe, ResourceKind};
use crate::deploy::waiter::{wait_for_resource, WaitOptions};
use crate::errors::HarnessError;

const ES_NODE_SIZE_MB: u32 = 1024;

/// What an upgrade touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeOutcome {
    pub deployment_id: String,
    pub version: String,
    /// Stateless resources upgraded after the plan update, in order
    pub stateless_upgraded: Vec<ResourceKind>,
}

/// Reset scripting to inline and stored scripts only and clear the watcher
/// trigger engine
///
/// Applying it twice gives the same settings.
pub fn normalize_system_settings(settings: &mut ElasticsearchSystemSettings) {
    settings.scripting = Some(ElasticsearchScriptingUserSettings {
        inline: Some(ElasticsearchScriptTypeSettings::enabled()),
        stored: Some(ElasticsearchScriptTypeSettings::enabled()),
        ..Default::default()
    });
    settings.watcher_trigger_engine = None;
}

/// Point every topology element of `plan` at `version`
pub fn upgrade_elasticsearch_plan(plan: &mut ElasticsearchClusterPlan, version: &str) {
    let mut config = plan.elasticsearch.take().unwrap_or_default();
    config.version = Some(version.to_string());

    for element in plan.cluster_topology.iter_mut() {
        let mut system_settings = element
            .elasticsearch
            .as_ref()
            .and_then(|es| es.system_settings.clone())
            .unwrap_or_default();
        normalize_system_settings(&mut system_settings);

        config.system_settings = Some(system_settings);
        element.elasticsearch = Some(config.clone());
        element.size = Some(TopologySize::memory(ES_NODE_SIZE_MB));
    }

    plan.elasticsearch = Some(config);
}

/// A resource together with its current plan
struct Fetched<P> {
    info: ResourceInfo,
    plan: P,
}

impl<P> Fetched<P> {
    fn into_payload(self) -> ResourcePayload<P> {
        ResourcePayload {
            region: self.info.region,
            ref_id: self.info.ref_id,
            elasticsearch_cluster_ref_id: self.info.elasticsearch_cluster_ref_id,
            plan: self.plan,
        }
    }
}

/// Moves deployments to a new stack version
pub struct Upgrader {
    api: Arc<dyn DeploymentsApi>,
    wait: WaitOptions,
}

impl Upgrader {
    pub fn new(api: Arc<dyn DeploymentsApi>, wait: WaitOptions) -> Self {
        Self { api, wait }
    }

    async fn fetch<P: DeserializeOwned>(
        &self,
        deployment_id: &str,
        kind: ResourceKind,
    ) -> Result<Option<Fetched<P>>, HarnessError> {
        let info = self.api.resource_info(deployment_id, kind).await?;
        Ok(info.current_plan::<P>()?.map(|plan| Fetched { info, plan }))
    }

    async fn fetch_required<P: DeserializeOwned>(
        &self,
        deployment_id: &str,
        kind: ResourceKind,
    ) -> Result<Fetched<P>, HarnessError> {
        self.fetch(deployment_id, kind).await?.ok_or_else(|| {
            HarnessError::UnexpectedResponse(format!(
                "{} of deployment {} has no current plan",
                kind, deployment_id
            ))
        })
    }

    /// Absent resources come back as `None`; other failures propagate
    async fn fetch_optional<P: DeserializeOwned>(
        &self,
        deployment_id: &str,
        kind: ResourceKind,
    ) -> Result<Option<Fetched<P>>, HarnessError> {
        match self.fetch(deployment_id, kind).await {
            Ok(Some(fetched)) => Ok(Some(fetched)),
            Ok(None) => {
                debug!("{} of deployment {} has no current plan", kind, deployment_id);
                Ok(None)
            }
            Err(e) if e.is_not_found() => {
                debug!("Deployment {} has no {}", deployment_id, kind);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn wait_for(&self, deployment_id: &str, kind: ResourceKind) -> Result<(), HarnessError> {
        wait_for_resource(
            self.api.as_ref(),
            ReadinessProbe::new(deployment_id, kind),
            &self.wait,
        )
        .await
    }

    /// Upgrade every resource of `deployment_id` to `version`
    pub async fn upgrade(
        &self,
        deployment_id: &str,
        version: &str,
    ) -> Result<UpgradeOutcome, HarnessError> {
        if deployment_id.trim().is_empty() {
            return Err(HarnessError::PreconditionError(
                "Deployment id is required to upgrade".to_string(),
            ));
        }
        if version.trim().is_empty() {
            return Err(HarnessError::PreconditionError(
                "Upgrade stack version is required".to_string(),
            ));
        }

        let deployment = self.api.get_deployment(deployment_id).await?;

        let mut es: Fetched<ElasticsearchClusterPlan> = self
            .fetch_required(deployment_id, ResourceKind::Elasticsearch)
            .await?;
        let kibana: Fetched<KibanaClusterPlan> =
            self.fetch_required(deployment_id, ResourceKind::Kibana).await?;
        let apm: Option<Fetched<ApmPlan>> =
            self.fetch_optional(deployment_id, ResourceKind::Apm).await?;
        let ens: Option<Fetched<EnterpriseSearchPlan>> = self
            .fetch_optional(deployment_id, ResourceKind::EnterpriseSearch)
            .await?;

        upgrade_elasticsearch_plan(&mut es.plan, version);

        let mut stateless = vec![ResourceKind::Kibana];
        if apm.is_some() {
            stateless.push(ResourceKind::Apm);
        }
        if ens.is_some() {
            stateless.push(ResourceKind::EnterpriseSearch);
        }

        let request = DeploymentUpdateRequest {
            name: deployment.name,
            prune_orphans: true,
            resources: DeploymentResources {
                elasticsearch: vec![es.into_payload()],
                kibana: vec![kibana.into_payload()],
                apm: apm.map(Fetched::into_payload).into_iter().collect(),
                enterprise_search: ens.map(Fetched::into_payload).into_iter().collect(),
            },
        };

        info!("Upgrading deployment {} to {}", deployment_id, version);
        self.api.update_deployment(deployment_id, &request).await?;

        self.wait_for(deployment_id, ResourceKind::Elasticsearch).await?;
        self.wait_for(deployment_id, ResourceKind::Kibana).await?;

        for kind in &stateless {
            info!("Upgrading {} of deployment {}", kind, deployment_id);
            self.api.upgrade_stateless_resource(deployment_id, *kind).await?;
            self.wait_for(deployment_id, *kind).await?;
        }

        info!("Deployment {} upgraded to {}", deployment_id, version);
        Ok(UpgradeOutcome {
            deployment_id: deployment_id.to_string(),
            version: version.to_string(),
            stateless_upgraded: stateless,
        })
    }
}
