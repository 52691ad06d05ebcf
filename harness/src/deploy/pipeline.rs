//! Full lifecycle of one test environment

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info, warn};

use crate::cloud::DeploymentsApi;
use crate::deploy::handle::{Credentials, DeploymentHandle};
use crate::deploy::lifecycle::{
    DeploymentLifecycle, LifecycleEvent, LifecycleRegistry, LifecycleState,
};
use crate::deploy::provision::{DeploymentTarget, Provisioner};
use crate::deploy::shutdown::shutdown;
use crate::deploy::upgrade::{UpgradeOutcome, Upgrader};
use crate::deploy::waiter::WaitOptions;
use crate::errors::HarnessError;
use crate::http::client::{Auth, HttpClient, RestTransport, StatusPolicy};
use crate::migrate::templates::MigrationTemplates;
use crate::migrate::{MigrationAssistant, MigrationReport};
use crate::storage::properties::PropertiesSink;

/// Elasticsearch and kibana transports of one cluster
pub struct ClusterTransports {
    pub elasticsearch: Arc<dyn RestTransport>,
    pub kibana: Arc<dyn RestTransport>,
}

/// Opens the REST transports of a provisioned cluster
pub trait ClusterConnector: Send + Sync {
    fn connect(
        &self,
        elasticsearch_url: &str,
        kibana_url: &str,
        credentials: &Credentials,
    ) -> Result<ClusterTransports, HarnessError>;
}

/// Cluster transports over HTTPS with basic auth
#[derive(Debug, Default)]
pub struct HttpClusterConnector;

impl ClusterConnector for HttpClusterConnector {
    fn connect(
        &self,
        elasticsearch_url: &str,
        kibana_url: &str,
        credentials: &Credentials,
    ) -> Result<ClusterTransports, HarnessError> {
        let auth = || Auth::Basic {
            username: credentials.username.clone(),
            password: SecretString::from(credentials.password.expose_secret().to_string()),
        };
        Ok(ClusterTransports {
            elasticsearch: Arc::new(HttpClient::new(
                elasticsearch_url,
                auth(),
                StatusPolicy::OkOnly,
            )?),
            kibana: Arc::new(HttpClient::new(kibana_url, auth(), StatusPolicy::OkOnly)?),
        })
    }
}

/// What the pipeline should do after creation
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub target: DeploymentTarget,
    /// Upgrade and migrate to this version when set
    pub upgrade_version: Option<String>,
    pub strict_migration: bool,
    /// Shut the deployment down when a later phase fails
    pub teardown_on_failure: bool,
}

/// Result of a successful pipeline run
#[derive(Debug)]
pub struct PipelineReport {
    pub deployment_id: String,
    pub upgrade: Option<UpgradeOutcome>,
    pub migration: Option<MigrationReport>,
    pub final_state: LifecycleState,
}

/// Runs create, upgrade, migrate and teardown for named environments
pub struct Pipeline {
    api: Arc<dyn DeploymentsApi>,
    sink: Arc<dyn PropertiesSink>,
    connector: Arc<dyn ClusterConnector>,
    registry: Arc<LifecycleRegistry>,
    templates: MigrationTemplates,
    wait: WaitOptions,
}

impl Pipeline {
    pub fn new(
        api: Arc<dyn DeploymentsApi>,
        sink: Arc<dyn PropertiesSink>,
        connector: Arc<dyn ClusterConnector>,
        registry: Arc<LifecycleRegistry>,
        templates: MigrationTemplates,
        wait: WaitOptions,
    ) -> Self {
        Self {
            api,
            sink,
            connector,
            registry,
            templates,
            wait,
        }
    }

    /// Run every phase for `environment`
    ///
    /// Phases of the same environment are serialized by the registry.
    pub async fn run(
        &self,
        environment: &str,
        name: &str,
        config: &PipelineConfig,
    ) -> Result<PipelineReport, HarnessError> {
        let entry = self.registry.entry(environment)?;
        let mut lifecycle = entry.lock().await;

        let provisioner = Provisioner::new(self.api.clone(), self.sink.clone(), self.wait.clone());
        let created = lifecycle
            .run_phase(LifecycleEvent::Create, LifecycleEvent::Created, || {
                provisioner.provision(&config.target, name)
            })
            .await;

        let handle = match created {
            Ok(handle) => handle,
            Err(e) => {
                if let HarnessError::ProvisioningIncomplete { deployment_id, .. } = &e {
                    if config.teardown_on_failure {
                        self.teardown_after_failure(&mut lifecycle, deployment_id).await;
                    }
                }
                return Err(e);
            }
        };
        let deployment_id = handle.deployment_id().to_string();
        self.registry.alias(environment, &deployment_id)?;

        let phases = self.run_upgrade_phases(&mut lifecycle, &handle, config).await;
        let (upgrade, migration) = match phases {
            Ok(done) => done,
            Err(e) => {
                if config.teardown_on_failure {
                    self.teardown_after_failure(&mut lifecycle, &deployment_id).await;
                }
                return Err(e);
            }
        };

        lifecycle
            .run_phase(LifecycleEvent::Teardown, LifecycleEvent::TornDown, || {
                shutdown(self.api.as_ref(), Some(&self.sink), &deployment_id)
            })
            .await?;

        info!("Pipeline of {} finished", environment);
        Ok(PipelineReport {
            deployment_id,
            upgrade,
            migration,
            final_state: lifecycle.state(),
        })
    }

    async fn run_upgrade_phases(
        &self,
        lifecycle: &mut DeploymentLifecycle,
        handle: &DeploymentHandle,
        config: &PipelineConfig,
    ) -> Result<(Option<UpgradeOutcome>, Option<MigrationReport>), HarnessError> {
        let Some(upgrade_version) = config.upgrade_version.as_deref() else {
            return Ok((None, None));
        };

        let upgrader = Upgrader::new(self.api.clone(), self.wait.clone());
        let upgrade = lifecycle
            .run_phase(LifecycleEvent::Upgrade, LifecycleEvent::Upgraded, || {
                upgrader.upgrade(handle.deployment_id(), upgrade_version)
            })
            .await?;

        let transports = self.connector.connect(
            handle.elasticsearch_url(),
            handle.kibana_url(),
            handle.credentials(),
        )?;
        let assistant = MigrationAssistant::new(
            transports.elasticsearch,
            transports.kibana,
            self.templates.clone(),
        )
        .strict(config.strict_migration);
        let migration = lifecycle
            .run_phase(LifecycleEvent::Migrate, LifecycleEvent::Migrated, || {
                assistant.run(&config.target.stack_version, upgrade_version)
            })
            .await?;

        Ok((Some(upgrade), Some(migration)))
    }

    async fn teardown_after_failure(
        &self,
        lifecycle: &mut DeploymentLifecycle,
        deployment_id: &str,
    ) {
        warn!("Tearing down deployment {} after failure", deployment_id);
        let result = lifecycle
            .run_phase(LifecycleEvent::Teardown, LifecycleEvent::TornDown, || {
                shutdown(self.api.as_ref(), Some(&self.sink), deployment_id)
            })
            .await;
        if let Err(e) = result {
            error!("Teardown of {} failed: {}", deployment_id, e);
        }
    }
}
