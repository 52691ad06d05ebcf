//! Phase dispatch

use std::collections::BTreeMap;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info, warn};

use crate::app::options::{Command, HarnessOptions};
use crate::authn::vault::{SecretStore, VaultClient};
use crate::cloud::{CloudApi, DeploymentsApi};
use crate::deploy::handle::Credentials;
use crate::deploy::lifecycle::{DeploymentLifecycle, LifecycleEvent, LifecycleRegistry};
use crate::deploy::pipeline::{ClusterConnector, HttpClusterConnector, Pipeline, PipelineConfig};
use crate::deploy::provision::Provisioner;
use crate::deploy::shutdown::shutdown;
use crate::deploy::upgrade::Upgrader;
use crate::errors::HarnessError;
use crate::migrate::templates::MigrationTemplates;
use crate::migrate::MigrationAssistant;
use crate::storage::properties::{PropertiesSink, WorkspaceProperties};
use crate::utils::deployment_name;

/// Run the phase selected in `options`
pub async fn run(mut options: HarnessOptions) -> Result<(), HarnessError> {
    info!("Running {:?}", options.command);
    match options.command {
        Command::Create => run_create(&mut options).await,
        Command::Upgrade => run_upgrade(&mut options).await,
        Command::Migrate => run_migrate(&options).await,
        Command::Shutdown => run_shutdown(&mut options).await,
        Command::Pipeline => run_pipeline(&mut options).await,
    }
}

async fn cloud_api(options: &mut HarnessOptions) -> Result<Arc<dyn DeploymentsApi>, HarnessError> {
    let vault = VaultClient::new(std::mem::take(&mut options.vault))?;
    let api_key = vault.api_key().await?;
    Ok(Arc::new(CloudApi::new(&options.cloud_host, api_key)?))
}

async fn properties(options: &HarnessOptions) -> Result<Arc<WorkspaceProperties>, HarnessError> {
    Ok(Arc::new(
        WorkspaceProperties::open(options.workspace.clone()).await?,
    ))
}

async fn run_create(options: &mut HarnessOptions) -> Result<(), HarnessError> {
    let target = options.target();
    options.require_stack_version()?;

    let api = cloud_api(options).await?;
    let sink: Arc<dyn PropertiesSink> = properties(options).await?;
    let provisioner = Provisioner::new(api.clone(), sink.clone(), options.wait.clone());

    let name = deployment_name();
    let mut lifecycle = DeploymentLifecycle::new();
    let result = lifecycle
        .run_phase(LifecycleEvent::Create, LifecycleEvent::Created, || {
            provisioner.provision(&target, &name)
        })
        .await;

    match result {
        Ok(handle) => {
            info!("Deployment {} is ready", handle.deployment_id());
            Ok(())
        }
        Err(e) => {
            if let HarnessError::ProvisioningIncomplete { deployment_id, .. } = &e {
                if options.teardown_on_failure {
                    warn!("Shutting down incomplete deployment {}", deployment_id);
                    if let Err(err) = shutdown(api.as_ref(), Some(&sink), deployment_id).await {
                        error!("Unable to shut down {}: {}", deployment_id, err);
                    }
                } else {
                    warn!("Deployment {} was left running", deployment_id);
                }
            }
            Err(e)
        }
    }
}

async fn run_upgrade(options: &mut HarnessOptions) -> Result<(), HarnessError> {
    let deployment_id = options.require_deployment_id()?.to_string();
    let version = options.require_upgrade_version()?.to_string();

    let api = cloud_api(options).await?;
    let upgrader = Upgrader::new(api, options.wait.clone());

    let mut lifecycle = DeploymentLifecycle::adopt();
    let outcome = lifecycle
        .run_phase(LifecycleEvent::Upgrade, LifecycleEvent::Upgraded, || {
            upgrader.upgrade(&deployment_id, &version)
        })
        .await?;
    info!(
        "Upgraded {} to {}, stateless resources: {:?}",
        outcome.deployment_id, outcome.version, outcome.stateless_upgraded
    );
    Ok(())
}

/// Cluster endpoints from explicit options, else from the properties file
async fn cluster_endpoints(
    options: &HarnessOptions,
) -> Result<(String, String, Credentials), HarnessError> {
    let cluster = &options.cluster;
    let mut stored = BTreeMap::new();
    let explicit = cluster.elasticsearch_url.is_some()
        && cluster.kibana_url.is_some()
        && cluster.username.is_some()
        && cluster.password.is_some();
    if !explicit {
        let deployment_id = options.require_deployment_id()?;
        stored = properties(options).await?.load(deployment_id).await?;
    }

    let pick = |explicit: &Option<String>, key: &str| -> Result<String, HarnessError> {
        explicit
            .clone()
            .or_else(|| stored.get(key).cloned())
            .ok_or_else(|| HarnessError::PreconditionError(format!("{} is required", key)))
    };

    let elasticsearch_url = pick(&cluster.elasticsearch_url, "elasticsearch_url")?;
    let kibana_url = pick(&cluster.kibana_url, "kibana_url")?;
    let username = pick(&cluster.username, "es_username")?;
    let password = match &cluster.password {
        Some(password) => SecretString::from(password.expose_secret().to_string()),
        None => SecretString::from(pick(&None, "es_password")?),
    };

    Ok((
        elasticsearch_url,
        kibana_url,
        Credentials { username, password },
    ))
}

async fn run_migrate(options: &HarnessOptions) -> Result<(), HarnessError> {
    let version = options.require_stack_version()?;
    let upgrade_version = options.require_upgrade_version()?;

    let (elasticsearch_url, kibana_url, credentials) = cluster_endpoints(options).await?;
    let transports = HttpClusterConnector.connect(&elasticsearch_url, &kibana_url, &credentials)?;
    let templates = MigrationTemplates::load(options.templates_dir.as_deref()).await?;

    let assistant = MigrationAssistant::new(transports.elasticsearch, transports.kibana, templates)
        .strict(options.strict_migration);

    let mut lifecycle = DeploymentLifecycle::adopt();
    let report = lifecycle
        .run_phase(LifecycleEvent::Migrate, LifecycleEvent::Migrated, || {
            assistant.run(version, upgrade_version)
        })
        .await?;
    info!(
        "Migration {} finished with {:?}, {} tasks",
        report.path,
        report.outcome,
        report.tasks.len()
    );
    Ok(())
}

async fn run_shutdown(options: &mut HarnessOptions) -> Result<(), HarnessError> {
    let deployment_id = options.require_deployment_id()?.to_string();
    let api = cloud_api(options).await?;

    let sink: Option<Arc<dyn PropertiesSink>> = match properties(options).await {
        Ok(sink) => Some(sink as Arc<dyn PropertiesSink>),
        Err(e) => {
            warn!("Properties are not available: {}", e);
            None
        }
    };

    let mut lifecycle = DeploymentLifecycle::adopt();
    lifecycle
        .run_phase(LifecycleEvent::Teardown, LifecycleEvent::TornDown, || {
            shutdown(api.as_ref(), sink.as_ref(), &deployment_id)
        })
        .await
}

async fn run_pipeline(options: &mut HarnessOptions) -> Result<(), HarnessError> {
    options.require_stack_version()?;
    let config = PipelineConfig {
        target: options.target(),
        upgrade_version: options.upgrade_version.clone(),
        strict_migration: options.strict_migration,
        teardown_on_failure: options.teardown_on_failure,
    };

    let api = cloud_api(options).await?;
    let sink: Arc<dyn PropertiesSink> = properties(options).await?;
    let templates = MigrationTemplates::load(options.templates_dir.as_deref()).await?;
    let pipeline = Pipeline::new(
        api,
        sink,
        Arc::new(HttpClusterConnector),
        Arc::new(LifecycleRegistry::new()),
        templates,
        options.wait.clone(),
    );

    let name = deployment_name();
    let report = pipeline.run(&name, &name, &config).await?;
    info!(
        "Pipeline for deployment {} ended in {:?}",
        report.deployment_id, report.final_state
    );
    Ok(())
}
