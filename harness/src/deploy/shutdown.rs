//! Deployment teardown

use std::sync::Arc;

use tracing::{info, warn};

use crate::cloud::DeploymentsApi;
use crate::errors::HarnessError;
use crate::storage::properties::PropertiesSink;

/// Shut down `deployment_id` and remove its properties
///
/// Failing to remove the properties is only logged.
pub async fn shutdown(
    api: &dyn DeploymentsApi,
    sink: Option<&Arc<dyn PropertiesSink>>,
    deployment_id: &str,
) -> Result<(), HarnessError> {
    if deployment_id.trim().is_empty() {
        return Err(HarnessError::PreconditionError(
            "Deployment id is required to shut down".to_string(),
        ));
    }

    let response = api.shutdown_deployment(deployment_id).await?;
    info!("Shut down deployment {} {}", response.id, response.name);

    if let Some(sink) = sink {
        if let Err(e) = sink.remove_properties(deployment_id).await {
            warn!("Unable to remove properties of {}: {}", deployment_id, e);
        }
    }
    Ok(())
}
