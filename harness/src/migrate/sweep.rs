//! Per-index sweeps driven by the migration assistance endpoint

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::deploy::waiter::{wait_ready, WaitOptions};
use crate::errors::{HarnessError, IntegrityCheck, MigrationStep};
use crate::http::client::RestTransport;

/// Action the assistance endpoint requires for an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    Upgrade,
    Reindex,
    /// Nothing to do, or an action the harness does not act on
    Noop,
}

impl TaskAction {
    fn parse(action: &str) -> Self {
        match action {
            "upgrade" => TaskAction::Upgrade,
            "reindex" => TaskAction::Reindex,
            _ => TaskAction::Noop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

/// One index flagged by the assistance endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTask {
    pub index_name: String,
    pub action: TaskAction,
    pub status: TaskStatus,
}

/// Assistance endpoint for a cluster on `major`
pub fn assistance_path(major: u32) -> &'static str {
    if major < 7 {
        "/_xpack/migration/assistance"
    } else {
        "/_migration/assistance"
    }
}

fn upgrade_path(major: u32, index: &str) -> String {
    if major < 7 {
        format!("/_xpack/migration/upgrade/{}", index)
    } else {
        format!("/_migration/upgrade/{}", index)
    }
}

fn reindex_path(index: &str) -> String {
    format!("/api/upgrade_assistant/reindex/{}", index)
}

/// Tasks listed under `indices` of an assistance response
pub fn parse_assistance(response: &Value) -> Result<Vec<MigrationTask>, HarnessError> {
    let indices = response
        .get("indices")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            HarnessError::UnexpectedResponse("Migration assistance has no indices".to_string())
        })?;

    Ok(indices
        .iter()
        .map(|(index, entry)| MigrationTask {
            index_name: index.clone(),
            action: TaskAction::parse(
                entry
                    .get("action_required")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            ),
            status: TaskStatus::Pending,
        })
        .collect())
}

/// Fetch the tasks of a cluster on `major`
pub async fn discover(
    es: &dyn RestTransport,
    major: u32,
) -> Result<Vec<MigrationTask>, HarnessError> {
    let response = es
        .request(Method::GET, assistance_path(major), None, false)
        .await?;
    debug!("Migration assistance: {}", response);
    parse_assistance(&response)
}

/// Length of the `failures` array of a response
pub fn failure_count(response: &Value) -> Result<usize, HarnessError> {
    response
        .get("failures")
        .and_then(Value::as_array)
        .map(Vec::len)
        .ok_or_else(|| HarnessError::UnexpectedResponse(format!("No failures in {}", response)))
}

/// Run the assistance upgrade API for every task flagged `upgrade`
///
/// Stops at the first index whose upgrade reports failures.
pub async fn upgrade_sweep(
    es: &dyn RestTransport,
    major: u32,
    tasks: &mut [MigrationTask],
) -> Result<(), HarnessError> {
    let body = json!({ "wait_for_completion": true });

    for task in tasks.iter_mut().filter(|t| t.action == TaskAction::Upgrade) {
        info!("Upgrading index {}", task.index_name);
        task.status = TaskStatus::InProgress;

        let result = es
            .request(Method::POST, &upgrade_path(major, &task.index_name), Some(&body), false)
            .await
            .and_then(|response| failure_count(&response));

        match result {
            Ok(0) => task.status = TaskStatus::Done,
            Ok(n) => {
                task.status = TaskStatus::Failed;
                return Err(HarnessError::DataIntegrityError {
                    step: MigrationStep::AssistanceUpgrade,
                    check: IntegrityCheck::Failures(n),
                });
            }
            Err(e) => {
                task.status = TaskStatus::Failed;
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Reindex status of an upgrade assistant response
///
/// 0 is in progress, 1 is done, anything else is a failure.
fn reindex_done(response: &Value) -> Result<bool, HarnessError> {
    let status = response
        .get("reindexOp")
        .and_then(|op| op.get("status"))
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            HarnessError::UnexpectedResponse(format!("No reindex status in {}", response))
        })?;

    match status {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(HarnessError::DataIntegrityError {
            step: MigrationStep::AssistantReindex,
            check: IntegrityCheck::ReindexStatus(other),
        }),
    }
}

async fn poll_reindex(kibana: &dyn RestTransport, path: &str) -> Result<bool, HarnessError> {
    let response = kibana.request(Method::GET, path, None, false).await?;
    reindex_done(&response)
}

/// Reindex one index through the kibana upgrade assistant and wait for it
///
/// Returns the name of the new index.
pub async fn assistant_reindex(
    kibana: &dyn RestTransport,
    index: &str,
    options: &WaitOptions,
) -> Result<String, HarnessError> {
    let path = reindex_path(index);
    let response = kibana.request(Method::POST, &path, None, true).await?;
    let new_index = response
        .get("newIndexName")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            HarnessError::UnexpectedResponse(format!("No newIndexName in {}", response))
        })?;
    info!("Reindexing {} into {}", index, new_index);

    let what = format!("reindex of {}", index);
    let path = path.as_str();
    wait_ready(&what, options, move || poll_reindex(kibana, path)).await?;
    Ok(new_index)
}

/// Reindex every task flagged `reindex` through the kibana upgrade assistant
pub async fn reindex_sweep(
    kibana: &dyn RestTransport,
    tasks: &mut [MigrationTask],
    options: &WaitOptions,
) -> Result<Vec<String>, HarnessError> {
    let mut new_indices = Vec::new();

    for task in tasks.iter_mut().filter(|t| t.action == TaskAction::Reindex) {
        task.status = TaskStatus::InProgress;
        match assistant_reindex(kibana, &task.index_name, options).await {
            Ok(new_index) => {
                task.status = TaskStatus::Done;
                new_indices.push(new_index);
            }
            Err(e) => {
                task.status = TaskStatus::Failed;
                return Err(e);
            }
        }
    }
    Ok(new_indices)
}
