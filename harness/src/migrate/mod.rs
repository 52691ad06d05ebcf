//! Data migration across major stack versions
//!
//! The flow detects the major jump between the two versions, then runs the
//! migration defined for it against the cluster REST APIs:
//!
//! ```text
//! Idle -> DetectMajorJump -> NoOp | Migrate5to6 | Migrate6to7 | UnsupportedJump -> Done | Failed
//! ```
//!
//! Every step checks the cluster's answer and the flow stops at the first
//! failed check. Nothing is rolled back.

pub mod sweep;
pub mod templates;
pub mod version;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::deploy::waiter::WaitOptions;
use crate::errors::{HarnessError, IntegrityCheck, MigrationStep};
use crate::http::client::RestTransport;

use self::sweep::MigrationTask;
use self::templates::MigrationTemplates;
use self::version::{major_version, MigrationPath};

const KIBANA_INDEX: &str = ".kibana";
const KIBANA_6_INDEX: &str = ".kibana-6";

/// Polling of an upgrade assistant reindex
pub fn reindex_wait_options() -> WaitOptions {
    WaitOptions {
        timeout: Duration::from_secs(60),
        interval: Duration::from_secs(5),
        retry_transport_errors: true,
    }
}

/// How the migration ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Nothing to migrate between the two versions
    NoOp,
    Migrated,
    /// The jump has no defined migration and nothing was done
    Unsupported { from: u32, to: u32 },
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub path: MigrationPath,
    pub outcome: MigrationOutcome,
    pub tasks: Vec<MigrationTask>,
    /// Indices created by the kibana upgrade assistant
    pub new_indices: Vec<String>,
}

/// Runs the data migration of one cluster
pub struct MigrationAssistant {
    es: Arc<dyn RestTransport>,
    kibana: Arc<dyn RestTransport>,
    templates: MigrationTemplates,
    reindex_wait: WaitOptions,
    strict: bool,
}

impl MigrationAssistant {
    pub fn new(
        es: Arc<dyn RestTransport>,
        kibana: Arc<dyn RestTransport>,
        templates: MigrationTemplates,
    ) -> Self {
        Self {
            es,
            kibana,
            templates,
            reindex_wait: reindex_wait_options(),
            strict: false,
        }
    }

    /// Fail instead of reporting unsupported jumps
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_reindex_wait(mut self, options: WaitOptions) -> Self {
        self.reindex_wait = options;
        self
    }

    /// Migrate data of a cluster upgraded from `version` to `upgrade_version`
    pub async fn run(
        &self,
        version: &str,
        upgrade_version: &str,
    ) -> Result<MigrationReport, HarnessError> {
        let path = MigrationPath::detect(version, upgrade_version)?;
        info!("{} -> {}: {}", version, upgrade_version, path);

        let result = match path {
            MigrationPath::NoOp => Ok(self.report(path, MigrationOutcome::NoOp)),
            MigrationPath::Migrate5to6 => self.migrate_5_to_6(major_version(version)?).await,
            MigrationPath::Migrate6to7 => self.migrate_6_to_7(major_version(version)?).await,
            MigrationPath::UnsupportedJump { from, to } => self.unsupported(path, from, to),
        };

        match &result {
            Ok(report) => info!("Migration done: {:?}", report.outcome),
            Err(e) => error!("Migration failed: {}", e),
        }
        result
    }

    fn report(&self, path: MigrationPath, outcome: MigrationOutcome) -> MigrationReport {
        MigrationReport {
            path,
            outcome,
            tasks: Vec::new(),
            new_indices: Vec::new(),
        }
    }

    fn unsupported(
        &self,
        path: MigrationPath,
        from: u32,
        to: u32,
    ) -> Result<MigrationReport, HarnessError> {
        if self.strict {
            return Err(HarnessError::UnsupportedTransition(format!(
                "Major upgrade from {}.x to {}.x is not supported",
                from, to
            )));
        }
        warn!("Major upgrade from {}.x to {}.x not yet supported", from, to);
        Ok(self.report(path, MigrationOutcome::Unsupported { from, to }))
    }

    async fn migrate_5_to_6(&self, major: u32) -> Result<MigrationReport, HarnessError> {
        let es = self.es.as_ref();

        let response = es
            .request(
                Method::PUT,
                &format!("/{}/_settings", KIBANA_INDEX),
                Some(&json!({ "index.blocks.write": true })),
                false,
            )
            .await?;
        require_acknowledged(&response, MigrationStep::SetReadOnly)?;

        let response = es
            .request(
                Method::PUT,
                &format!("/{}", KIBANA_6_INDEX),
                Some(&self.templates.mappings),
                false,
            )
            .await?;
        require_acknowledged(&response, MigrationStep::CreateIndex)?;
        if !flag(&response, "shards_acknowledged") {
            return Err(HarnessError::DataIntegrityError {
                step: MigrationStep::CreateIndex,
                check: IntegrityCheck::ShardsNotAcknowledged,
            });
        }

        let response = es
            .request(
                Method::POST,
                "/_reindex?wait_for_completion=true",
                Some(&self.templates.reindex),
                false,
            )
            .await?;
        match sweep::failure_count(&response)? {
            0 => {}
            n => {
                return Err(HarnessError::DataIntegrityError {
                    step: MigrationStep::Reindex,
                    check: IntegrityCheck::Failures(n),
                })
            }
        }

        let response = es
            .request(Method::POST, "/_aliases", Some(&self.templates.alias), false)
            .await?;
        require_acknowledged(&response, MigrationStep::SwapAlias)?;

        let mut tasks = sweep::discover(es, major).await?;
        sweep::upgrade_sweep(es, major, &mut tasks).await?;

        Ok(MigrationReport {
            path: MigrationPath::Migrate5to6,
            outcome: MigrationOutcome::Migrated,
            tasks,
            new_indices: Vec::new(),
        })
    }

    async fn migrate_6_to_7(&self, major: u32) -> Result<MigrationReport, HarnessError> {
        let mut tasks = sweep::discover(self.es.as_ref(), major).await?;
        let new_indices =
            sweep::reindex_sweep(self.kibana.as_ref(), &mut tasks, &self.reindex_wait).await?;

        Ok(MigrationReport {
            path: MigrationPath::Migrate6to7,
            outcome: MigrationOutcome::Migrated,
            tasks,
            new_indices,
        })
    }
}

/// A missing flag counts as false
fn flag(response: &Value, key: &str) -> bool {
    response.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn require_acknowledged(response: &Value, step: MigrationStep) -> Result<(), HarnessError> {
    if flag(response, "acknowledged") {
        Ok(())
    } else {
        Err(HarnessError::DataIntegrityError {
            step,
            check: IntegrityCheck::NotAcknowledged,
        })
    }
}
