//! Data migration unit tests

use std::sync::Arc;
use std::time::Duration;

use ess_harness::errors::{HarnessError, IntegrityCheck, MigrationStep};
use ess_harness::migrate::sweep::{self, TaskStatus};
use ess_harness::migrate::templates::MigrationTemplates;
use ess_harness::migrate::version::MigrationPath;
use ess_harness::migrate::{MigrationAssistant, MigrationOutcome};
use reqwest::Method;
use serde_json::json;

use crate::fakes::FakeTransport;

fn assistant(es: &Arc<FakeTransport>, kibana: &Arc<FakeTransport>) -> MigrationAssistant {
    MigrationAssistant::new(
        es.clone(),
        kibana.clone(),
        MigrationTemplates::bundled().unwrap(),
    )
}

/// The kibana index steps of a 5.x cluster, up to and including the reindex
fn kibana_index_steps() -> FakeTransport {
    FakeTransport::new()
        .on(Method::PUT, "/.kibana/_settings", json!({ "acknowledged": true }))
        .on(
            Method::PUT,
            "/.kibana-6",
            json!({ "acknowledged": true, "shards_acknowledged": true }),
        )
        .on(
            Method::POST,
            "/_reindex?wait_for_completion=true",
            json!({ "failures": [] }),
        )
}

fn assistance(indices: serde_json::Value) -> serde_json::Value {
    json!({ "indices": indices })
}

/// A 5.x cluster on which every step succeeds
fn cluster_5x() -> FakeTransport {
    kibana_index_steps()
        .on(Method::POST, "/_aliases", json!({ "acknowledged": true }))
        .on(
            Method::GET,
            "/_xpack/migration/assistance",
            assistance(json!({
                "a": { "action_required": "upgrade" },
                "b": { "action_required": "none" }
            })),
        )
        .on(
            Method::POST,
            "/_xpack/migration/upgrade/a",
            json!({ "failures": [] }),
        )
}

#[tokio::test]
async fn test_5_to_6_upgrades_flagged_indices_only() {
    let es = Arc::new(cluster_5x());
    let kibana = Arc::new(FakeTransport::new());

    let report = assistant(&es, &kibana).run("5.6.16", "6.8.0").await.unwrap();

    assert_eq!(report.outcome, MigrationOutcome::Migrated);
    assert_eq!(
        es.requests(),
        [
            "PUT /.kibana/_settings",
            "PUT /.kibana-6",
            "POST /_reindex?wait_for_completion=true",
            "POST /_aliases",
            "GET /_xpack/migration/assistance",
            "POST /_xpack/migration/upgrade/a",
        ]
    );
    let statuses: Vec<_> = report.tasks.iter().map(|t| t.status).collect();
    assert_eq!(statuses, [TaskStatus::Done, TaskStatus::Pending]);

    let calls = es.calls();
    assert_eq!(
        calls[0].body,
        Some(json!({ "index.blocks.write": true }))
    );
    assert_eq!(
        calls[5].body,
        Some(json!({ "wait_for_completion": true }))
    );
    assert!(kibana.calls().is_empty());
}

#[tokio::test]
async fn test_5x_cluster_migrates_to_6_whatever_the_target() {
    let es = Arc::new(cluster_5x());
    let kibana = Arc::new(FakeTransport::new());

    let report = assistant(&es, &kibana).run("5.6.16", "7.0.0").await.unwrap();

    assert_eq!(report.path, MigrationPath::Migrate5to6);
    assert_eq!(report.outcome, MigrationOutcome::Migrated);
    assert_eq!(es.calls().len(), 6);
}

#[tokio::test]
async fn test_reindex_failures_stop_migration() {
    let es = Arc::new(
        FakeTransport::new()
            .on(Method::PUT, "/.kibana/_settings", json!({ "acknowledged": true }))
            .on(
                Method::PUT,
                "/.kibana-6",
                json!({ "acknowledged": true, "shards_acknowledged": true }),
            )
            .on(
                Method::POST,
                "/_reindex?wait_for_completion=true",
                json!({ "failures": [{ "id": "1" }, { "id": "2" }] }),
            ),
    );
    let kibana = Arc::new(FakeTransport::new());

    let err = assistant(&es, &kibana)
        .run("5.6.16", "6.8.0")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::DataIntegrityError {
            step: MigrationStep::Reindex,
            check: IntegrityCheck::Failures(2)
        }
    ));
    assert_eq!(es.requests().last().unwrap(), "POST /_reindex?wait_for_completion=true");
}

#[tokio::test]
async fn test_unacknowledged_read_only_stops_migration() {
    let es = Arc::new(FakeTransport::new().on(
        Method::PUT,
        "/.kibana/_settings",
        json!({ "acknowledged": false }),
    ));
    let kibana = Arc::new(FakeTransport::new());

    let err = assistant(&es, &kibana)
        .run("5.6.16", "6.8.0")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::DataIntegrityError {
            step: MigrationStep::SetReadOnly,
            check: IntegrityCheck::NotAcknowledged
        }
    ));
    assert_eq!(es.requests(), ["PUT /.kibana/_settings"]);
}

#[tokio::test]
async fn test_unacknowledged_alias_swap_stops_migration() {
    let es = Arc::new(kibana_index_steps().on(
        Method::POST,
        "/_aliases",
        json!({ "acknowledged": false }),
    ));
    let kibana = Arc::new(FakeTransport::new());

    let err = assistant(&es, &kibana)
        .run("5.6.16", "6.8.0")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::DataIntegrityError {
            step: MigrationStep::SwapAlias,
            check: IntegrityCheck::NotAcknowledged
        }
    ));
    assert_eq!(es.requests().last().unwrap(), "POST /_aliases");
    assert_eq!(es.calls().len(), 4);
}

#[tokio::test]
async fn test_upgrade_sweep_failures_stop_at_first_index() {
    let es = Arc::new(
        kibana_index_steps()
            .on(Method::POST, "/_aliases", json!({ "acknowledged": true }))
            .on(
                Method::GET,
                "/_xpack/migration/assistance",
                assistance(json!({
                    "a": { "action_required": "upgrade" },
                    "b": { "action_required": "upgrade" }
                })),
            )
            .on(
                Method::POST,
                "/_xpack/migration/upgrade/a",
                json!({ "failures": [{ "index": "a", "cause": "mapping conflict" }] }),
            )
            .on(
                Method::POST,
                "/_xpack/migration/upgrade/b",
                json!({ "failures": [] }),
            ),
    );
    let kibana = Arc::new(FakeTransport::new());

    let err = assistant(&es, &kibana)
        .run("5.6.16", "6.8.0")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::DataIntegrityError {
            step: MigrationStep::AssistanceUpgrade,
            check: IntegrityCheck::Failures(1)
        }
    ));
    let requests = es.requests();
    assert_eq!(requests.last().unwrap(), "POST /_xpack/migration/upgrade/a");
    assert!(!requests.contains(&"POST /_xpack/migration/upgrade/b".to_string()));
}

#[tokio::test]
async fn test_upgrade_sweep_marks_failed_task() {
    let es = FakeTransport::new()
        .on(
            Method::GET,
            "/_xpack/migration/assistance",
            assistance(json!({
                "a": { "action_required": "upgrade" },
                "b": { "action_required": "upgrade" }
            })),
        )
        .on(
            Method::POST,
            "/_xpack/migration/upgrade/a",
            json!({ "failures": [{ "index": "a" }] }),
        );

    let mut tasks = sweep::discover(&es, 5).await.unwrap();
    let err = sweep::upgrade_sweep(&es, 5, &mut tasks).await.unwrap_err();

    assert!(matches!(err, HarnessError::DataIntegrityError { .. }));
    let statuses: Vec<_> = tasks.iter().map(|t| t.status).collect();
    assert_eq!(statuses, [TaskStatus::Failed, TaskStatus::Pending]);
    assert_eq!(es.calls().len(), 2);
}

#[tokio::test]
async fn test_unacknowledged_shards_stop_migration() {
    let es = Arc::new(
        FakeTransport::new()
            .on(Method::PUT, "/.kibana/_settings", json!({ "acknowledged": true }))
            .on(Method::PUT, "/.kibana-6", json!({ "acknowledged": true })),
    );
    let kibana = Arc::new(FakeTransport::new());

    let err = assistant(&es, &kibana)
        .run("5.6.16", "6.8.0")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::DataIntegrityError {
            step: MigrationStep::CreateIndex,
            check: IntegrityCheck::ShardsNotAcknowledged
        }
    ));
    assert_eq!(es.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_6_to_7_reindexes_through_kibana() {
    let es = Arc::new(FakeTransport::new().on(
        Method::GET,
        "/_xpack/migration/assistance",
        json!({ "indices": { "logs": { "action_required": "reindex" } } }),
    ));
    let kibana = Arc::new(
        FakeTransport::new()
            .on(
                Method::POST,
                "/api/upgrade_assistant/reindex/logs",
                json!({ "newIndexName": "reindexed-v7-logs" }),
            )
            .on(
                Method::GET,
                "/api/upgrade_assistant/reindex/logs",
                json!({ "reindexOp": { "status": 0 } }),
            )
            .on(
                Method::GET,
                "/api/upgrade_assistant/reindex/logs",
                json!({ "reindexOp": { "status": 1 } }),
            ),
    );

    let report = assistant(&es, &kibana).run("6.8.0", "7.10.0").await.unwrap();

    assert_eq!(report.outcome, MigrationOutcome::Migrated);
    assert_eq!(report.new_indices, ["reindexed-v7-logs"]);
    assert_eq!(report.tasks[0].status, TaskStatus::Done);

    let calls = kibana.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[0].csrf);
    assert_eq!(calls[0].method, Method::POST);
}

#[tokio::test(start_paused = true)]
async fn test_6_to_7_failed_reindex_status() {
    let es = Arc::new(FakeTransport::new().on(
        Method::GET,
        "/_xpack/migration/assistance",
        json!({ "indices": { "logs": { "action_required": "reindex" } } }),
    ));
    let kibana = Arc::new(
        FakeTransport::new()
            .on(
                Method::POST,
                "/api/upgrade_assistant/reindex/logs",
                json!({ "newIndexName": "reindexed-v7-logs" }),
            )
            .on(
                Method::GET,
                "/api/upgrade_assistant/reindex/logs",
                json!({ "reindexOp": { "status": 3 } }),
            ),
    );

    let err = assistant(&es, &kibana)
        .run("6.8.0", "7.10.0")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::DataIntegrityError {
            step: MigrationStep::AssistantReindex,
            check: IntegrityCheck::ReindexStatus(3)
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_6_to_7_reindex_that_never_finishes_times_out() {
    let es = Arc::new(FakeTransport::new().on(
        Method::GET,
        "/_xpack/migration/assistance",
        assistance(json!({ "logs": { "action_required": "reindex" } })),
    ));
    let kibana = Arc::new(
        FakeTransport::new()
            .on(
                Method::POST,
                "/api/upgrade_assistant/reindex/logs",
                json!({ "newIndexName": "reindexed-v7-logs" }),
            )
            .on(
                Method::GET,
                "/api/upgrade_assistant/reindex/logs",
                json!({ "reindexOp": { "status": 0 } }),
            ),
    );
    let started = tokio::time::Instant::now();

    let err = assistant(&es, &kibana)
        .run("6.8.0", "7.10.0")
        .await
        .unwrap_err();

    match err {
        HarnessError::DeadlineExceeded { timeout, .. } => {
            assert_eq!(timeout, Duration::from_secs(60));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(started.elapsed() >= Duration::from_secs(60));
    // POST, then polls at t=0, 5, .., 60
    assert_eq!(kibana.calls().len(), 14);
}

#[tokio::test(start_paused = true)]
async fn test_6x_cluster_runs_reindex_sweep_for_8_target() {
    let es = Arc::new(FakeTransport::new().on(
        Method::GET,
        "/_xpack/migration/assistance",
        assistance(json!({ "logs": { "action_required": "none" } })),
    ));
    let kibana = Arc::new(FakeTransport::new());

    let report = assistant(&es, &kibana).run("6.8.0", "8.0.0").await.unwrap();

    assert_eq!(report.path, MigrationPath::Migrate6to7);
    assert_eq!(report.outcome, MigrationOutcome::Migrated);
    assert_eq!(es.requests(), ["GET /_xpack/migration/assistance"]);
    assert!(kibana.calls().is_empty());
}

#[tokio::test]
async fn test_7_to_8_makes_no_calls() {
    let es = Arc::new(FakeTransport::new());
    let kibana = Arc::new(FakeTransport::new());

    let report = assistant(&es, &kibana).run("7.17.0", "8.0.0").await.unwrap();

    assert_eq!(report.outcome, MigrationOutcome::Unsupported { from: 7, to: 8 });
    assert!(es.calls().is_empty());
    assert!(kibana.calls().is_empty());
}

#[tokio::test]
async fn test_strict_mode_rejects_unsupported_jump() {
    let es = Arc::new(FakeTransport::new());
    let kibana = Arc::new(FakeTransport::new());

    let err = assistant(&es, &kibana)
        .strict(true)
        .run("7.17.0", "8.0.0")
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::UnsupportedTransition(_)));
    assert!(es.calls().is_empty());
}

#[tokio::test]
async fn test_minor_upgrade_is_noop() {
    let es = Arc::new(FakeTransport::new());
    let kibana = Arc::new(FakeTransport::new());

    let report = assistant(&es, &kibana).run("7.9.3", "7.10.0").await.unwrap();

    assert_eq!(report.outcome, MigrationOutcome::NoOp);
    assert!(es.calls().is_empty());
}
