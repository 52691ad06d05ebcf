//! Provisioning unit tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ess_harness::cloud::region::Region;
use ess_harness::cloud::ResourceKind;
use ess_harness::deploy::provision::{
    build_create_request, DeploymentTarget, Provisioner, TopologyFlags,
};
use ess_harness::deploy::waiter::WaitOptions;
use ess_harness::errors::HarnessError;

use crate::fakes::{FakeCloud, FakeResource, MemorySink, DEPLOYMENT_ID};

fn target() -> DeploymentTarget {
    DeploymentTarget::new("7.10.0", Region::new("us-east-1"))
}

fn wait() -> WaitOptions {
    WaitOptions {
        timeout: Duration::from_secs(60),
        interval: Duration::from_secs(10),
        retry_transport_errors: false,
    }
}

fn provisioner(api: &Arc<FakeCloud>, sink: &Arc<MemorySink>) -> Provisioner {
    Provisioner::new(api.clone(), sink.clone(), wait())
}

#[test]
fn test_topology_element_counts() {
    let mut target = target();
    let count = |target: &DeploymentTarget| {
        build_create_request(target, "n").resources.elasticsearch[0]
            .plan
            .cluster_topology
            .len()
    };
    assert_eq!(count(&target), 1);

    target.flags.ml = true;
    assert_eq!(count(&target), 2);

    target.flags.ingest = true;
    assert_eq!(count(&target), 3);

    target.flags = TopologyFlags {
        ingest: true,
        ..Default::default()
    };
    assert_eq!(count(&target), 2);
}

#[tokio::test]
async fn test_missing_version_fails_before_any_call() {
    let api = Arc::new(FakeCloud::new().all_started());
    let sink = Arc::new(MemorySink::new());

    let mut target = target();
    target.stack_version = String::new();
    let err = provisioner(&api, &sink)
        .provision(&target, "ess-test")
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::PreconditionError(_)));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_create_failure_keeps_status() {
    let api = Arc::new(FakeCloud::new().all_started().failing_create(400));
    let sink = Arc::new(MemorySink::new());

    let err = provisioner(&api, &sink)
        .provision(&target(), "ess-test")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::ProvisioningFailed {
            status: Some(400),
            ..
        }
    ));
    assert_eq!(api.calls(), ["create"]);
}

#[tokio::test]
async fn test_provision_records_properties() {
    let api = Arc::new(FakeCloud::new().all_started());
    let sink = Arc::new(MemorySink::new());

    let handle = provisioner(&api, &sink)
        .provision(&target(), "ess-test")
        .await
        .unwrap();

    assert_eq!(handle.deployment_id(), DEPLOYMENT_ID);
    assert_eq!(handle.elasticsearch_cluster_id(), "elasticsearch-id");
    assert!(handle
        .elasticsearch_url()
        .starts_with("https://elasticsearch-id."));
    assert_eq!(
        api.calls(),
        ["create", "info elasticsearch", "info kibana"]
    );
    assert_eq!(api.created()[0].name, "ess-test");

    let props = sink.written(DEPLOYMENT_ID).unwrap();
    assert_eq!(props["es_username"], "elastic");
    assert_eq!(props["es_password"], "changeme");
    assert_eq!(props["kibana_cluster_id"], "kibana-id");
    assert_eq!(props.len(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_readiness_timeout_keeps_deployment_id() {
    let api = Arc::new(
        FakeCloud::new()
            .with_resource(ResourceKind::Elasticsearch, FakeResource::started(None))
            .with_resource(ResourceKind::Kibana, FakeResource::stuck("initializing")),
    );
    let sink = Arc::new(MemorySink::new());

    let err = provisioner(&api, &sink)
        .provision(&target(), "ess-test")
        .await
        .unwrap_err();

    match err {
        HarnessError::ProvisioningIncomplete {
            deployment_id,
            source,
        } => {
            assert_eq!(deployment_id, DEPLOYMENT_ID);
            assert!(matches!(*source, HarnessError::DeadlineExceeded { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(sink.written(DEPLOYMENT_ID).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_apm_is_awaited_when_requested() {
    let api = Arc::new(FakeCloud::new().all_started().with_resource(
        ResourceKind::Apm,
        FakeResource::Present {
            statuses: VecDeque::from(vec!["initializing".to_string(), "started".to_string()]),
            plan: None,
        },
    ));
    let sink = Arc::new(MemorySink::new());

    let mut target = target();
    target.flags.apm = true;
    let handle = provisioner(&api, &sink)
        .provision(&target, "ess-test")
        .await
        .unwrap();

    assert_eq!(handle.apm_id(), Some("apm-id"));
    let apm_polls = api.calls().iter().filter(|c| *c == "info apm").count();
    assert_eq!(apm_polls, 2);
}

#[tokio::test]
async fn test_enterprise_search_is_recorded_when_requested() {
    let api = Arc::new(
        FakeCloud::new()
            .all_started()
            .with_resource(ResourceKind::EnterpriseSearch, FakeResource::started(None)),
    );
    let sink = Arc::new(MemorySink::new());

    let mut target = target();
    target.flags.enterprise_search = true;
    let handle = provisioner(&api, &sink)
        .provision(&target, "ess-test")
        .await
        .unwrap();

    assert_eq!(handle.enterprise_search_id(), Some("enterprise_search-id"));
    assert!(handle.apm_id().is_none());
    assert!(api
        .calls()
        .contains(&"info enterprise_search".to_string()));
}
