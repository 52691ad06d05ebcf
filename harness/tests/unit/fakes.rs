//! In-memory stand-ins for the provider API, cluster transports and sinks

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cloud_models::{
    ClusterCredentials, DeploymentCreateRequest, DeploymentCreateResponse, DeploymentGetResponse,
    DeploymentResource, DeploymentResourceUpgradeResponse, DeploymentShutdownResponse,
    DeploymentUpdateRequest, DeploymentUpdateResponse, ResourceInfo,
};
use ess_harness::cloud::{DeploymentsApi, ResourceKind};
use ess_harness::deploy::handle::Credentials;
use ess_harness::deploy::pipeline::{ClusterConnector, ClusterTransports};
use ess_harness::errors::HarnessError;
use ess_harness::http::client::RestTransport;
use ess_harness::storage::properties::PropertiesSink;
use reqwest::Method;
use serde_json::{json, Map, Value};

pub const DEPLOYMENT_ID: &str = "d-1234";

pub fn transport_error(method: &str, path: &str, status: u16) -> HarnessError {
    HarnessError::TransportError {
        method: method.to_string(),
        path: path.to_string(),
        status,
        body: String::new(),
    }
}

/// How the fake answers resource info requests for one kind
pub enum FakeResource {
    /// Reported statuses in order, the last one repeats
    Present {
        statuses: VecDeque<String>,
        plan: Option<Value>,
    },
    /// Answers with an HTTP error status
    Failing(u16),
}

impl FakeResource {
    pub fn started(plan: Option<Value>) -> Self {
        FakeResource::Present {
            statuses: VecDeque::from(vec!["started".to_string()]),
            plan,
        }
    }

    pub fn stuck(status: &str) -> Self {
        FakeResource::Present {
            statuses: VecDeque::from(vec![status.to_string()]),
            plan: None,
        }
    }
}

#[derive(Default)]
struct CloudState {
    calls: Vec<String>,
    create_error: Option<u16>,
    resources: HashMap<ResourceKind, FakeResource>,
    created: Vec<DeploymentCreateRequest>,
    updates: Vec<DeploymentUpdateRequest>,
}

/// Provider API answering from scripted resource states
///
/// Kinds without a script answer 404.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(self, kind: ResourceKind, resource: FakeResource) -> Self {
        self.state.lock().unwrap().resources.insert(kind, resource);
        self
    }

    /// Every kind of a minimal deployment reports started
    pub fn all_started(self) -> Self {
        self.with_resource(ResourceKind::Elasticsearch, FakeResource::started(None))
            .with_resource(ResourceKind::Kibana, FakeResource::started(None))
    }

    pub fn failing_create(self, status: u16) -> Self {
        self.state.lock().unwrap().create_error = Some(status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn created(&self) -> Vec<DeploymentCreateRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn updates(&self) -> Vec<DeploymentUpdateRequest> {
        self.state.lock().unwrap().updates.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn created_resource(kind: ResourceKind, region: &str) -> DeploymentResource {
    let credentials = (kind == ResourceKind::Elasticsearch).then(|| ClusterCredentials {
        username: "elastic".to_string(),
        password: "changeme".to_string(),
    });
    DeploymentResource {
        kind: kind.as_str().to_string(),
        id: format!("{}-id", kind),
        ref_id: kind.ref_id().to_string(),
        region: region.to_string(),
        cloud_id: None,
        credentials,
    }
}

#[async_trait]
impl DeploymentsApi for FakeCloud {
    async fn create_deployment(
        &self,
        request: &DeploymentCreateRequest,
    ) -> Result<DeploymentCreateResponse, HarnessError> {
        self.record("create".to_string());
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.create_error {
            return Err(transport_error("POST", "/deployments", status));
        }
        state.created.push(request.clone());

        let resources = &request.resources;
        let region = resources
            .elasticsearch
            .first()
            .map(|es| es.region.clone())
            .unwrap_or_default();
        let mut created = Vec::new();
        if !resources.elasticsearch.is_empty() {
            created.push(created_resource(ResourceKind::Elasticsearch, &region));
        }
        if !resources.kibana.is_empty() {
            created.push(created_resource(ResourceKind::Kibana, &region));
        }
        if !resources.apm.is_empty() {
            created.push(created_resource(ResourceKind::Apm, &region));
        }
        if !resources.enterprise_search.is_empty() {
            created.push(created_resource(ResourceKind::EnterpriseSearch, &region));
        }

        Ok(DeploymentCreateResponse {
            id: DEPLOYMENT_ID.to_string(),
            name: request.name.clone(),
            created: true,
            resources: created,
        })
    }

    async fn get_deployment(
        &self,
        deployment_id: &str,
    ) -> Result<DeploymentGetResponse, HarnessError> {
        self.record("get".to_string());
        Ok(DeploymentGetResponse {
            id: deployment_id.to_string(),
            name: "ess-test".to_string(),
            healthy: true,
            extra: Map::new(),
        })
    }

    async fn resource_info(
        &self,
        deployment_id: &str,
        kind: ResourceKind,
    ) -> Result<ResourceInfo, HarnessError> {
        self.record(format!("info {}", kind));
        let path = format!("/deployments/{}/{}/{}", deployment_id, kind, kind.ref_id());

        let mut state = self.state.lock().unwrap();
        let (status, plan) = match state.resources.get_mut(&kind) {
            None => return Err(transport_error("GET", &path, 404)),
            Some(FakeResource::Failing(status)) => {
                return Err(transport_error("GET", &path, *status))
            }
            Some(FakeResource::Present { statuses, plan }) => {
                let status = if statuses.len() > 1 {
                    statuses.pop_front().unwrap_or_default()
                } else {
                    statuses.front().cloned().unwrap_or_default()
                };
                (status, plan.clone())
            }
        };

        let mut info = json!({ "status": status });
        if let Some(plan) = plan {
            info["plan_info"] = json!({ "current": { "plan": plan } });
        }
        let mut body = json!({
            "ref_id": kind.ref_id(),
            "id": format!("{}-id", kind),
            "region": "us-east-1",
            "info": info,
        });
        if kind.is_stateless() {
            body["elasticsearch_cluster_ref_id"] = json!("main-elasticsearch");
        }
        Ok(serde_json::from_value(body)?)
    }

    async fn update_deployment(
        &self,
        deployment_id: &str,
        request: &DeploymentUpdateRequest,
    ) -> Result<DeploymentUpdateResponse, HarnessError> {
        self.record("update".to_string());
        self.state.lock().unwrap().updates.push(request.clone());
        Ok(DeploymentUpdateResponse {
            id: deployment_id.to_string(),
            name: request.name.clone(),
            extra: Map::new(),
        })
    }

    async fn upgrade_stateless_resource(
        &self,
        _deployment_id: &str,
        kind: ResourceKind,
    ) -> Result<DeploymentResourceUpgradeResponse, HarnessError> {
        self.record(format!("upgrade {}", kind));
        Ok(DeploymentResourceUpgradeResponse {
            resource_id: format!("{}-id", kind),
            stateless_resource_kind: kind.as_str().to_string(),
        })
    }

    async fn shutdown_deployment(
        &self,
        deployment_id: &str,
    ) -> Result<DeploymentShutdownResponse, HarnessError> {
        self.record("shutdown".to_string());
        Ok(DeploymentShutdownResponse {
            id: deployment_id.to_string(),
            name: "ess-test".to_string(),
        })
    }
}

/// One request seen by a [`FakeTransport`]
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub csrf: bool,
}

/// Cluster REST transport answering from scripted responses
///
/// Responses are keyed by method and path; the last one for a key repeats.
/// Unscripted requests answer 500.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, u16>>>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: Method, path: &str, response: Value) -> Self {
        self.push(method, path, Ok(response));
        self
    }

    pub fn fail(self, method: Method, path: &str, status: u16) -> Self {
        self.push(method, path, Err(status));
        self
    }

    fn push(&self, method: Method, path: &str, response: Result<Value, u16>) {
        self.responses
            .lock()
            .unwrap()
            .entry(format!("{} {}", method, path))
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// `METHOD path` of every request, in order
    pub fn requests(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| format!("{} {}", c.method, c.path))
            .collect()
    }
}

#[async_trait]
impl RestTransport for FakeTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        csrf: bool,
    ) -> Result<Value, HarnessError> {
        self.calls.lock().unwrap().push(Call {
            method: method.clone(),
            path: path.to_string(),
            body: body.cloned(),
            csrf,
        });

        let key = format!("{} {}", method, path);
        let mut responses = self.responses.lock().unwrap();
        let response = match responses.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match response {
            Some(Ok(value)) => Ok(value),
            Some(Err(status)) => Err(transport_error(method.as_str(), path, status)),
            None => Err(transport_error(method.as_str(), path, 500)),
        }
    }
}

/// Connector handing out the same fake transports for every cluster
pub struct FakeConnector {
    pub elasticsearch: Arc<FakeTransport>,
    pub kibana: Arc<FakeTransport>,
}

impl ClusterConnector for FakeConnector {
    fn connect(
        &self,
        _elasticsearch_url: &str,
        _kibana_url: &str,
        _credentials: &Credentials,
    ) -> Result<ClusterTransports, HarnessError> {
        Ok(ClusterTransports {
            elasticsearch: self.elasticsearch.clone(),
            kibana: self.kibana.clone(),
        })
    }
}

/// Properties kept in memory
#[derive(Default)]
pub struct MemorySink {
    written: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    removed: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self, deployment_id: &str) -> Option<BTreeMap<String, String>> {
        self.written.lock().unwrap().get(deployment_id).cloned()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PropertiesSink for MemorySink {
    async fn write_properties(
        &self,
        deployment_id: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), HarnessError> {
        self.written
            .lock()
            .unwrap()
            .insert(deployment_id.to_string(), properties.clone());
        Ok(())
    }

    async fn remove_properties(&self, deployment_id: &str) -> Result<(), HarnessError> {
        self.written.lock().unwrap().remove(deployment_id);
        self.removed.lock().unwrap().push(deployment_id.to_string());
        Ok(())
    }
}
