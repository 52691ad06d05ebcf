//! Finite state machine for the deployment lifecycle

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::errors::HarnessError;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Initial state, nothing provisioned
    Pending,

    /// Creation submitted, waiting for readiness
    Creating,

    /// Provisioned and ready
    Ready,

    /// Plan update in progress
    Upgrading,

    /// Upgraded to the target version
    Upgraded,

    /// Data migration in progress
    Migrating,

    /// Data migrated
    Migrated,

    /// Shutdown requested
    TearingDown,

    /// Shut down
    Terminated,

    /// A phase failed
    Failed,
}

/// Lifecycle event
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Create,
    Created,
    Upgrade,
    Upgraded,
    Migrate,
    Migrated,
    Teardown,
    TornDown,
    Failed(String),
}

/// Phase-order state machine of one deployment
#[derive(Debug, Clone)]
pub struct DeploymentLifecycle {
    state: LifecycleState,
    error: Option<String>,
}

impl DeploymentLifecycle {
    /// Create a new lifecycle in pending state
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Pending,
            error: None,
        }
    }

    /// Lifecycle of a deployment that already exists
    pub fn adopt() -> Self {
        Self {
            state: LifecycleState::Ready,
            error: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Error message of the last failed phase
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: LifecycleEvent) -> Result<(), HarnessError> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        let new_state = match (self.state, &event) {
            (S::Pending, E::Create) => S::Creating,
            (S::Creating, E::Created) => S::Ready,

            (S::Ready | S::Upgraded | S::Migrated, E::Upgrade) => S::Upgrading,
            (S::Upgrading, E::Upgraded) => S::Upgraded,

            (S::Ready | S::Upgraded, E::Migrate) => S::Migrating,
            (S::Migrating, E::Migrated) => S::Migrated,

            // A failed creation may still have left a deployment behind
            (
                S::Ready | S::Upgraded | S::Migrated | S::Failed,
                E::Teardown,
            ) => S::TearingDown,
            (S::TearingDown, E::TornDown) => S::Terminated,

            (S::Creating | S::Upgrading | S::Migrating | S::TearingDown, E::Failed(err)) => {
                self.error = Some(err.clone());
                S::Failed
            }

            (state, event) => {
                return Err(HarnessError::LifecycleError(format!(
                    "Invalid transition: {:?} -> {:?}",
                    state, event
                )));
            }
        };

        debug!("Lifecycle {:?} -> {:?}", self.state, new_state);
        self.state = new_state;
        Ok(())
    }

    /// Run one phase between its start and completion events
    ///
    /// The start event is validated before `phase` runs; a phase error moves
    /// the lifecycle to `Failed` and is returned unchanged.
    pub async fn run_phase<T, F, Fut>(
        &mut self,
        start: LifecycleEvent,
        done: LifecycleEvent,
        phase: F,
    ) -> Result<T, HarnessError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, HarnessError>>,
    {
        self.process(start)?;
        match phase().await {
            Ok(value) => {
                self.process(done)?;
                Ok(value)
            }
            Err(e) => {
                error!("Phase failed: {}", e);
                self.process(LifecycleEvent::Failed(e.to_string()))?;
                Err(e)
            }
        }
    }
}

impl Default for DeploymentLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-deployment lifecycles, each behind its own async lock
///
/// Phases of one deployment never interleave; different deployments proceed
/// independently.
#[derive(Debug, Default)]
pub struct LifecycleRegistry {
    entries: std::sync::Mutex<HashMap<String, Arc<Mutex<DeploymentLifecycle>>>>,
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifecycle of `key`, starting from `Pending` when not yet known
    pub fn entry(&self, key: &str) -> Result<Arc<Mutex<DeploymentLifecycle>>, HarnessError> {
        self.entry_with(key, DeploymentLifecycle::new)
    }

    /// Lifecycle of an existing deployment, starting from `Ready` when not yet known
    pub fn adopt(&self, key: &str) -> Result<Arc<Mutex<DeploymentLifecycle>>, HarnessError> {
        self.entry_with(key, DeploymentLifecycle::adopt)
    }

    /// Re-register a lifecycle under another key
    ///
    /// Used once creation returns the provider-assigned deployment id.
    pub fn alias(&self, from: &str, to: &str) -> Result<(), HarnessError> {
        let mut entries = self.lock()?;
        if let Some(lifecycle) = entries.get(from).cloned() {
            entries.insert(to.to_string(), lifecycle);
        }
        Ok(())
    }

    /// Current state of `key`, if registered
    pub async fn state(&self, key: &str) -> Result<Option<LifecycleState>, HarnessError> {
        let lifecycle = self.lock()?.get(key).cloned();
        match lifecycle {
            Some(lifecycle) => Ok(Some(lifecycle.lock().await.state())),
            None => Ok(None),
        }
    }

    fn entry_with(
        &self,
        key: &str,
        init: fn() -> DeploymentLifecycle,
    ) -> Result<Arc<Mutex<DeploymentLifecycle>>, HarnessError> {
        let mut entries = self.lock()?;
        Ok(entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .clone())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<DeploymentLifecycle>>>>, HarnessError>
    {
        self.entries
            .lock()
            .map_err(|_| HarnessError::LifecycleError("Lifecycle registry poisoned".to_string()))
    }
}
