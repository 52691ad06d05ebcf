//! Error types for the ESS harness

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Main error type for the ESS harness
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Connection-level failure, the request may not have reached the server
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The server answered with a status the caller does not accept
    #[error("FAILED! {method}: {status} {path}")]
    TransportError {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Precondition failed: {0}")]
    PreconditionError(String),

    #[error("Deadline exceeded after {timeout:?} waiting for {what}")]
    DeadlineExceeded { what: String, timeout: Duration },

    #[error("Unsupported transition: {0}")]
    UnsupportedTransition(String),

    #[error("Data integrity check failed during {step}: {check}")]
    DataIntegrityError {
        step: MigrationStep,
        check: IntegrityCheck,
    },

    #[error("Provisioning failed: {message}")]
    ProvisioningFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("Deployment {deployment_id} was created but is not ready: {source}")]
    ProvisioningIncomplete {
        deployment_id: String,
        #[source]
        source: Box<HarnessError>,
    },

    #[error("Secret store error: {0}")]
    SecretError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Lifecycle error: {0}")]
    LifecycleError(String),
}

impl HarnessError {
    /// Whether the failure is worth retrying inside a polling loop
    pub fn is_transient(&self) -> bool {
        matches!(self, HarnessError::NetworkError(_))
    }

    /// Whether the server reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, HarnessError::TransportError { status: 404, .. })
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            HarnessError::TransportError { status, .. } => Some(*status),
            HarnessError::ProvisioningFailed { status, .. } => *status,
            _ => None,
        }
    }
}

/// Data migration steps that verify the cluster's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    SetReadOnly,
    CreateIndex,
    Reindex,
    SwapAlias,
    AssistanceUpgrade,
    AssistantReindex,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationStep::SetReadOnly => "set index read-only",
            MigrationStep::CreateIndex => "create index",
            MigrationStep::Reindex => "reindex",
            MigrationStep::SwapAlias => "swap alias",
            MigrationStep::AssistanceUpgrade => "migration assistance upgrade",
            MigrationStep::AssistantReindex => "upgrade assistant reindex",
        };
        f.write_str(name)
    }
}

/// The check a migration step failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityCheck {
    /// `acknowledged` was false or missing
    NotAcknowledged,

    /// `shards_acknowledged` was false or missing, the index itself exists
    ShardsNotAcknowledged,

    /// `failures` listed this many entries
    Failures(usize),

    /// The asynchronous reindex ended in a non-success status
    ReindexStatus(i64),
}

impl fmt::Display for IntegrityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityCheck::NotAcknowledged => f.write_str("request not acknowledged"),
            IntegrityCheck::ShardsNotAcknowledged => f.write_str("shards not acknowledged"),
            IntegrityCheck::Failures(count) => write!(f, "{} failures reported", count),
            IntegrityCheck::ReindexStatus(status) => write!(f, "reindex status is {}", status),
        }
    }
}

impl From<reqwest::Error> for HarnessError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            HarnessError::UnexpectedResponse(err.to_string())
        } else {
            HarnessError::NetworkError(err.to_string())
        }
    }
}
