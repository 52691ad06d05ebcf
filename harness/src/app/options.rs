//! Harness configuration options
//!
//! Options come from `--key=value` command line arguments, falling back to
//! `ESTF_*` environment variables and then to defaults.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::authn::vault::VaultSettings;
use crate::cloud::region::Region;
use crate::cloud::{cloud_host, DEFAULT_CLOUD_HOST};
use crate::deploy::provision::{parse_kibana_zone_count, DeploymentTarget, TopologyFlags};
use crate::deploy::waiter::WaitOptions;
use crate::errors::HarnessError;
use crate::logs::LogLevel;

/// Minutes to wait for a resource when `ESTF_CLOUD_WAIT_MINUTES` is not set
pub const DEFAULT_WAIT_MINUTES: u64 = 20;

/// Phase requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Create,
    Upgrade,
    Migrate,
    Shutdown,
    Pipeline,
}

impl Command {
    const ALL: [(&'static str, Command); 5] = [
        ("create", Command::Create),
        ("upgrade", Command::Upgrade),
        ("migrate", Command::Migrate),
        ("shutdown", Command::Shutdown),
        ("pipeline", Command::Pipeline),
    ];
}

/// Where `--migrate` connects to
#[derive(Debug, Default)]
pub struct ClusterEndpoints {
    pub elasticsearch_url: Option<String>,
    pub kibana_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

/// Main harness options
#[derive(Debug)]
pub struct HarnessOptions {
    pub command: Command,
    pub stack_version: Option<String>,
    pub upgrade_version: Option<String>,
    pub region: Region,
    pub kibana_zone_count: u32,
    pub flags: TopologyFlags,
    pub es_user_settings: Option<String>,
    pub kibana_user_settings: Option<String>,
    pub cloud_host: String,
    pub deployment_id: Option<String>,
    pub wait: WaitOptions,
    pub templates_dir: Option<PathBuf>,
    pub strict_migration: bool,
    pub teardown_on_failure: bool,
    pub workspace: Option<PathBuf>,
    pub log_level: LogLevel,
    pub json_logs: bool,
    pub vault: VaultSettings,
    pub cluster: ClusterEndpoints,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            command: Command::Pipeline,
            stack_version: None,
            upgrade_version: None,
            region: Region::select(None),
            kibana_zone_count: 1,
            flags: TopologyFlags::default(),
            es_user_settings: None,
            kibana_user_settings: None,
            cloud_host: DEFAULT_CLOUD_HOST.to_string(),
            deployment_id: None,
            wait: WaitOptions::with_timeout(Duration::from_secs(DEFAULT_WAIT_MINUTES * 60)),
            templates_dir: None,
            strict_migration: false,
            teardown_on_failure: false,
            workspace: None,
            log_level: LogLevel::Info,
            json_logs: false,
            vault: VaultSettings::default(),
            cluster: ClusterEndpoints::default(),
        }
    }
}

/// Looks a value up on the command line first, then in the environment
struct Sources<'a, E> {
    cli: &'a HashMap<String, String>,
    env: E,
}

impl<E> Sources<'_, E>
where
    E: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str, env_key: &str) -> Option<String> {
        self.cli
            .get(key)
            .cloned()
            .or_else(|| (self.env)(env_key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn cli_flag(&self, key: &str) -> bool {
        self.cli.get(key).map(|v| is_truthy(v)).unwrap_or(false)
    }

    fn flag(&self, key: &str, env_key: &str) -> bool {
        self.get(key, env_key).map(|v| is_truthy(&v)).unwrap_or(false)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

impl HarnessOptions {
    /// Build options from arguments and the process environment
    pub fn from_args(cli: &HashMap<String, String>) -> Result<Self, HarnessError> {
        Self::from_sources(cli, |key| std::env::var(key).ok())
    }

    /// Build options from arguments and an environment lookup
    pub fn from_sources<E>(cli: &HashMap<String, String>, env: E) -> Result<Self, HarnessError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let src = Sources { cli, env };

        let commands: Vec<Command> = Command::ALL
            .iter()
            .filter(|(key, _)| src.cli_flag(key))
            .map(|(_, command)| *command)
            .collect();
        let command = match commands.as_slice() {
            [command] => *command,
            [] => {
                return Err(HarnessError::ConfigError(
                    "One of --create, --upgrade, --migrate, --shutdown, --pipeline is required"
                        .to_string(),
                ))
            }
            _ => {
                return Err(HarnessError::ConfigError(
                    "Only one phase can be requested at a time".to_string(),
                ))
            }
        };

        let wait_minutes = match src.get("wait-minutes", "ESTF_CLOUD_WAIT_MINUTES") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                HarnessError::ConfigError(format!("Invalid wait minutes {:?}", raw))
            })?,
            None => DEFAULT_WAIT_MINUTES,
        };

        let log_level = match src.get("log-level", "ESTF_LOG_LEVEL") {
            Some(raw) => LogLevel::from_str(&raw)
                .map_err(|e| HarnessError::ConfigError(format!("{}", e)))?,
            None => LogLevel::Info,
        };

        let host = src.get("cloud-host", "ESTF_CLOUD_HOST");

        Ok(Self {
            command,
            stack_version: src.get("stack-version", "ESTF_CLOUD_VERSION"),
            upgrade_version: src.get("upgrade-version", "ESTF_UPGRADE_CLOUD_VERSION"),
            region: Region::select(src.get("region", "ESTF_CLOUD_REGION").as_deref()),
            kibana_zone_count: parse_kibana_zone_count(
                src.get("kibana-zone", "ESTF_CLOUD_KIBANA_ZONE").as_deref(),
            ),
            flags: TopologyFlags {
                ml: src.cli_flag("ml"),
                ingest: src.cli_flag("ingest"),
                apm: src.cli_flag("apm"),
                enterprise_search: src.cli_flag("enterprise-search"),
                kibana_reports: src.cli_flag("kibana-reports"),
            },
            es_user_settings: src.get("es-user-settings", "ESTF_ES_USER_SETTINGS"),
            kibana_user_settings: src.get("kibana-user-settings", "ESTF_KIBANA_USER_SETTINGS"),
            cloud_host: cloud_host(host.as_deref())?,
            deployment_id: src.get("deployment-id", "ESTF_DEPLOYMENT_ID"),
            wait: WaitOptions::with_timeout(Duration::from_secs(wait_minutes * 60)),
            templates_dir: src
                .get("templates-dir", "ESTF_MIGRATION_TEMPLATES_DIR")
                .map(PathBuf::from),
            strict_migration: src.flag("strict-migration", "ESTF_MIGRATION_STRICT"),
            teardown_on_failure: src.cli_flag("teardown-on-failure"),
            workspace: src.get("workspace", "WORKSPACE").map(PathBuf::from),
            log_level,
            json_logs: src.cli_flag("json-logs"),
            vault: VaultSettings {
                addr: src.get("vault-addr", "VAULT_ADDR"),
                token: (src.env)("VAULT_TOKEN").map(SecretString::from),
                path: src.get("vault-path", "VAULT_PATH"),
            },
            cluster: ClusterEndpoints {
                elasticsearch_url: src.get("es-url", "ESTF_ELASTICSEARCH_URL"),
                kibana_url: src.get("kibana-url", "ESTF_KIBANA_URL"),
                username: src.get("username", "ESTF_ES_USERNAME"),
                password: cli
                    .get("password")
                    .cloned()
                    .or_else(|| (src.env)("ESTF_ES_PASSWORD"))
                    .map(SecretString::from),
            },
        })
    }

    /// Stack version, required by every phase but shutdown
    pub fn require_stack_version(&self) -> Result<&str, HarnessError> {
        self.stack_version.as_deref().ok_or_else(|| {
            HarnessError::PreconditionError("ESTF_CLOUD_VERSION is required".to_string())
        })
    }

    pub fn require_upgrade_version(&self) -> Result<&str, HarnessError> {
        self.upgrade_version.as_deref().ok_or_else(|| {
            HarnessError::PreconditionError("ESTF_UPGRADE_CLOUD_VERSION is required".to_string())
        })
    }

    pub fn require_deployment_id(&self) -> Result<&str, HarnessError> {
        self.deployment_id.as_deref().ok_or_else(|| {
            HarnessError::PreconditionError("ESTF_DEPLOYMENT_ID is required".to_string())
        })
    }

    /// What `--create` and `--pipeline` provision
    pub fn target(&self) -> DeploymentTarget {
        DeploymentTarget {
            stack_version: self.stack_version.clone().unwrap_or_default(),
            region: self.region.clone(),
            flags: self.flags,
            es_user_settings: self.es_user_settings.clone(),
            kibana_user_settings: self.kibana_user_settings.clone(),
            kibana_zone_count: self.kibana_zone_count,
        }
    }
}
