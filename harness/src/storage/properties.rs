//! Deployment properties files
//!
//! Properties are written as `{WORKSPACE}/{deployment_id}.properties` in the
//! Java properties format so downstream jobs can source them.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::errors::HarnessError;
use crate::filesys::file::{Dir, File};

const HEADER: &str = "Cloud Cluster Info";

/// Where provisioning results are recorded
#[async_trait]
pub trait PropertiesSink: Send + Sync {
    /// Persist the properties of a deployment, replacing earlier ones
    async fn write_properties(
        &self,
        deployment_id: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), HarnessError>;

    /// Remove the properties of a deployment
    async fn remove_properties(&self, deployment_id: &str) -> Result<(), HarnessError>;
}

/// Properties files in the job workspace
#[derive(Debug, Clone)]
pub struct WorkspaceProperties {
    dir: Dir,
}

impl WorkspaceProperties {
    /// Open the workspace directory, defaulting to the current directory
    pub async fn open(workspace: Option<PathBuf>) -> Result<Self, HarnessError> {
        let path = match workspace {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        let dir = Dir::new(path);
        if !dir.is_dir().await {
            return Err(HarnessError::ConfigError(format!(
                "Workspace {} is not a directory",
                dir.path().display()
            )));
        }
        Ok(Self { dir })
    }

    pub fn file(&self, deployment_id: &str) -> File {
        self.dir.file(&format!("{}.properties", deployment_id))
    }

    /// Read back the properties of a deployment
    pub async fn load(&self, deployment_id: &str) -> Result<BTreeMap<String, String>, HarnessError> {
        let contents = self.file(deployment_id).read_string().await?;
        Ok(parse_properties(&contents))
    }
}

#[async_trait]
impl PropertiesSink for WorkspaceProperties {
    async fn write_properties(
        &self,
        deployment_id: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), HarnessError> {
        let file = self.file(deployment_id);
        let contents = render_properties(properties);
        file.write_atomic(contents.as_bytes()).await?;
        info!("Wrote properties file {}", file.path().display());
        Ok(())
    }

    async fn remove_properties(&self, deployment_id: &str) -> Result<(), HarnessError> {
        let file = self.file(deployment_id);
        if !file.exists().await {
            warn!("Properties file {} does not exist", file.path().display());
            return Ok(());
        }
        file.delete().await?;
        info!("Removed properties file {}", file.path().display());
        Ok(())
    }
}

/// Render properties with the header and a timestamp comment
pub fn render_properties(properties: &BTreeMap<String, String>) -> String {
    let mut out = format!(
        "#{}\n#{}\n",
        HEADER,
        Utc::now().format("%a %b %d %H:%M:%S UTC %Y")
    );
    for (key, value) in properties {
        out.push_str(&escape(key, true));
        out.push('=');
        out.push_str(&escape(value, false));
        out.push('\n');
    }
    out
}

/// Parse `key=value` lines, skipping comments and blank lines
pub fn parse_properties(contents: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = split_pair(line);
        properties.insert(unescape(key), unescape(value.trim_start()));
    }
    properties
}

fn split_pair(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], &line[i + 1..]),
            _ => {}
        }
    }
    (line, "")
}

fn escape(raw: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0c}' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("\\u{:04X}", unit));
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn unescape(raw: &str) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u16; 2];
            units.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }
        let decoded = match chars.next() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('t') => '\t',
            Some('f') => '\u{0c}',
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Ok(unit) = u16::from_str_radix(&hex, 16) {
                    units.push(unit);
                }
                continue;
            }
            Some(other) => other,
            None => break,
        };
        let mut buf = [0u16; 2];
        units.extend_from_slice(decoded.encode_utf16(&mut buf));
    }
    String::from_utf16_lossy(&units)
}
