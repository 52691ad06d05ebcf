//! Major version detection

use std::fmt;

use crate::errors::HarnessError;

/// Leading integer of a version string, up to the first `.`
pub fn major_version(version: &str) -> Result<u32, HarnessError> {
    let version = version.trim();
    let major = version.split('.').next().unwrap_or(version);
    major.parse().map_err(|_| {
        HarnessError::PreconditionError(format!("Invalid stack version {:?}", version))
    })
}

/// Data migration needed between two stack versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPath {
    /// Same major version
    NoOp,
    Migrate5to6,
    Migrate6to7,
    /// A major jump with no defined migration
    UnsupportedJump { from: u32, to: u32 },
}

impl MigrationPath {
    /// The path is chosen by the current major alone
    pub fn detect(version: &str, upgrade_version: &str) -> Result<Self, HarnessError> {
        let from = major_version(version)?;
        let to = major_version(upgrade_version)?;
        Ok(match from {
            _ if from == to => MigrationPath::NoOp,
            5 => MigrationPath::Migrate5to6,
            6 => MigrationPath::Migrate6to7,
            _ => MigrationPath::UnsupportedJump { from, to },
        })
    }
}

impl fmt::Display for MigrationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPath::NoOp => f.write_str("minor upgrade"),
            MigrationPath::Migrate5to6 => f.write_str("5.x to 6.x migration"),
            MigrationPath::Migrate6to7 => f.write_str("6.x to 7.x migration"),
            MigrationPath::UnsupportedJump { from, to } => {
                write!(f, "{}.x to {}.x migration", from, to)
            }
        }
    }
}
