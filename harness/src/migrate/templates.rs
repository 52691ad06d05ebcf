//! Request bodies of the 5.x to 6.x kibana index migration

use std::path::Path;

use serde_json::Value;
use tracing::info;

use crate::errors::HarnessError;
use crate::filesys::file::File;

const MAPPINGS_FILE: &str = "mappings6.json";
const REINDEX_FILE: &str = "reindex6.json";
const ALIAS_FILE: &str = "alias6.json";

const BUNDLED_MAPPINGS: &str = include_str!("../../resources/mappings6.json");
const BUNDLED_REINDEX: &str = include_str!("../../resources/reindex6.json");
const BUNDLED_ALIAS: &str = include_str!("../../resources/alias6.json");

/// Index mappings, reindex request and alias actions
#[derive(Debug, Clone)]
pub struct MigrationTemplates {
    pub mappings: Value,
    pub reindex: Value,
    pub alias: Value,
}

impl MigrationTemplates {
    /// Templates shipped with the binary
    pub fn bundled() -> Result<Self, HarnessError> {
        Ok(Self {
            mappings: serde_json::from_str(BUNDLED_MAPPINGS)?,
            reindex: serde_json::from_str(BUNDLED_REINDEX)?,
            alias: serde_json::from_str(BUNDLED_ALIAS)?,
        })
    }

    /// Load templates from `dir`, falling back to the bundled file for each
    /// one the directory does not contain
    pub async fn load(dir: Option<&Path>) -> Result<Self, HarnessError> {
        let mut templates = Self::bundled()?;
        let Some(dir) = dir else {
            return Ok(templates);
        };

        for (name, slot) in [
            (MAPPINGS_FILE, &mut templates.mappings),
            (REINDEX_FILE, &mut templates.reindex),
            (ALIAS_FILE, &mut templates.alias),
        ] {
            let file = File::new(dir.join(name));
            if file.exists().await {
                info!("Using migration template {}", file.path().display());
                *slot = serde_json::from_str(&file.read_string().await?)?;
            }
        }
        Ok(templates)
    }
}
