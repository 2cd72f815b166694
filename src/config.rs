//! YAML configuration for header layout, attachment limits, and the ledger.
//!
//! Every field has a default, so a config file only needs the settings it
//! changes:
//!
//! ```yaml
//! header:
//!   fixed_columns: 12
//! attachments:
//!   max_owner_files: 5
//! ```

use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{attachment::AttachmentPolicy, header::HeaderLayout, ledger::LedgerConfig};

pub const DEFAULT_STORE_DIR: &str = ".csv-intake";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IntakeConfig {
    pub header: HeaderLayout,
    pub attachments: AttachmentPolicy,
    pub ledger: LedgerConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,
}

impl IntakeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)?;
        let config: IntakeConfig =
            serde_yaml::from_str(&raw).with_context(|| format!("Parsing config file {path:?}"))?;
        config
            .header
            .validate()
            .with_context(|| format!("Validating header layout in {path:?}"))?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing config")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = self.to_yaml()?;
        let mut file =
            File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// The store directory, preferring an explicit override over the config file.
    pub fn resolve_store_dir(&self, override_dir: Option<&Path>) -> PathBuf {
        override_dir
            .map(Path::to_path_buf)
            .or_else(|| self.store_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR))
    }
}
