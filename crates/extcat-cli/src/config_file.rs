//! Versioned repository configuration file.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use extcat_catalog::dedupe_repositories;
use extcat_core::write_text_atomic;
use extcat_remote::DEFAULT_FETCH_TIMEOUT_MS;
use serde::{Deserialize, Serialize};

pub(crate) const CATALOG_CONFIG_SCHEMA_VERSION: u32 = 1;
pub(crate) const DEFAULT_DATABASE_PATH: &str = ".extcat/catalog.sqlite";

fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT_MS
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CatalogConfigFile {
    pub(crate) schema_version: u32,
    #[serde(default)]
    pub(crate) repositories: Vec<String>,
    #[serde(default = "default_fetch_timeout_ms")]
    pub(crate) fetch_timeout_ms: u64,
    #[serde(default = "default_database_path")]
    pub(crate) database_path: PathBuf,
}

impl Default for CatalogConfigFile {
    fn default() -> Self {
        Self {
            schema_version: CATALOG_CONFIG_SCHEMA_VERSION,
            repositories: Vec::new(),
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            database_path: default_database_path(),
        }
    }
}

impl CatalogConfigFile {
    /// Appends `url` unless already configured. Returns whether it was added.
    pub(crate) fn add_repository(&mut self, url: &str) -> Result<bool> {
        let url = url.trim();
        if url.is_empty() {
            bail!("repository url cannot be empty");
        }
        if self.repositories.iter().any(|existing| existing == url) {
            return Ok(false);
        }
        self.repositories.push(url.to_string());
        Ok(true)
    }

    pub(crate) fn remove_repository(&mut self, url: &str) -> bool {
        let url = url.trim();
        let before = self.repositories.len();
        self.repositories.retain(|existing| existing != url);
        self.repositories.len() != before
    }
}

/// Loads the config file; a missing file yields the defaults.
pub(crate) fn load_catalog_config(path: &Path) -> Result<CatalogConfigFile> {
    if !path.exists() {
        return Ok(CatalogConfigFile::default());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog config {}", path.display()))?;
    let value = serde_json::from_str::<serde_json::Value>(&raw)
        .with_context(|| format!("failed to parse catalog config {}", path.display()))?;
    let schema_version = value
        .get("schema_version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| anyhow!("catalog config {} is missing schema_version", path.display()))?;
    if schema_version != u64::from(CATALOG_CONFIG_SCHEMA_VERSION) {
        bail!(
            "unsupported catalog config schema_version {} in {} (expected {})",
            schema_version,
            path.display(),
            CATALOG_CONFIG_SCHEMA_VERSION
        );
    }

    let mut config = serde_json::from_value::<CatalogConfigFile>(value)
        .with_context(|| format!("failed to parse catalog config {}", path.display()))?;
    if config.fetch_timeout_ms == 0 {
        bail!(
            "catalog config {} has fetch_timeout_ms=0; expected a positive value",
            path.display()
        );
    }
    config.repositories = dedupe_repositories(&config.repositories);
    Ok(config)
}

pub(crate) fn save_catalog_config(path: &Path, config: &CatalogConfigFile) -> Result<()> {
    let mut encoded =
        serde_json::to_string_pretty(config).context("failed to encode catalog config")?;
    encoded.push('\n');
    write_text_atomic(path, &encoded)
}
