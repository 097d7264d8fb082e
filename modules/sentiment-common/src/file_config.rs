use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::types::GroupBy;

/// TOML-backed tunables. Secrets (DB URL, API token) stay as env vars.
/// Every section is optional; a missing file section falls back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    /// Upper bound on concurrent normalize+score tasks.
    pub pool_size: usize,
    pub group_by: GroupBy,
    /// Max posts requested from the extraction source per topic.
    pub fetch_limit: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            group_by: GroupBy::default(),
            fetch_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Cardinality bound for top-N chart tables.
    pub top_n: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./output"),
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PersistenceConfig {
    /// Total attempts per sink write, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub backoff_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 250,
        }
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    if config.pipeline.pool_size == 0 {
        anyhow::bail!("pipeline.pool_size must be at least 1");
    }
    if config.persistence.max_attempts == 0 {
        anyhow::bail!("persistence.max_attempts must be at least 1");
    }
    Ok(config)
}

impl FileConfig {
    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => load_config(p),
            None => Ok(Self::default()),
        }
    }
}
