use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::logging::LoggingConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    /// Dump used when `catalog import` is called without a path.
    #[serde(default)]
    pub dump_path: Option<PathBuf>,
    #[serde(default = "default_import_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            dump_path: None,
            batch_size: default_import_batch_size(),
            progress_every: default_progress_every(),
        }
    }
}

fn default_import_batch_size() -> usize {
    1000
}
fn default_progress_every() -> u64 {
    100_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_min_desc_length")]
    pub min_desc_length: usize,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            batch_size: default_cleanup_batch_size(),
            threshold: default_threshold(),
            min_desc_length: default_min_desc_length(),
            sample_size: default_sample_size(),
        }
    }
}

fn default_cleanup_batch_size() -> usize {
    10_000
}
fn default_threshold() -> f64 {
    0.4
}
fn default_min_desc_length() -> usize {
    30
}
fn default_sample_size() -> usize {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

impl Config {
    /// Check the invariants every command relies on.
    pub fn validate(&self) -> Result<()> {
        if self.import.batch_size == 0 {
            anyhow::bail!("import.batch_size must be > 0");
        }
        if self.import.progress_every == 0 {
            anyhow::bail!("import.progress_every must be > 0");
        }
        if self.cleanup.batch_size == 0 {
            anyhow::bail!("cleanup.batch_size must be > 0");
        }
        if !(0.0..=1.0).contains(&self.cleanup.threshold) {
            anyhow::bail!("cleanup.threshold must be in [0.0, 1.0]");
        }
        if self.cleanup.min_desc_length == 0 {
            anyhow::bail!("cleanup.min_desc_length must be > 0");
        }
        Ok(())
    }
}
