//! Platform configuration loaded from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Capacity, naming and execution limits of the local platform.
///
/// Missing fields default to values suitable for a single workstation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlatformConfig {
    /// Prefix of every generated output file name.
    pub pipeline_name: String,

    /// Directory generated output paths are placed in.
    pub output_dir: PathBuf,

    /// Directory for per-job logs.
    pub log_dir: PathBuf,

    /// Largest CPU count a single job may request.
    pub max_cpus: u64,

    /// Largest memory (GB) a single job may request.
    pub max_mem: u64,

    /// Wall-clock limit for one job, in seconds.
    pub job_timeout_secs: u64,

    /// Truncate captured job stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            pipeline_name: "gap".to_string(),
            output_dir: PathBuf::from("gap_output"),
            log_dir: PathBuf::from("gap_output/logs"),
            max_cpus: 8,
            max_mem: 32,
            job_timeout_secs: 24 * 60 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl PlatformConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pipeline_name.trim().is_empty() {
            return Err(anyhow!("pipeline_name must be non-empty"));
        }
        if self.max_cpus == 0 {
            return Err(anyhow!("max_cpus must be > 0"));
        }
        if self.max_mem == 0 {
            return Err(anyhow!("max_mem must be > 0"));
        }
        if self.job_timeout_secs == 0 {
            return Err(anyhow!("job_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlatformConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlatformConfig> {
    if !path.exists() {
        let cfg = PlatformConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PlatformConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PlatformConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
