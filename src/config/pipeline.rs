// src/config/pipeline.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PIPELINE_CONFIG: &str = "LEAD_PIPELINE_CONFIG";
pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";

/// Pool sizes, batch size and filtering thresholds. The defaults are tuned
/// against the free-tier limits of the content source and reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fetch_workers: usize,
    pub analysis_workers: usize,
    pub batch_size: usize,
    pub min_request_interval_ms: u64,
    /// Items whose trimmed body is not longer than this are dropped.
    pub min_body_chars: usize,
    pub body_max_chars: usize,
    /// Body characters quoted per item in an analysis prompt.
    pub prompt_body_chars: usize,
    pub max_channels: usize,
    pub default_per_channel: usize,
    pub max_per_channel: usize,
    pub qualify_min_score: u8,
    pub max_results: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_workers: 3,
            analysis_workers: 3,
            batch_size: 6,
            min_request_interval_ms: 1000,
            min_body_chars: 50,
            body_max_chars: 2500,
            prompt_body_chars: 800,
            max_channels: 15,
            default_per_channel: 30,
            max_per_channel: 100,
            qualify_min_score: 50,
            max_results: 100,
        }
    }
}

impl PipelineConfig {
    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(s).context("parsing pipeline config")?;
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks:
    /// 1) $LEAD_PIPELINE_CONFIG
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PIPELINE_CONFIG} points to non-existent path"));
        }
        let default_p = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        Ok(Self::default())
    }

    /// Zero-sized pools or batches would stall the pipeline; clamp them to 1.
    pub fn sanitized(mut self) -> Self {
        self.fetch_workers = self.fetch_workers.max(1);
        self.analysis_workers = self.analysis_workers.max(1);
        self.batch_size = self.batch_size.max(1);
        self.max_channels = self.max_channels.max(1);
        self.max_per_channel = self.max_per_channel.max(1);
        self.default_per_channel = self.default_per_channel.clamp(1, self.max_per_channel);
        self.qualify_min_score = self.qualify_min_score.min(100);
        self
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}
