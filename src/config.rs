use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::util::{read_text, section_file_name};

pub const DEFAULT_REQUIREMENT_PATTERN: &str = "odd{n}.yaml";
pub const DEFAULT_DOCUMENT_PATTERN: &str = "ODD_Section_{n}_short.md";
pub const DEFAULT_REPORT_PATTERN: &str = "Section{n}_eval.csv";
pub const DEFAULT_MERGED_NAME: &str = "merged_evaluation.csv";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub temperature: f32,
    pub model: Option<String>,
    pub max_workers: usize,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub jitter_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            model: None,
            max_workers: 4,
            retry_count: 3,
            retry_delay_ms: 1000,
            jitter_ms: 1000,
            timeout_ms: 120_000,
        }
    }
}

impl ModelParams {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where per-section inputs and outputs live, keyed by a `{n}` pattern.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SectionLayout {
    pub yaml_dir: PathBuf,
    pub md_dir: PathBuf,
    pub output_dir: PathBuf,
    pub requirement_pattern: String,
    pub document_pattern: String,
    pub report_pattern: String,
    pub merged_name: String,
}

impl Default for SectionLayout {
    fn default() -> Self {
        Self {
            yaml_dir: PathBuf::from("./config"),
            md_dir: PathBuf::from("./examples"),
            output_dir: PathBuf::from("./evaluation_results"),
            requirement_pattern: DEFAULT_REQUIREMENT_PATTERN.to_string(),
            document_pattern: DEFAULT_DOCUMENT_PATTERN.to_string(),
            report_pattern: DEFAULT_REPORT_PATTERN.to_string(),
            merged_name: DEFAULT_MERGED_NAME.to_string(),
        }
    }
}

impl SectionLayout {
    pub fn requirement_path(&self, section_number: u32) -> PathBuf {
        self.yaml_dir
            .join(section_file_name(&self.requirement_pattern, section_number))
    }

    pub fn document_path(&self, section_number: u32) -> PathBuf {
        self.md_dir
            .join(section_file_name(&self.document_pattern, section_number))
    }

    pub fn report_path(&self, section_number: u32) -> PathBuf {
        self.output_dir
            .join(section_file_name(&self.report_pattern, section_number))
    }

    pub fn merged_path(&self) -> PathBuf {
        self.output_dir.join(&self.merged_name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub layout: SectionLayout,
    pub prompt_file: Option<PathBuf>,
    pub section_range: String,
    pub model_params: ModelParams,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            layout: SectionLayout::default(),
            prompt_file: None,
            section_range: "1-5".to_string(),
            model_params: ModelParams::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = read_text(path)?;
        let config = Self::from_yaml(&raw)
            .with_context(|| format!("invalid configuration file {}", path.display()))?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_bw::from_str(raw).context("failed to parse configuration yaml")
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
