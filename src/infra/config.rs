//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::{bail, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Which cluster assignment adapter to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Spatio-temporal DBSCAN over the raw trace
    StDbscan,
    /// Use the `cluster_id` column shipped with the trace
    Prelabeled,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::StDbscan => "st-dbscan",
            ModelKind::Prelabeled => "prelabeled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClusteringConfig {
    #[serde(default = "default_model")]
    pub model: ModelKind,
    /// Spatial neighbourhood radius (meters)
    #[serde(default = "default_eps_meters")]
    pub eps_meters: f64,
    /// Temporal neighbourhood radius (seconds)
    #[serde(default = "default_eps_seconds")]
    pub eps_seconds: i64,
    /// Neighbours (self included) needed for a core point
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

fn default_model() -> ModelKind {
    ModelKind::StDbscan
}

fn default_eps_meters() -> f64 {
    50.0
}

fn default_eps_seconds() -> i64 {
    300
}

fn default_min_samples() -> usize {
    3
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            eps_meters: default_eps_meters(),
            eps_seconds: default_eps_seconds(),
            min_samples: default_min_samples(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// CSV field delimiter (single ASCII character)
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { delimiter: default_delimiter() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    /// Enriched points table (CSV)
    #[serde(default = "default_points_file")]
    pub points_file: String,
    /// Stop table (CSV)
    #[serde(default = "default_stops_file")]
    pub stops_file: String,
    /// Optional JSONL copy of the stop table
    #[serde(default)]
    pub stops_jsonl: Option<String>,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_points_file() -> String {
    "gps_clusters.csv".to_string()
}

fn default_stops_file() -> String {
    "stop_clusters.csv".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            points_file: default_points_file(),
            stops_file: default_stops_file(),
            stops_jsonl: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Main configuration struct, passed explicitly to every run
#[derive(Debug, Clone)]
pub struct Config {
    clustering: ClusteringConfig,
    delimiter: u8,
    output_dir: String,
    points_file: String,
    stops_file: String,
    stops_jsonl: Option<String>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clustering: ClusteringConfig::default(),
            delimiter: b',',
            output_dir: default_output_dir(),
            points_file: default_points_file(),
            stops_file: default_stops_file(),
            stops_jsonl: None,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from an explicit argument or environment
    pub fn resolve_config_path(arg: Option<&str>) -> String {
        if let Some(path) = arg {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let clustering = toml_config.clustering;
        if !clustering.eps_meters.is_finite() || clustering.eps_meters <= 0.0 {
            bail!("clustering.eps_meters must be a positive number, got {}", clustering.eps_meters);
        }
        if clustering.eps_seconds < 0 {
            bail!("clustering.eps_seconds must not be negative, got {}", clustering.eps_seconds);
        }

        let delimiter = toml_config.input.delimiter;
        if !delimiter.is_ascii() {
            bail!("input.delimiter must be a single ASCII character, got {:?}", delimiter);
        }

        Ok(Self {
            clustering,
            delimiter: delimiter as u8,
            output_dir: toml_config.output.dir,
            points_file: toml_config.output.points_file,
            stops_file: toml_config.output.stops_file,
            stops_jsonl: toml_config.output.stops_jsonl,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    pub fn with_model(mut self, model: ModelKind) -> Self {
        self.clustering.model = model;
        self
    }

    pub fn with_output_dir(mut self, dir: &str) -> Self {
        self.output_dir = dir.to_string();
        self
    }

    pub fn clustering(&self) -> &ClusteringConfig {
        &self.clustering
    }

    pub fn model(&self) -> ModelKind {
        self.clustering.model
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn output_dir(&self) -> &str {
        &self.output_dir
    }

    pub fn points_path(&self) -> PathBuf {
        Path::new(&self.output_dir).join(&self.points_file)
    }

    pub fn stops_path(&self) -> PathBuf {
        Path::new(&self.output_dir).join(&self.stops_file)
    }

    pub fn stops_jsonl_path(&self) -> Option<PathBuf> {
        self.stops_jsonl.as_ref().map(|f| Path::new(&self.output_dir).join(f))
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
