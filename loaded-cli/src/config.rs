//! Configuration loading from loaded.toml
//!
//! Suite defaults can be kept in a `loaded.toml` file next to the workload.
//! The file is discovered by walking up from the current directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// A duration string could not be parsed
    #[error("invalid duration {0:?}: {1}")]
    Duration(String, &'static str),

    /// The output format is not recognised
    #[error("{0}")]
    Format(String),
}

/// Loaded configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadedConfig {
    /// Suite configuration
    #[serde(default)]
    pub suite: SuiteSection,
    /// Output configuration
    #[serde(default)]
    pub output: OutputSection,
}

/// `[suite]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteSection {
    /// Suite title
    #[serde(default = "default_title")]
    pub title: String,
    /// Number of workload iterations
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    /// Maximum iterations in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-iteration timeout (e.g., "5s"); unset means no timeout
    #[serde(default)]
    pub iteration_timeout: Option<String>,
}

impl Default for SuiteSection {
    fn default() -> Self {
        Self {
            title: default_title(),
            iterations: default_iterations(),
            concurrency: default_concurrency(),
            iteration_timeout: None,
        }
    }
}

fn default_title() -> String {
    "loaded".to_string()
}
fn default_iterations() -> u64 {
    1
}
fn default_concurrency() -> usize {
    1
}

/// `[output]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSection {
    /// Output format: "human" or "json"
    #[serde(default = "default_format")]
    pub format: String,
    /// Minimum time between two progress lines (e.g., "1s")
    #[serde(default = "default_progress_interval")]
    pub progress_interval: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            format: default_format(),
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}
fn default_progress_interval() -> String {
    "1s".to_string()
}

impl LoadedConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Result<Self, ConfigError>> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("loaded.toml");
            if config_path.exists() {
                return Some(Self::load(&config_path));
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# Loaded Configuration

[suite]
# Suite title used in reports
title = "loaded"
# Number of workload iterations
iterations = 1
# Maximum iterations in flight
concurrency = 1
# Abort iterations that run longer than this (uncomment to enable)
# iteration_timeout = "30s"

[output]
# Output format: human or json
format = "human"
# Minimum time between two progress lines
progress_interval = "1s"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m")
    pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::Duration(s.to_string(), "empty duration"));
        }

        let (num_part, unit_part) = trimmed
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| trimmed.split_at(i))
            .unwrap_or((trimmed, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| ConfigError::Duration(s.to_string(), "not a number"))?;
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Duration(s.to_string(), "must be non-negative"));
        }

        let nanos_per_unit: f64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1.0,
            "us" | "µs" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" | "min" => 60_000_000_000.0,
            _ => return Err(ConfigError::Duration(s.to_string(), "unknown unit")),
        };

        Ok(Duration::from_nanos((value * nanos_per_unit) as u64))
    }
}
