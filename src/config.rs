//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.reckon.toml` files.

use crate::analysis::{Aggregator, AggregatorKind};
use crate::cli::{Args, OutputFormat};
use crate::models::{Endpoint, Options};
use crate::sampler::FailurePolicy;
use crate::store::ConnectionSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Name of the config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".reckon.toml";

/// Where the session's configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No config file was found.
    Defaults,
    /// The default config file exists but could not be loaded.
    InvalidDefault(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// What to sample and how to group it.
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Store connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory reports are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: OutputFormat::default(),
            verbose: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Instances to sample, as `host[:port]`.
    #[serde(default = "default_instances")]
    pub instances: Vec<String>,

    /// Keys sampled from each instance.
    #[serde(default = "default_samples")]
    pub samples: usize,

    /// Grouping policy.
    #[serde(default)]
    pub aggregator: AggregatorKind,

    /// Segment delimiter for the prefix policy.
    #[serde(default = "default_prefix_delimiter")]
    pub prefix_delimiter: String,

    /// Leading segments forming a prefix bucket.
    #[serde(default = "default_prefix_depth")]
    pub prefix_depth: usize,

    /// What to do when an instance fails.
    #[serde(default)]
    pub on_error: FailurePolicy,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            instances: default_instances(),
            samples: default_samples(),
            aggregator: AggregatorKind::default(),
            prefix_delimiter: default_prefix_delimiter(),
            prefix_depth: default_prefix_depth(),
            on_error: FailurePolicy::default(),
        }
    }
}

fn default_instances() -> Vec<String> {
    vec!["localhost:6379".to_string()]
}

fn default_samples() -> usize {
    1000
}

fn default_prefix_delimiter() -> String {
    ":".to_string()
}

fn default_prefix_depth() -> usize {
    1
}

/// Store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Per-command timeout in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout(),
            command_timeout_seconds: default_command_timeout(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    30
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Entries in each "most common" table.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

fn default_top_n() -> usize {
    10
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Pick the configuration for a session.
    ///
    /// An explicit path must load. Otherwise `.reckon.toml` in `dir` is used
    /// when present and valid, and the defaults when it is missing or broken.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> Result<(Self, ConfigSource)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, ConfigSource::File(path.to_path_buf())));
        }

        match Self::load_from_dir(dir) {
            Ok(Some(config)) => Ok((config, ConfigSource::File(dir.join(DEFAULT_CONFIG_FILE)))),
            Ok(None) => Ok((Self::default(), ConfigSource::Defaults)),
            Err(e) => Ok((Self::default(), ConfigSource::InvalidDefault(format!("{:#}", e)))),
        }
    }

    /// Try to load `.reckon.toml` from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(DEFAULT_CONFIG_FILE);

        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref dir) = args.output_dir {
            self.general.output_dir = dir.clone();
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if !args.instances.is_empty() {
            self.sampling.instances = args.instances.clone();
        }
        if let Some(samples) = args.samples {
            self.sampling.samples = samples;
        }
        if let Some(kind) = args.aggregate {
            self.sampling.aggregator = kind;
        }
        if let Some(ref delimiter) = args.delimiter {
            self.sampling.prefix_delimiter = delimiter.clone();
        }
        if let Some(depth) = args.depth {
            self.sampling.prefix_depth = depth;
        }
        if args.keep_going {
            self.sampling.on_error = FailurePolicy::Skip;
        }

        if let Some(secs) = args.connect_timeout {
            self.connection.connect_timeout_seconds = secs;
        }
        if let Some(secs) = args.command_timeout {
            self.connection.command_timeout_seconds = secs;
        }

        if let Some(top) = args.top {
            self.report.top_n = top;
        }
    }

    /// Check values the CLI could not, because they came from the file.
    pub fn validate(&self) -> Result<()> {
        if self.sampling.instances.is_empty() {
            return Err(anyhow!("No instances configured"));
        }
        if self.sampling.samples == 0 {
            return Err(anyhow!("samples must be at least 1"));
        }
        if self.sampling.aggregator == AggregatorKind::Prefix {
            if self.sampling.prefix_delimiter.is_empty() {
                return Err(anyhow!("prefix_delimiter must not be empty"));
            }
            if self.sampling.prefix_depth == 0 {
                return Err(anyhow!("prefix_depth must be at least 1"));
            }
        }
        if self.connection.connect_timeout_seconds == 0
            || self.connection.command_timeout_seconds == 0
        {
            return Err(anyhow!("timeouts must be at least 1 second"));
        }
        self.endpoints().map(|_| ())
    }

    /// Parse the configured instances.
    ///
    /// An instance listed more than once (`cache:6379` and `cache` included)
    /// is kept at its first position only.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        let mut seen = HashSet::new();
        let mut endpoints = Vec::with_capacity(self.sampling.instances.len());

        for s in &self.sampling.instances {
            let endpoint = s
                .parse::<Endpoint>()
                .map_err(|e| anyhow!("Invalid instance '{}': {}", s, e))?;
            if seen.insert(endpoint.clone()) {
                endpoints.push(endpoint);
            } else {
                warn!("Instance {} listed more than once, sampling it once", endpoint);
            }
        }

        Ok(endpoints)
    }

    /// One set of run options per configured instance.
    pub fn run_options(&self) -> Result<Vec<Options>> {
        Ok(self
            .endpoints()?
            .iter()
            .map(|e| Options::for_endpoint(e, self.sampling.samples))
            .collect())
    }

    /// The configured grouping policy.
    pub fn aggregator(&self) -> Box<dyn Aggregator> {
        self.sampling
            .aggregator
            .build(&self.sampling.prefix_delimiter, self.sampling.prefix_depth)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            connect_timeout: Some(Duration::from_secs(self.connection.connect_timeout_seconds)),
            command_timeout: Some(Duration::from_secs(self.connection.command_timeout_seconds)),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
