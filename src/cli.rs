//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Values left unset here fall back to the
//! config file and then to built-in defaults.

use crate::analysis::AggregatorKind;
use crate::models::Endpoint;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reckon - sample a Redis keyspace and summarize what lives in it
///
/// Picks random keys from one or more instances, groups them into
/// buckets and reports per-type sizes and the most common keys,
/// members and values.
///
/// Examples:
///   reckon --instance localhost:6379 --samples 5000
///   reckon -i cache-1:6379,cache-2:6379 --aggregate prefix --depth 2
///   reckon -i 10.0.0.5 --aggregate type --format json -o reports/
///   reckon --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Instance to sample, as host[:port] (repeatable or comma-separated)
    ///
    /// IPv6 hosts must be bracketed, e.g. [::1]:6379.
    /// Defaults to the config file's instances, or localhost:6379.
    #[arg(
        short,
        long = "instance",
        value_name = "HOST:PORT",
        value_delimiter = ',',
        env = "RECKON_INSTANCES"
    )]
    pub instances: Vec<String>,

    /// Number of random keys to sample from each instance
    #[arg(short = 'n', long, value_name = "COUNT", env = "RECKON_SAMPLES")]
    pub samples: Option<usize>,

    /// How sampled keys are grouped into report buckets
    #[arg(long, value_name = "POLICY")]
    pub aggregate: Option<AggregatorKind>,

    /// Key segment delimiter for --aggregate prefix
    #[arg(long, value_name = "DELIM")]
    pub delimiter: Option<String>,

    /// Number of leading key segments forming a prefix bucket
    #[arg(long, value_name = "SEGMENTS")]
    pub depth: Option<usize>,

    /// Directory the per-bucket reports are written to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .reckon.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Skip instances that fail instead of aborting the session
    ///
    /// Exit code 2 when at least one instance was skipped.
    #[arg(long)]
    pub keep_going: bool,

    /// Connect timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Per-command timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub command_timeout: Option<u64>,

    /// Number of entries in each "most common" table
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,

    /// Log progress lines instead of drawing progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Generate a default .reckon.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// File extension used for reports in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.samples == Some(0) {
            return Err("Samples must be at least 1".to_string());
        }

        if self.depth == Some(0) {
            return Err("Prefix depth must be at least 1".to_string());
        }

        if matches!(self.delimiter.as_deref(), Some("")) {
            return Err("Prefix delimiter must not be empty".to_string());
        }

        if self.connect_timeout == Some(0) || self.command_timeout == Some(0) {
            return Err("Timeouts must be at least 1 second".to_string());
        }

        for instance in &self.instances {
            instance
                .parse::<Endpoint>()
                .map_err(|e| format!("Invalid --instance: {}", e))?;
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the config file's `general.verbose`; `--quiet`
    /// still wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
