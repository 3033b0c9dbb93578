//! Core data models for the sampler.
//!
//! This module contains the value-type classification reported by the
//! store, the per-instance sampling options and report metadata.

use crate::error::SampleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Native data-structure classification of a key, as reported by `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Plain string value
    String,
    /// List value
    List,
    /// Unordered set value
    Set,
    /// Sorted set (`zset`) value
    SortedSet,
    /// Hash value
    Hash,
    /// Anything else; never valid for a sampled key
    Unknown,
}

impl ValueType {
    /// The five classifications the sampler knows how to characterize.
    pub const SAMPLED: [ValueType; 5] = [
        ValueType::String,
        ValueType::List,
        ValueType::Set,
        ValueType::SortedSet,
        ValueType::Hash,
    ];

    /// Parse a `TYPE` reply. Unrecognized replies map to `Unknown`.
    pub fn from_type_reply(reply: &str) -> Self {
        match reply {
            "string" => ValueType::String,
            "list" => ValueType::List,
            "set" => ValueType::Set,
            "zset" => ValueType::SortedSet,
            "hash" => ValueType::Hash,
            _ => ValueType::Unknown,
        }
    }

    /// The name the store uses for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::List => "list",
            ValueType::Set => "set",
            ValueType::SortedSet => "zset",
            ValueType::Hash => "hash",
            ValueType::Unknown => "unknown",
        }
    }

    /// Human-readable label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            ValueType::String => "String",
            ValueType::List => "List",
            ValueType::Set => "Set",
            ValueType::SortedSet => "Sorted Set",
            ValueType::Hash => "Hash",
            ValueType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling configuration for one store instance.
///
/// Immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Host name or IP address of the instance.
    pub host: String,
    /// TCP port of the instance.
    pub port: u16,
    /// Number of random keys to sample.
    pub num_keys: usize,
}

impl Options {
    /// Creates options for sampling `num_keys` keys from `host:port`.
    pub fn new(host: impl Into<String>, port: u16, num_keys: usize) -> Self {
        Self {
            host: host.into(),
            port,
            num_keys,
        }
    }

    /// Creates options from a parsed endpoint.
    pub fn for_endpoint(endpoint: &Endpoint, num_keys: usize) -> Self {
        Self::new(endpoint.host.clone(), endpoint.port, num_keys)
    }

    /// Returns the dialable `host:port` address.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Reject options that cannot produce a sample.
    pub fn validate(&self) -> Result<(), SampleError> {
        if self.num_keys == 0 {
            return Err(SampleError::InvalidOptions(
                "number of keys to sample must be at least 1".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(SampleError::InvalidOptions("host must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Default port for instances given without one.
pub const DEFAULT_PORT: u16 = 6379;

/// A `host[:port]` endpoint as given on the command line or in config.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("endpoint must not be empty".to_string());
        }

        // [::1]:6379
        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| format!("unterminated IPv6 address in endpoint: {}", s))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => parse_port(p, s)?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => return Err(format!("invalid endpoint: {}", s)),
            };
            return Ok(Endpoint {
                host: host.to_string(),
                port,
            });
        }

        match s.rsplit_once(':') {
            Some((host, _)) if host.contains(':') => Err(format!(
                "IPv6 endpoints must be bracketed, e.g. [::1]:6379: {}",
                s
            )),
            Some((host, port)) if !host.is_empty() => Ok(Endpoint {
                host: host.to_string(),
                port: parse_port(port, s)?,
            }),
            Some(_) => Err(format!("missing host in endpoint: {}", s)),
            None => Ok(Endpoint {
                host: s.to_string(),
                port: DEFAULT_PORT,
            }),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(port: &str, endpoint: &str) -> Result<u16, String> {
    port.parse::<u16>()
        .map_err(|_| format!("invalid port in endpoint: {}", endpoint))
}

/// Session-wide facts printed at the top of every bucket report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// When the session finished.
    pub generated_at: DateTime<Utc>,
    /// Instances whose samples went into the totals.
    pub instances: Vec<String>,
    /// Instances dropped under the skip policy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    /// Aggregation policy used to form buckets.
    pub aggregator: String,
    /// Sum of the instances' key counts.
    pub key_count: u64,
    /// Keys sampled across all instances.
    pub sampled: usize,
    pub duration_seconds: f64,
}

impl ReportMetadata {
    /// Scale an observation count up to the whole keyspace.
    pub fn estimate_keys(&self, observed: u64) -> u64 {
        if self.sampled == 0 {
            return 0;
        }
        (observed as f64 / self.sampled as f64 * self.key_count as f64).round() as u64
    }

    /// Percentage of the sample an observation count represents.
    pub fn share(&self, observed: u64) -> f64 {
        if self.sampled == 0 {
            return 0.0;
        }
        observed as f64 * 100.0 / self.sampled as f64
    }
}
