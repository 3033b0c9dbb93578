//! Error types for the store client, the sampling engine and fleet
//! orchestration.

use crate::analysis::BucketMap;
use std::time::Duration;
use thiserror::Error;

/// Failures talking to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {0:?} waiting for the store")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed by the store")]
    Closed,
    #[error("malformed reply: {0}")]
    Protocol(String),
    #[error("store replied with error: {0}")]
    Server(String),
    #[error("unexpected reply to {command}: expected {expected}, got {got}")]
    UnexpectedReply {
        command: String,
        expected: &'static str,
        got: String,
    },
}

/// Failures that abort a sampling run.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("invalid sampling options: {0}")]
    InvalidOptions(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unknown type for key {key:?}: store reported {reported:?}")]
    UnknownType { key: String, reported: String },
    #[error("keyspace is empty, nothing to sample")]
    EmptyKeyspace,
}

/// A failed run, carrying whatever was accumulated before the failure.
///
/// `partial` is provisional and must not be reported as a result.
#[derive(Debug, Error)]
#[error("sampling {address} failed after {sampled} keys: {source}")]
pub struct RunError {
    pub address: String,
    pub sampled: usize,
    #[source]
    pub source: SampleError,
    pub partial: BucketMap,
}

impl RunError {
    /// A failure before any key was sampled; carries no results.
    pub fn before_sampling(address: impl Into<String>, source: impl Into<SampleError>) -> Self {
        Self {
            address: address.into(),
            sampled: 0,
            source: source.into(),
            partial: BucketMap::new(),
        }
    }

    /// True when the instance could not be reached at all.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self.source,
            SampleError::Store(StoreError::Connect { .. }) | SampleError::Store(StoreError::Timeout(_))
        ) && self.sampled == 0
            && self.partial.is_empty()
    }
}

/// Failures of a multi-instance sampling session.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("no instances to sample")]
    NoInstances,
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("sampling task for {address} did not complete: {source}")]
    Task {
        address: String,
        #[source]
        source: tokio::task::JoinError,
    },
    #[error("all {0} instances failed to sample")]
    AllFailed(usize),
}
