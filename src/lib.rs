//! Reckon - keyspace sampling for Redis-compatible stores.
//!
//! Picks random keys from one or more instances, groups them with an
//! [`analysis::Aggregator`] and accumulates per-type size and frequency
//! statistics that can be merged across runs.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod report;
pub mod sampler;
pub mod store;

pub use analysis::{Aggregator, AggregatorFn, BucketMap, Results};
pub use error::{FleetError, RunError, SampleError, StoreError};
pub use models::{Options, ValueType};
pub use sampler::run;
