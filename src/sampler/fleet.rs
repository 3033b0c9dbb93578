//! Sampling several instances at once.
//!
//! Every instance is sampled by its own task with its own connection and
//! bucket map. Finished maps are merged one at a time into the session
//! totals as the tasks complete, so accumulators are never shared.

use super::engine::{key_count, run_with};
use super::progress::Progress;
use crate::analysis::{merge_bucket_maps, Aggregator, BucketMap};
use crate::error::{FleetError, RunError};
use crate::models::Options;
use crate::store::{ConnectionSettings, RespConnection, StoreConnection};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// What to do when one instance fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the whole session on the first failure
    #[default]
    Abort,
    /// Drop the failed instance and keep going
    Skip,
}

/// The completed sample of one instance.
#[derive(Debug)]
pub struct InstanceSample {
    pub address: String,
    pub buckets: BucketMap,
    /// Keys in the instance when sampling started.
    pub key_count: u64,
    pub sampled: usize,
}

/// An instance dropped under [`FailurePolicy::Skip`].
#[derive(Debug, Clone)]
pub struct InstanceFailure {
    pub address: String,
    pub reason: String,
}

/// Merged outcome of a multi-instance session.
#[derive(Debug, Default)]
pub struct FleetSummary {
    pub totals: BucketMap,
    /// Sum of the instances' key counts.
    pub key_count: u64,
    /// Keys sampled across all successful instances.
    pub sampled: usize,
    /// Addresses that contributed to the totals, sorted.
    pub instances: Vec<String>,
    pub failures: Vec<InstanceFailure>,
}

impl FleetSummary {
    /// Fold one instance's sample into the totals.
    pub fn absorb(&mut self, sample: InstanceSample) {
        self.key_count += sample.key_count;
        self.sampled += sample.sampled;
        self.instances.push(sample.address);
        merge_bucket_maps(&mut self.totals, sample.buckets);
    }
}

/// Count the instance's keys, then sample it over `conn`.
pub async fn sample_connected<C>(
    conn: &mut C,
    options: &Options,
    aggregator: &dyn Aggregator,
    progress: &dyn Progress,
) -> Result<InstanceSample, RunError>
where
    C: StoreConnection + ?Sized,
{
    let address = options.address();
    let key_count = key_count(conn)
        .await
        .map_err(|e| RunError::before_sampling(&address, e))?;
    let buckets = run_with(conn, options, aggregator, progress).await?;

    Ok(InstanceSample {
        address,
        buckets,
        key_count,
        sampled: options.num_keys,
    })
}

/// Connect to one instance and sample it.
pub async fn sample_instance(
    options: &Options,
    settings: &ConnectionSettings,
    aggregator: &dyn Aggregator,
    progress: &dyn Progress,
) -> Result<InstanceSample, RunError> {
    let address = options.address();
    options
        .validate()
        .map_err(|e| RunError::before_sampling(&address, e))?;

    let mut conn = RespConnection::connect(&address, settings)
        .await
        .map_err(|e| RunError::before_sampling(&address, e))?;

    sample_connected(&mut conn, options, aggregator, progress).await
}

/// Sample every instance concurrently and merge the results.
pub async fn sample_fleet(
    instances: Vec<Options>,
    settings: ConnectionSettings,
    aggregator: Arc<dyn Aggregator>,
    progress: Arc<dyn Progress>,
    policy: FailurePolicy,
) -> Result<FleetSummary, FleetError> {
    if instances.is_empty() {
        return Err(FleetError::NoInstances);
    }

    // One task per address: progress is keyed by it and DBSIZE is summed per task.
    let mut seen = HashSet::new();
    let instances: Vec<Options> = instances
        .into_iter()
        .filter(|options| {
            let fresh = seen.insert(options.address());
            if !fresh {
                warn!("Skipping duplicate instance {}", options.address());
            }
            fresh
        })
        .collect();
    let total = instances.len();

    let mut tasks = FuturesUnordered::new();
    let mut abort_handles = Vec::with_capacity(total);

    for options in instances {
        let address = options.address();
        let aggregator = Arc::clone(&aggregator);
        let progress = Arc::clone(&progress);

        let handle = tokio::spawn(async move {
            sample_instance(&options, &settings, aggregator.as_ref(), progress.as_ref()).await
        });
        abort_handles.push(handle.abort_handle());
        tasks.push(async move { (address, handle.await) });
    }

    let mut summary = FleetSummary::default();

    while let Some((address, joined)) = tasks.next().await {
        let failure = match joined {
            Ok(Ok(sample)) => {
                info!(
                    "Got results back from {} ({} keys in instance)",
                    address, sample.key_count
                );
                summary.absorb(sample);
                continue;
            }
            Ok(Err(err)) => {
                if policy == FailurePolicy::Abort {
                    abort_handles.iter().for_each(|h| h.abort());
                    return Err(FleetError::Run(err));
                }
                // Partial results of a failed run are discarded.
                err.to_string()
            }
            Err(source) => {
                if policy == FailurePolicy::Abort {
                    abort_handles.iter().for_each(|h| h.abort());
                    return Err(FleetError::Task { address, source });
                }
                format!("sampling task did not complete: {}", source)
            }
        };

        warn!("Skipping {}: {}", address, failure);
        summary.failures.push(InstanceFailure {
            address,
            reason: failure,
        });
    }

    if summary.instances.is_empty() {
        return Err(FleetError::AllFailed(total));
    }

    summary.instances.sort();
    summary.failures.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(summary)
}
