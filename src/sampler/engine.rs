//! The sampling run loop.
//!
//! One run owns one connection and one private [`BucketMap`]. It picks a
//! random key, asks for its type, dispatches to the matching type sampler
//! and repeats until the target count is reached. Any failure ends the run
//! immediately; nothing is retried.

use super::progress::Progress;
use super::types::{sample_key, SampledKey};
use crate::analysis::{Aggregator, BucketMap};
use crate::error::{RunError, SampleError};
use crate::models::Options;
use crate::store::commands::{self, into_count, into_status};
use crate::store::{ConnectionSettings, RespConnection, RespValue, StoreConnection};
use tracing::{debug, info};

/// Keys between progress notifications for a run of `num_keys`.
pub fn progress_interval(num_keys: usize) -> usize {
    (num_keys / 100).max(100)
}

/// Ask the store for a random key and its type.
pub async fn random_key<C>(conn: &mut C) -> Result<SampledKey, SampleError>
where
    C: StoreConnection + ?Sized,
{
    let raw = match conn.execute(commands::random_key()).await? {
        RespValue::Bulk(Some(raw)) => raw,
        RespValue::Bulk(None) => return Err(SampleError::EmptyKeyspace),
        other => commands::into_bulk("RANDOMKEY", other)?,
    };
    let reported = into_status("TYPE", conn.execute(commands::type_of(&raw)).await?)?;
    Ok(SampledKey::new(raw, reported))
}

/// Total number of keys in the instance.
pub async fn key_count<C>(conn: &mut C) -> Result<u64, SampleError>
where
    C: StoreConnection + ?Sized,
{
    Ok(into_count("DBSIZE", conn.execute(commands::db_size()).await?)?)
}

/// Connect to the instance described by `options` and sample it.
pub async fn run(
    options: &Options,
    settings: &ConnectionSettings,
    aggregator: &dyn Aggregator,
    progress: &dyn Progress,
) -> Result<BucketMap, RunError> {
    let address = options.address();
    options
        .validate()
        .map_err(|e| RunError::before_sampling(&address, e))?;

    let mut conn = RespConnection::connect(&address, settings)
        .await
        .map_err(|e| RunError::before_sampling(&address, e))?;

    run_with(&mut conn, options, aggregator, progress).await
}

/// Sample `options.num_keys` keys over an already open connection.
///
/// On failure the error carries the buckets accumulated so far; they are
/// provisional and must not be reported.
pub async fn run_with<C>(
    conn: &mut C,
    options: &Options,
    aggregator: &dyn Aggregator,
    progress: &dyn Progress,
) -> Result<BucketMap, RunError>
where
    C: StoreConnection + ?Sized,
{
    let address = options.address();
    options
        .validate()
        .map_err(|e| RunError::before_sampling(&address, e))?;

    let target = options.num_keys;
    let interval = progress_interval(target);
    let mut last_interval = 0;
    let mut stats = BucketMap::new();

    progress.started(&address, target);

    for i in 0..target {
        let outcome = match random_key(conn).await {
            Ok(key) => {
                if i / interval != last_interval {
                    progress.sampled(&address, i, target);
                    last_interval = i / interval;
                }
                sample_key(conn, &key, aggregator, &mut stats).await
            }
            Err(e) => Err(e),
        };

        if let Err(source) = outcome {
            debug!("Run against {} failed at key {}: {}", address, i, source);
            progress.failed(&address, i);
            return Err(RunError {
                address,
                sampled: i,
                source,
                partial: stats,
            });
        }
    }

    progress.finished(&address, target);
    info!(
        "Sampled {} keys from {} into {} buckets",
        target,
        address,
        stats.len()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AggregatorFn, AnyKey, ByType, ANY_KEY_BUCKET};
    use crate::error::StoreError;
    use crate::models::ValueType;
    use crate::sampler::progress::Silent;
    use crate::store::memory::{MemValue, MemoryStore};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sampled: Mutex<Vec<usize>>,
        finished: Mutex<Option<usize>>,
        failed: Mutex<Option<usize>>,
    }

    impl Progress for Recorder {
        fn sampled(&self, _address: &str, sampled: usize, _target: usize) {
            self.sampled.lock().unwrap().push(sampled);
        }

        fn finished(&self, _address: &str, sampled: usize) {
            *self.finished.lock().unwrap() = Some(sampled);
        }

        fn failed(&self, _address: &str, sampled: usize) {
            *self.failed.lock().unwrap() = Some(sampled);
        }
    }

    fn mixed_store() -> MemoryStore {
        MemoryStore::new()
            .string("user:1:name", "ada")
            .list("queue:mail", &["m1", "m2"])
            .set("tags:1", &["a", "b", "c"])
            .zset("board", &["p1"])
            .hash("user:1", &[("email", "ada@x.io")])
            .script(&["user:1:name", "queue:mail", "tags:1", "board", "user:1"])
    }

    #[test]
    fn test_progress_interval() {
        assert_eq!(progress_interval(1), 100);
        assert_eq!(progress_interval(250), 100);
        assert_eq!(progress_interval(10_000), 100);
        assert_eq!(progress_interval(25_000), 250);
    }

    #[tokio::test]
    async fn test_any_key_run_collects_every_observation() {
        let mut store = mixed_store();
        let options = Options::new("localhost", 6379, 25);

        let stats = run_with(&mut store, &options, &AnyKey, &Silent).await.unwrap();

        assert_eq!(stats.len(), 1);
        let bucket = &stats[ANY_KEY_BUCKET];
        assert_eq!(bucket.total(), 25);
        for vt in ValueType::SAMPLED {
            assert_eq!(bucket.count(vt), 5);
        }
        assert!(bucket.name.is_empty());
    }

    #[tokio::test]
    async fn test_type_count_invariant_with_fan_out() {
        let mut store = mixed_store();
        let options = Options::new("localhost", 6379, 10);
        let both = AggregatorFn(|key: &str, vt: ValueType| {
            vec![vt.as_str().to_string(), key.split(':').next().unwrap_or("").to_string()]
        });

        let stats = run_with(&mut store, &options, &both, &Silent).await.unwrap();

        let observations: u64 = stats.values().map(|r| r.total()).sum();
        assert_eq!(observations, 20);
    }

    #[tokio::test]
    async fn test_progress_cadence() {
        let mut store = MemoryStore::new().string("k", "v").script(&["k"]);
        let options = Options::new("localhost", 6379, 250);
        let progress = Recorder::default();

        run_with(&mut store, &options, &AnyKey, &progress).await.unwrap();

        assert_eq!(*progress.sampled.lock().unwrap(), vec![100, 200]);
        assert_eq!(*progress.finished.lock().unwrap(), Some(250));
        assert_eq!(*progress.failed.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_type_aborts_with_partial_results() {
        let mut store = MemoryStore::new()
            .string("a", "1")
            .list("b", &["x"])
            .with("events", MemValue::Other("stream"))
            .string("never", "reached")
            .script(&["a", "b", "events", "never"]);
        let options = Options::new("localhost", 6379, 100);

        let err = run_with(&mut store, &options, &ByType, &Silent)
            .await
            .unwrap_err();

        assert_eq!(err.sampled, 2);
        assert!(matches!(err.source, SampleError::UnknownType { ref key, .. } if key == "events"));
        let mut buckets: Vec<_> = err.partial.keys().cloned().collect();
        buckets.sort();
        assert_eq!(buckets, vec!["list", "string"]);
        assert_eq!(store.commands_issued("RANDOMKEY"), 3);
    }

    #[tokio::test]
    async fn test_vanished_key_is_unknown_type() {
        let mut store = MemoryStore::new().script(&["gone"]);
        let options = Options::new("localhost", 6379, 1);

        let err = run_with(&mut store, &options, &AnyKey, &Silent)
            .await
            .unwrap_err();

        assert!(matches!(err.source, SampleError::UnknownType { ref reported, .. } if reported == "none"));
        assert!(err.partial.is_empty());
    }

    #[tokio::test]
    async fn test_empty_keyspace() {
        let mut store = MemoryStore::new();
        let options = Options::new("localhost", 6379, 5);
        let progress = Recorder::default();

        let err = run_with(&mut store, &options, &AnyKey, &progress)
            .await
            .unwrap_err();

        assert!(matches!(err.source, SampleError::EmptyKeyspace));
        assert_eq!(*progress.failed.lock().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_store_error_mid_run() {
        let mut store = MemoryStore::new()
            .string("s", "v")
            .hash("h", &[("f", "v")])
            .script(&["s", "h"])
            .fail_on("HKEYS");
        let options = Options::new("localhost", 6379, 10);

        let err = run_with(&mut store, &options, &AnyKey, &Silent)
            .await
            .unwrap_err();

        assert_eq!(err.sampled, 1);
        assert!(matches!(err.source, SampleError::Store(StoreError::Server(_))));
        assert_eq!(err.partial[ANY_KEY_BUCKET].count(ValueType::String), 1);
        assert_eq!(err.partial[ANY_KEY_BUCKET].count(ValueType::Hash), 0);
    }

    #[tokio::test]
    async fn test_zero_keys_rejected() {
        let mut store = mixed_store();
        let options = Options::new("localhost", 6379, 0);

        let err = run_with(&mut store, &options, &AnyKey, &Silent)
            .await
            .unwrap_err();

        assert!(matches!(err.source, SampleError::InvalidOptions(_)));
        assert!(store.round_trips.is_empty());
    }

    #[tokio::test]
    async fn test_key_count() {
        let mut store = mixed_store();
        assert_eq!(key_count(&mut store).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_run_connection_failure_has_no_results() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let options = Options::new("127.0.0.1", port, 10);
        let err = run(&options, &ConnectionSettings::default(), &AnyKey, &Silent)
            .await
            .unwrap_err();

        assert!(err.is_connect_failure());
        assert!(err.partial.is_empty());
    }
}
