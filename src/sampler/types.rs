//! Per-type samplers.
//!
//! Each sampler issues the smallest set of commands that characterizes one
//! key of its type, pipelined into a single round trip where possible, and
//! records the observation in every bucket the aggregator selects.
//!
//! Lists, sorted sets and hashes always inspect their *first* element or
//! field rather than a random one, so member statistics describe the head
//! of each collection. Sets use `SRANDMEMBER`.

use crate::analysis::{distinct_groups, ensure_entry, Aggregator, BucketMap};
use crate::error::{SampleError, StoreError};
use crate::models::ValueType;
use crate::store::commands::{self, into_bulk, into_bulk_list, into_count, into_optional_bulk};
use crate::store::{RespValue, StoreConnection};
use bytes::Bytes;
use tracing::debug;

/// A randomly selected key and the type the store reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledKey {
    /// Key bytes exactly as stored.
    pub raw: Bytes,
    /// Lossy UTF-8 rendition handed to aggregators and statistics.
    pub name: String,
    /// The raw `TYPE` reply.
    pub reported: String,
    pub value_type: ValueType,
}

impl SampledKey {
    pub fn new(raw: Bytes, reported: impl Into<String>) -> Self {
        let reported = reported.into();
        Self {
            name: String::from_utf8_lossy(&raw).into_owned(),
            value_type: ValueType::from_type_reply(&reported),
            raw,
            reported,
        }
    }
}

/// Dispatch `key` to the sampler for its type.
///
/// An unrecognized type is fatal for the run.
pub async fn sample_key<C>(
    conn: &mut C,
    key: &SampledKey,
    aggregator: &dyn Aggregator,
    stats: &mut BucketMap,
) -> Result<(), SampleError>
where
    C: StoreConnection + ?Sized,
{
    debug!("Sampling {} key {:?}", key.reported, key.name);
    match key.value_type {
        ValueType::String => sample_string(conn, key, aggregator, stats).await,
        ValueType::List => sample_list(conn, key, aggregator, stats).await,
        ValueType::Set => sample_set(conn, key, aggregator, stats).await,
        ValueType::SortedSet => sample_sorted_set(conn, key, aggregator, stats).await,
        ValueType::Hash => sample_hash(conn, key, aggregator, stats).await,
        ValueType::Unknown => Err(SampleError::UnknownType {
            key: key.name.clone(),
            reported: key.reported.clone(),
        }),
    }
}

pub async fn sample_string<C>(
    conn: &mut C,
    key: &SampledKey,
    aggregator: &dyn Aggregator,
    stats: &mut BucketMap,
) -> Result<(), SampleError>
where
    C: StoreConnection + ?Sized,
{
    let value = into_bulk("GET", conn.execute(commands::get(&key.raw)).await?)?;

    for group in distinct_groups(aggregator, &key.name, ValueType::String) {
        ensure_entry(stats, &group).observe_string(&key.name, &value);
    }
    Ok(())
}

pub async fn sample_list<C>(
    conn: &mut C,
    key: &SampledKey,
    aggregator: &dyn Aggregator,
    stats: &mut BucketMap,
) -> Result<(), SampleError>
where
    C: StoreConnection + ?Sized,
{
    let replies = conn
        .pipeline(vec![commands::llen(&key.raw), commands::lrange(&key.raw, 0, 0)])
        .await?;
    let (len, head) = two_replies("LLEN/LRANGE", replies)?;
    let length = into_count("LLEN", len)?;
    let head = into_bulk_list("LRANGE", head)?;
    let first = head.first().map(|m| &m[..]);

    for group in distinct_groups(aggregator, &key.name, ValueType::List) {
        ensure_entry(stats, &group).observe_list(&key.name, length, first);
    }
    Ok(())
}

pub async fn sample_set<C>(
    conn: &mut C,
    key: &SampledKey,
    aggregator: &dyn Aggregator,
    stats: &mut BucketMap,
) -> Result<(), SampleError>
where
    C: StoreConnection + ?Sized,
{
    let replies = conn
        .pipeline(vec![commands::scard(&key.raw), commands::srandmember(&key.raw)])
        .await?;
    let (card, member) = two_replies("SCARD/SRANDMEMBER", replies)?;
    let cardinality = into_count("SCARD", card)?;
    let member = into_optional_bulk("SRANDMEMBER", member)?;

    for group in distinct_groups(aggregator, &key.name, ValueType::Set) {
        ensure_entry(stats, &group).observe_set(&key.name, cardinality, member.as_deref());
    }
    Ok(())
}

pub async fn sample_sorted_set<C>(
    conn: &mut C,
    key: &SampledKey,
    aggregator: &dyn Aggregator,
    stats: &mut BucketMap,
) -> Result<(), SampleError>
where
    C: StoreConnection + ?Sized,
{
    let replies = conn
        .pipeline(vec![commands::zcard(&key.raw), commands::zrange(&key.raw, 0, 0)])
        .await?;
    let (card, head) = two_replies("ZCARD/ZRANGE", replies)?;
    let cardinality = into_count("ZCARD", card)?;
    let head = into_bulk_list("ZRANGE", head)?;
    let first = head.first().map(|m| &m[..]);

    for group in distinct_groups(aggregator, &key.name, ValueType::SortedSet) {
        ensure_entry(stats, &group).observe_sorted_set(&key.name, cardinality, first);
    }
    Ok(())
}

/// Field count and field names in one round trip, then the value of the
/// first field in a second. The second trip is skipped when no bucket
/// wants the observation.
pub async fn sample_hash<C>(
    conn: &mut C,
    key: &SampledKey,
    aggregator: &dyn Aggregator,
    stats: &mut BucketMap,
) -> Result<(), SampleError>
where
    C: StoreConnection + ?Sized,
{
    let replies = conn
        .pipeline(vec![commands::hlen(&key.raw), commands::hkeys(&key.raw)])
        .await?;
    let (len, fields) = two_replies("HLEN/HKEYS", replies)?;
    let field_count = into_count("HLEN", len)?;
    let fields = into_bulk_list("HKEYS", fields)?;

    let groups = distinct_groups(aggregator, &key.name, ValueType::Hash);
    if groups.is_empty() {
        return Ok(());
    }

    let sample = match fields.into_iter().next() {
        Some(field) => {
            let value = into_bulk("HGET", conn.execute(commands::hget(&key.raw, &field)).await?)?;
            Some((field, value))
        }
        None => None,
    };
    let sample = sample.as_ref().map(|(f, v)| (&f[..], &v[..]));

    for group in groups {
        ensure_entry(stats, &group).observe_hash(&key.name, field_count, sample);
    }
    Ok(())
}

fn two_replies(what: &str, replies: Vec<RespValue>) -> Result<(RespValue, RespValue), StoreError> {
    let got = replies.len();
    let mut replies = replies.into_iter();
    match (replies.next(), replies.next(), replies.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(StoreError::Protocol(format!(
            "expected 2 replies to {}, got {}",
            what, got
        ))),
    }
}
