//! Aggregation policies and the statistics they feed.

pub mod aggregator;
pub mod results;
pub mod stats;

pub use aggregator::{
    distinct_groups, Aggregator, AggregatorFn, AggregatorKind, AnyKey, ByType, Chain, KeyPrefix,
    ANY_KEY_BUCKET,
};
pub use results::{ensure_entry, into_named, merge_bucket_maps, BucketMap, Results};
pub use stats::{Frequencies, SizeStats};
