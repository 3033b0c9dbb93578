//! Aggregation policies.
//!
//! An [`Aggregator`] maps a sampled key to zero or more bucket names. The
//! sampler records each observation once in every distinct bucket returned.

use crate::models::ValueType;
use serde::{Deserialize, Serialize};

/// Bucket name used by [`AnyKey`].
pub const ANY_KEY_BUCKET: &str = "any-key";

/// Bucket for keys that carry no prefix delimiter.
pub const NO_PREFIX_BUCKET: &str = "(no prefix)";

/// Chooses the aggregation buckets a sampled key is attributed to.
///
/// Implementations must be pure; one aggregator is shared by every
/// concurrent run.
pub trait Aggregator: Send + Sync {
    fn groups(&self, key: &str, value_type: ValueType) -> Vec<String>;
}

/// Collapses every key into the single [`ANY_KEY_BUCKET`] bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyKey;

impl Aggregator for AnyKey {
    fn groups(&self, _key: &str, _value_type: ValueType) -> Vec<String> {
        vec![ANY_KEY_BUCKET.to_string()]
    }
}

/// Groups keys by their leading `depth` delimiter-separated segments.
///
/// With `:` and depth 1, `user:42:name` lands in `user`.
#[derive(Debug, Clone)]
pub struct KeyPrefix {
    delimiter: String,
    depth: usize,
}

impl KeyPrefix {
    pub fn new(delimiter: impl Into<String>, depth: usize) -> Self {
        Self {
            delimiter: delimiter.into(),
            depth: depth.max(1),
        }
    }
}

impl Aggregator for KeyPrefix {
    fn groups(&self, key: &str, _value_type: ValueType) -> Vec<String> {
        if self.delimiter.is_empty() || !key.contains(self.delimiter.as_str()) {
            return vec![NO_PREFIX_BUCKET.to_string()];
        }

        let segments: Vec<&str> = key.split(self.delimiter.as_str()).collect();
        // The last segment is the key's own name, never part of the prefix.
        let take = self.depth.min(segments.len() - 1);
        vec![segments[..take].join(&self.delimiter)]
    }
}

/// Groups keys by their value type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByType;

impl Aggregator for ByType {
    fn groups(&self, _key: &str, value_type: ValueType) -> Vec<String> {
        vec![value_type.as_str().to_string()]
    }
}

/// Attributes each key to the groups of every inner aggregator, in order.
pub struct Chain(Vec<Box<dyn Aggregator>>);

impl Chain {
    pub fn new(aggregators: Vec<Box<dyn Aggregator>>) -> Self {
        Self(aggregators)
    }
}

impl Aggregator for Chain {
    fn groups(&self, key: &str, value_type: ValueType) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|a| a.groups(key, value_type))
            .collect()
    }
}

/// Adapts a plain function or closure into an [`Aggregator`].
#[derive(Debug, Clone, Copy)]
pub struct AggregatorFn<F>(pub F);

impl<F> Aggregator for AggregatorFn<F>
where
    F: Fn(&str, ValueType) -> Vec<String> + Send + Sync,
{
    fn groups(&self, key: &str, value_type: ValueType) -> Vec<String> {
        (self.0)(key, value_type)
    }
}

/// The groups for one observation with duplicates removed, first-seen order.
pub fn distinct_groups(aggregator: &dyn Aggregator, key: &str, value_type: ValueType) -> Vec<String> {
    let mut groups = aggregator.groups(key, value_type);
    let mut seen = std::collections::HashSet::with_capacity(groups.len());
    groups.retain(|g| seen.insert(g.clone()));
    groups
}

/// Aggregation policies selectable from config and the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AggregatorKind {
    /// Every key in one bucket
    #[default]
    AnyKey,
    /// Bucket by key prefix
    Prefix,
    /// Bucket by value type
    Type,
}

impl AggregatorKind {
    /// Build the configured aggregator.
    pub fn build(self, delimiter: &str, depth: usize) -> Box<dyn Aggregator> {
        match self {
            AggregatorKind::AnyKey => Box::new(AnyKey),
            AggregatorKind::Prefix => Box::new(KeyPrefix::new(delimiter, depth)),
            AggregatorKind::Type => Box::new(ByType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_key_single_bucket() {
        assert_eq!(AnyKey.groups("foo", ValueType::Hash), vec!["any-key"]);
        assert_eq!(AnyKey.groups("", ValueType::String), vec!["any-key"]);
    }

    #[test]
    fn test_key_prefix() {
        let agg = KeyPrefix::new(":", 1);
        assert_eq!(agg.groups("user:42:name", ValueType::String), vec!["user"]);
        assert_eq!(agg.groups("plain", ValueType::String), vec![NO_PREFIX_BUCKET]);

        let deep = KeyPrefix::new(":", 2);
        assert_eq!(deep.groups("user:42:name", ValueType::String), vec!["user:42"]);
        // Depth never swallows the final segment.
        assert_eq!(deep.groups("user:42", ValueType::String), vec!["user"]);
    }

    #[test]
    fn test_by_type() {
        assert_eq!(ByType.groups("k", ValueType::SortedSet), vec!["zset"]);
    }

    #[test]
    fn test_chain_and_distinct_groups() {
        let chain = Chain::new(vec![Box::new(AnyKey), Box::new(ByType), Box::new(AnyKey)]);
        assert_eq!(
            chain.groups("k", ValueType::List),
            vec!["any-key", "list", "any-key"]
        );
        assert_eq!(
            distinct_groups(&chain, "k", ValueType::List),
            vec!["any-key", "list"]
        );
    }

    #[test]
    fn test_aggregator_fn_adapter() {
        let first_letter = AggregatorFn(|key: &str, _vt: ValueType| {
            key.chars().next().map(|c| vec![c.to_string()]).unwrap_or_default()
        });
        assert_eq!(first_letter.groups("apple", ValueType::String), vec!["a"]);
        assert!(first_letter.groups("", ValueType::String).is_empty());
    }

    #[test]
    fn test_aggregator_kind_build() {
        let agg = AggregatorKind::Prefix.build("/", 1);
        assert_eq!(agg.groups("a/b", ValueType::Set), vec!["a"]);
        let agg = AggregatorKind::default().build(":", 1);
        assert_eq!(agg.groups("a:b", ValueType::Set), vec![ANY_KEY_BUCKET]);
    }
}
