//! Per-bucket statistics accumulator.
//!
//! A [`Results`] is created lazily the first time a bucket receives an
//! observation, mutated in place by every later observation, and combined
//! with the results of other runs through [`Results::merge`].

use super::stats::{Frequencies, SizeStats};
use crate::models::ValueType;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Bucket name -> accumulated statistics for one sampling run.
pub type BucketMap = HashMap<String, Results>;

/// Statistics for sampled string keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringStats {
    pub observed: u64,
    pub keys: Frequencies,
    pub key_lengths: SizeStats,
    pub value_sizes: SizeStats,
    pub values: Frequencies,
}

impl StringStats {
    fn merge(&mut self, other: &StringStats) {
        self.observed += other.observed;
        self.keys.merge(&other.keys);
        self.key_lengths.merge(&other.key_lengths);
        self.value_sizes.merge(&other.value_sizes);
        self.values.merge(&other.values);
    }
}

/// Statistics for sampled lists, sets and sorted sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub observed: u64,
    pub keys: Frequencies,
    pub key_lengths: SizeStats,
    pub cardinality: SizeStats,
    pub member_sizes: SizeStats,
    pub members: Frequencies,
}

impl CollectionStats {
    fn observe(&mut self, key: &str, cardinality: u64, member: Option<&[u8]>) {
        self.observed += 1;
        self.keys.observe(key.as_bytes());
        self.key_lengths.observe(key.len() as u64);
        self.cardinality.observe(cardinality);
        if let Some(member) = member {
            self.member_sizes.observe(member.len() as u64);
            self.members.observe(member);
        }
    }

    fn merge(&mut self, other: &CollectionStats) {
        self.observed += other.observed;
        self.keys.merge(&other.keys);
        self.key_lengths.merge(&other.key_lengths);
        self.cardinality.merge(&other.cardinality);
        self.member_sizes.merge(&other.member_sizes);
        self.members.merge(&other.members);
    }
}

/// Statistics for sampled hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashStats {
    pub observed: u64,
    pub keys: Frequencies,
    pub key_lengths: SizeStats,
    pub field_counts: SizeStats,
    pub field_sizes: SizeStats,
    pub value_sizes: SizeStats,
    pub fields: Frequencies,
    pub values: Frequencies,
}

impl HashStats {
    fn merge(&mut self, other: &HashStats) {
        self.observed += other.observed;
        self.keys.merge(&other.keys);
        self.key_lengths.merge(&other.key_lengths);
        self.field_counts.merge(&other.field_counts);
        self.field_sizes.merge(&other.field_sizes);
        self.value_sizes.merge(&other.value_sizes);
        self.fields.merge(&other.fields);
        self.values.merge(&other.values);
    }
}

/// Summary statistics for one aggregation bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Results {
    /// Bucket label, assigned by the caller once sampling is done.
    pub name: String,
    pub strings: StringStats,
    pub lists: CollectionStats,
    pub sets: CollectionStats,
    pub sorted_sets: CollectionStats,
    pub hashes: HashStats,
}

impl Results {
    /// An empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty accumulator with a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn observe_string(&mut self, key: &str, value: &[u8]) {
        let s = &mut self.strings;
        s.observed += 1;
        s.keys.observe(key.as_bytes());
        s.key_lengths.observe(key.len() as u64);
        s.value_sizes.observe(value.len() as u64);
        s.values.observe(value);
    }

    /// `first` is `None` for an empty list.
    pub fn observe_list(&mut self, key: &str, length: u64, first: Option<&[u8]>) {
        self.lists.observe(key, length, first);
    }

    /// `member` is `None` for an empty set.
    pub fn observe_set(&mut self, key: &str, cardinality: u64, member: Option<&[u8]>) {
        self.sets.observe(key, cardinality, member);
    }

    /// `first` is `None` for an empty sorted set.
    pub fn observe_sorted_set(&mut self, key: &str, cardinality: u64, first: Option<&[u8]>) {
        self.sorted_sets.observe(key, cardinality, first);
    }

    /// `sample` is the `(field, value)` pair inspected, `None` for an empty hash.
    pub fn observe_hash(&mut self, key: &str, field_count: u64, sample: Option<(&[u8], &[u8])>) {
        let h = &mut self.hashes;
        h.observed += 1;
        h.keys.observe(key.as_bytes());
        h.key_lengths.observe(key.len() as u64);
        h.field_counts.observe(field_count);
        if let Some((field, value)) = sample {
            h.field_sizes.observe(field.len() as u64);
            h.value_sizes.observe(value.len() as u64);
            h.fields.observe(field);
            h.values.observe(value);
        }
    }

    /// Fold `other` into `self`, taking ownership of it.
    ///
    /// The receiver keeps its name unless it has none.
    pub fn merge(&mut self, other: Results) {
        if self.name.is_empty() {
            self.name = other.name;
        }
        self.strings.merge(&other.strings);
        self.lists.merge(&other.lists);
        self.sets.merge(&other.sets);
        self.sorted_sets.merge(&other.sorted_sets);
        self.hashes.merge(&other.hashes);
    }

    /// Number of observations recorded for `value_type`.
    pub fn count(&self, value_type: ValueType) -> u64 {
        match value_type {
            ValueType::String => self.strings.observed,
            ValueType::List => self.lists.observed,
            ValueType::Set => self.sets.observed,
            ValueType::SortedSet => self.sorted_sets.observed,
            ValueType::Hash => self.hashes.observed,
            ValueType::Unknown => 0,
        }
    }

    /// Total observations across every type.
    pub fn total(&self) -> u64 {
        ValueType::SAMPLED.iter().map(|vt| self.count(*vt)).sum()
    }

    /// Collection statistics for list-like types.
    pub fn collection(&self, value_type: ValueType) -> Option<&CollectionStats> {
        match value_type {
            ValueType::List => Some(&self.lists),
            ValueType::Set => Some(&self.sets),
            ValueType::SortedSet => Some(&self.sorted_sets),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Returns the accumulator for `group`, inserting an empty one if missing.
pub fn ensure_entry<'a>(map: &'a mut BucketMap, group: &str) -> &'a mut Results {
    map.entry(group.to_string()).or_default()
}

/// Merge every bucket of one run's map into `totals`.
pub fn merge_bucket_maps(totals: &mut BucketMap, run: BucketMap) {
    for (bucket, results) in run {
        match totals.entry(bucket) {
            Entry::Occupied(mut existing) => existing.get_mut().merge(results),
            Entry::Vacant(slot) => {
                slot.insert(results);
            }
        }
    }
}

/// Name every bucket after its key and return them sorted by name.
pub fn into_named(map: BucketMap) -> Vec<Results> {
    let mut named: Vec<Results> = map
        .into_iter()
        .map(|(bucket, mut results)| {
            results.name = bucket;
            results
        })
        .collect();
    named.sort_by(|a, b| a.name.cmp(&b.name));
    named
}
