//! Mergeable summary statistics.
//!
//! Everything here is integer-valued so that merging partial results is
//! exactly commutative and associative.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest label kept by [`Frequencies`], in characters.
pub const MAX_LABEL_CHARS: usize = 64;

/// Running size distribution: count, sum, min, max and a power-of-two
/// histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeStats {
    count: u64,
    sum: u64,
    min: Option<u64>,
    max: Option<u64>,
    /// Bucket exponent `b` -> number of sizes `s` with `2^(b-1) < s <= 2^b`.
    histogram: BTreeMap<u32, u64>,
}

impl SizeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one size sample.
    pub fn observe(&mut self, size: u64) {
        self.count += 1;
        self.sum = self.sum.saturating_add(size);
        self.min = Some(self.min.map_or(size, |m| m.min(size)));
        self.max = Some(self.max.map_or(size, |m| m.max(size)));
        *self.histogram.entry(power_of_two_bucket(size)).or_insert(0) += 1;
    }

    /// Fold `other` into this distribution.
    pub fn merge(&mut self, other: &SizeStats) {
        self.count += other.count;
        self.sum = self.sum.saturating_add(other.sum);
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        for (bucket, n) in &other.histogram {
            *self.histogram.entry(*bucket).or_insert(0) += n;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> u64 {
        self.sum
    }

    pub fn min(&self) -> Option<u64> {
        self.min
    }

    pub fn max(&self) -> Option<u64> {
        self.max
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean, or `None` when nothing was observed.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum as f64 / self.count as f64)
        }
    }

    /// Histogram rows as `(upper_bound, count)`, smallest bucket first.
    pub fn histogram(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.histogram
            .iter()
            .map(|(b, n)| (1u64.checked_shl(*b).unwrap_or(u64::MAX), *n))
    }
}

/// Index of the smallest power of two that is `>= size`.
///
/// Sizes 0 and 1 share bucket 0.
pub fn power_of_two_bucket(size: u64) -> u32 {
    if size <= 1 {
        0
    } else {
        64 - (size - 1).leading_zeros()
    }
}

/// Occurrence counts of sampled labels (key names, members, values).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frequencies(BTreeMap<String, u64>);

impl Frequencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `raw`, decoded lossily and truncated.
    pub fn observe(&mut self, raw: &[u8]) {
        *self.0.entry(sample_label(raw)).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &Frequencies) {
        for (label, n) in &other.0 {
            *self.0.entry(label.clone()).or_insert(0) += n;
        }
    }

    /// Number of distinct labels seen.
    pub fn distinct(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, label: &str) -> u64 {
        self.0.get(label).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `n` most frequent labels, ties broken alphabetically.
    pub fn top(&self, n: usize) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self.0.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries.truncate(n);
        entries
    }
}

/// Printable, bounded rendition of a sampled byte string.
pub fn sample_label(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.chars().count() <= MAX_LABEL_CHARS {
        return text.into_owned();
    }
    let mut label: String = text.chars().take(MAX_LABEL_CHARS).collect();
    label.push('…');
    label
}
