//! Sparse fuzzy-duration histograms kept per page group.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use crate::ReqprofResult;

/// Coarsen a duration (milliseconds) to one significant figure.
///
/// Values below 10 are kept as-is; everything else rounds to the nearest
/// multiple of its leading power of ten (14 -> 10, 15 -> 20, 94 -> 90,
/// 950 -> 1000). Buckets stay sparse no matter how wide the value range is.
pub fn fuzzy_bucket(duration: u64) -> u64 {
    let mut unit = 1u64;
    while duration / unit >= 10 {
        unit = unit.saturating_mul(10);
    }
    duration.saturating_add(unit / 2) / unit * unit
}

/// Occurrence counts keyed by fuzzy duration bucket.
///
/// Merging is a point-wise sum over the union of keys, so folding samples in
/// any order or batch size produces the same histogram. The empty histogram
/// is the merge identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurationHistogram {
    counts: BTreeMap<u64, u64>,
}

impl DurationHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one sample with the given raw duration.
    pub fn record(&mut self, duration: u64) {
        let slot = self.counts.entry(fuzzy_bucket(duration)).or_insert(0);
        *slot = slot.saturating_add(1);
    }

    pub fn merge(&mut self, other: &DurationHistogram) {
        for (bucket, count) in &other.counts {
            let slot = self.counts.entry(*bucket).or_insert(0);
            *slot = slot.saturating_add(*count);
        }
    }

    pub fn get(&self, bucket: u64) -> u64 {
        self.counts.get(&bucket).copied().unwrap_or(0)
    }

    /// Total occurrences across all buckets.
    pub fn total(&self) -> u64 {
        self.counts.values().fold(0, |acc, c| acc.saturating_add(*c))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.counts.iter().map(|(b, c)| (*b, *c))
    }

    pub fn encode(&self) -> ReqprofResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored payload. An empty payload is a valid empty histogram;
    /// a corrupt one degrades to empty with a warning, since losing trend
    /// counts must not fail the surrounding operation.
    pub fn decode(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(raw) {
            Ok(h) => h,
            Err(err) => {
                tracing::warn!("discarding corrupt duration histogram payload: {err}");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram(durations: &[u64]) -> DurationHistogram {
        let mut h = DurationHistogram::new();
        for d in durations {
            h.record(*d);
        }
        h
    }

    #[test]
    fn fuzzy_bucket_rounds_to_one_significant_figure() {
        assert_eq!(fuzzy_bucket(0), 0);
        assert_eq!(fuzzy_bucket(7), 7);
        assert_eq!(fuzzy_bucket(14), 10);
        assert_eq!(fuzzy_bucket(15), 20);
        assert_eq!(fuzzy_bucket(94), 90);
        assert_eq!(fuzzy_bucket(95), 100);
        assert_eq!(fuzzy_bucket(1_234), 1_000);
        assert_eq!(fuzzy_bucket(8_700), 9_000);
    }

    #[test]
    fn merge_is_commutative() {
        let a = histogram(&[10, 20, 20]);
        let b = histogram(&[20, 300]);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn merge_is_associative() {
        let a = histogram(&[10]);
        let b = histogram(&[10, 40]);
        let c = histogram(&[40, 700]);

        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut right = a.clone();
        right.merge(&bc);

        assert_eq!(left, right);
    }

    #[test]
    fn empty_is_the_merge_identity() {
        let a = histogram(&[10, 20, 30]);
        let mut merged = a.clone();
        merged.merge(&DurationHistogram::new());
        assert_eq!(merged, a);
    }

    #[test]
    fn encode_decode_round_trips() {
        let a = histogram(&[10, 20, 20, 5_000]);
        let encoded = a.encode().expect("encode");
        assert_eq!(DurationHistogram::decode(&encoded), a);
    }

    #[test]
    fn empty_payload_decodes_to_empty() {
        assert!(DurationHistogram::decode("").is_empty());
        assert!(DurationHistogram::decode("   ").is_empty());
    }

    #[test]
    fn corrupt_payload_decodes_to_empty() {
        assert!(DurationHistogram::decode("{not json").is_empty());
        assert!(DurationHistogram::decode("[1, 2, 3]").is_empty());
    }

    #[test]
    fn totals_sum_all_buckets() {
        let h = histogram(&[10, 20, 20, 20]);
        assert_eq!(h.total(), 4);
        assert_eq!(h.get(20), 3);
        assert_eq!(h.get(99), 0);
    }
}
