use std::sync::RwLock;

use dashmap::DashMap;
use recordlayer_tuple::{encode_tuple, Value};

/// One equidepth bucket: `lo`/`hi` bound the bucket's values (byte-encoded,
/// order-preserving), `frequency` is the row count it covers, and
/// `distinct_values` estimates the number of distinct values inside it.
#[derive(Debug, Clone)]
pub struct HistogramBucket {
    pub lo: Vec<u8>,
    pub hi: Vec<u8>,
    pub frequency: u64,
    pub distinct_values: u64,
}

/// Equidepth histogram over an index's leading column, capped at
/// `bucketCount` buckets (`spec.md` §4.6 step 4). The last bucket's upper
/// bound is treated as inclusive so a query for the maximum value still
/// selects it.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
}

impl Histogram {
    /// Builds an equidepth histogram from a sorted sample of encoded
    /// values, splitting them into at most `bucket_count` buckets of equal
    /// row count.
    pub fn from_sorted_samples(mut samples: Vec<Value>, bucket_count: usize) -> Self {
        samples.sort_by(|a, b| encode_tuple(std::slice::from_ref(a)).cmp(&encode_tuple(std::slice::from_ref(b))));
        if samples.is_empty() || bucket_count == 0 {
            return Self::default();
        }
        let chunk_size = (samples.len() + bucket_count - 1) / bucket_count;
        let mut buckets = Vec::new();
        for chunk in samples.chunks(chunk_size.max(1)) {
            let lo = encode_tuple(std::slice::from_ref(&chunk[0]));
            let hi = encode_tuple(std::slice::from_ref(&chunk[chunk.len() - 1]));
            let mut distinct: Vec<Vec<u8>> = chunk.iter().map(|v| encode_tuple(std::slice::from_ref(v))).collect();
            distinct.sort();
            distinct.dedup();
            buckets.push(HistogramBucket { lo, hi, frequency: chunk.len() as u64, distinct_values: distinct.len() as u64 });
        }
        Self { buckets }
    }

    pub fn is_empty(&self) -> bool { self.buckets.is_empty() }

    pub fn total_frequency(&self) -> u64 { self.buckets.iter().map(|b| b.frequency).sum() }

    /// Fraction of rows estimated to equal `value`, using the bucket's
    /// average per-distinct-value frequency.
    pub fn equality_selectivity(&self, value: &Value) -> Option<f64> {
        let total = self.total_frequency();
        if total == 0 {
            return None;
        }
        let key = encode_tuple(std::slice::from_ref(value));
        let bucket = self.bucket_containing(&key)?;
        let per_value = bucket.frequency as f64 / bucket.distinct_values.max(1) as f64;
        Some((per_value / total as f64).min(1.0))
    }

    /// Fraction of rows estimated to fall in `[lo, hi)` (or `[lo, hi]` when
    /// `hi` lands in the last bucket, which is treated as inclusive).
    pub fn range_selectivity(&self, lo: Option<&Value>, hi: Option<&Value>) -> Option<f64> {
        let total = self.total_frequency();
        if total == 0 {
            return None;
        }
        let lo_key = lo.map(|v| encode_tuple(std::slice::from_ref(v)));
        let hi_key = hi.map(|v| encode_tuple(std::slice::from_ref(v)));
        let last_index = self.buckets.len() - 1;
        let mut covered = 0u64;
        for (i, bucket) in self.buckets.iter().enumerate() {
            let below = lo_key.as_ref().is_some_and(|lo| &bucket.hi < lo);
            let inclusive_upper = i == last_index;
            let above = hi_key.as_ref().is_some_and(|hi| if inclusive_upper { &bucket.lo > hi } else { &bucket.lo >= hi });
            if !below && !above {
                covered += bucket.frequency;
            }
        }
        Some((covered as f64 / total as f64).min(1.0))
    }

    fn bucket_containing(&self, key: &[u8]) -> Option<&HistogramBucket> {
        let last_index = self.buckets.len() - 1;
        self.buckets.iter().enumerate().find(|(i, b)| b.lo.as_slice() <= key && (key <= b.hi.as_slice() || *i == last_index)).map(|(_, b)| b)
    }
}

/// `spec.md` §4.6's `(rowCount, avgRowSize, sampleRate, timestamp)` table
/// statistics. `timestamp` is caller-supplied (this crate never calls
/// `Date.now()`/`SystemTime::now()` itself) so staleness checks stay
/// deterministic and testable.
#[derive(Debug, Clone, Copy)]
pub struct TableStats {
    pub row_count: u64,
    pub avg_row_size: u64,
    pub sample_rate: f64,
    pub collected_at_epoch_secs: u64,
}

const HEURISTIC_EQUALITY_SELECTIVITY: f64 = 0.1;
const HEURISTIC_RANGE_SELECTIVITY: f64 = 0.3;

/// Holds per-record-type table statistics and per-index histograms,
/// falling back to the heuristic constants when either is absent
/// (`spec.md` §4.6: "Missing stats -> heuristic constants").
#[derive(Default)]
pub struct StatisticsManager {
    table_stats: DashMap<String, TableStats>,
    histograms: DashMap<String, Histogram>,
    default_row_count: RwLock<u64>,
}

impl StatisticsManager {
    pub fn new() -> Self { Self { default_row_count: RwLock::new(1000), ..Default::default() } }

    pub fn set_table_statistics(&self, record_type: impl Into<String>, stats: TableStats) { self.table_stats.insert(record_type.into(), stats); }

    pub fn set_index_histogram(&self, index_name: impl Into<String>, histogram: Histogram) { self.histograms.insert(index_name.into(), histogram); }

    pub fn table_statistics(&self, record_type: &str) -> Option<TableStats> { self.table_stats.get(record_type).map(|r| *r) }

    pub fn row_count(&self, record_type: &str) -> u64 {
        self.table_statistics(record_type).map(|s| s.row_count).unwrap_or(*self.default_row_count.read().unwrap())
    }

    pub fn equality_selectivity(&self, index_name: &str, value: &Value) -> f64 {
        self.histograms.get(index_name).and_then(|h| h.equality_selectivity(value)).unwrap_or(HEURISTIC_EQUALITY_SELECTIVITY)
    }

    pub fn range_selectivity(&self, index_name: &str, lo: Option<&Value>, hi: Option<&Value>) -> f64 {
        self.histograms.get(index_name).and_then(|h| h.range_selectivity(lo, hi)).unwrap_or(HEURISTIC_RANGE_SELECTIVITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: impl IntoIterator<Item = i64>) -> Vec<Value> { values.into_iter().map(Value::Int).collect() }

    #[test]
    fn equidepth_histogram_splits_into_requested_bucket_count() {
        let histogram = Histogram::from_sorted_samples(ints(1..=100), 10);
        assert_eq!(histogram.total_frequency(), 100);
    }

    #[test]
    fn last_bucket_upper_bound_is_inclusive() {
        let histogram = Histogram::from_sorted_samples(ints(1..=10), 2);
        let selectivity = histogram.range_selectivity(Some(&Value::Int(10)), Some(&Value::Int(10)));
        assert!(selectivity.unwrap() > 0.0);
    }

    #[test]
    fn missing_stats_fall_back_to_heuristics() {
        let manager = StatisticsManager::new();
        assert_eq!(manager.equality_selectivity("idx_missing", &Value::Int(1)), HEURISTIC_EQUALITY_SELECTIVITY);
        assert_eq!(manager.range_selectivity("idx_missing", None, None), HEURISTIC_RANGE_SELECTIVITY);
    }

    #[test]
    fn present_histogram_overrides_heuristic() {
        let manager = StatisticsManager::new();
        manager.set_index_histogram("idx_status", Histogram::from_sorted_samples(ints(std::iter::repeat(1).take(90).chain(std::iter::repeat(2).take(10))), 4));
        let selectivity = manager.equality_selectivity("idx_status", &Value::Int(1));
        assert!(selectivity > HEURISTIC_EQUALITY_SELECTIVITY);
    }
}
