//! Numeric fusion - statistics over one payload key
//!
//! Aggregate confidence is derived from dispersion: tightly clustered
//! values fuse with high confidence, scattered values with low.

use super::collect_sources;
use angel_common::types::{
    FusedKind, FusedRecord, FusedValue, NumericSummary, StandardizedResult,
};
use chrono::Utc;
use tracing::debug;

/// Fuse the numeric values of `key` across `results`
///
/// Returns `None` when no result carries a numeric value for the key.
/// Confidence is `max(0, 1 - stddev/|mean|)`, and 0 when the mean is 0
/// (coefficient of variation undefined).
pub fn fuse(task_type: &str, key: &str, results: &[StandardizedResult]) -> Option<FusedRecord> {
    let contributors: Vec<&StandardizedResult> = results
        .iter()
        .filter(|r| r.payload.get(key).and_then(|v| v.as_number()).is_some())
        .collect();

    let values: Vec<f64> = contributors
        .iter()
        .filter_map(|r| r.payload.get(key).and_then(|v| v.as_number()))
        .collect();

    if values.is_empty() {
        return None;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let median = median_of(&values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    let std_dev = variance.sqrt();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let confidence = if mean == 0.0 {
        0.0
    } else {
        (1.0 - std_dev / mean.abs()).clamp(0.0, 1.0)
    };

    debug!(
        task_type = task_type,
        key = key,
        count = values.len(),
        mean,
        std_dev,
        confidence,
        "Numeric fusion complete"
    );

    Some(FusedRecord {
        kind: FusedKind::FusedNumeric,
        task_type: task_type.to_string(),
        data_key: Some(key.to_string()),
        value: FusedValue::Numeric(NumericSummary {
            mean,
            median,
            std_dev,
            min,
            max,
            count: values.len(),
        }),
        confidence,
        sources: collect_sources(contributors.iter().copied()),
        timestamp: Utc::now(),
    })
}

/// Sort, take the middle element, or the average of the two middles
fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
