//! Time-series fusion - timestamp-aligned confidence-weighted merge
//!
//! Points are grouped by exact timestamp; each group fuses to the
//! confidence-weighted average of its values with the minimum contributor
//! confidence (conservative). Output is sorted ascending by timestamp.

use super::collect_sources;
use angel_common::types::{FusedKind, FusedPoint, FusedRecord, FusedValue, StandardizedResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// Fuse the series points of `key` across `results`
///
/// Returns `None` when no result carries series points for the key.
pub fn fuse(task_type: &str, key: &str, results: &[StandardizedResult]) -> Option<FusedRecord> {
    let contributors: Vec<&StandardizedResult> = results
        .iter()
        .filter(|r| {
            r.payload
                .get(key)
                .and_then(|v| v.as_series())
                .map(|points| !points.is_empty())
                .unwrap_or(false)
        })
        .collect();

    // (value, contributor confidence) per exact timestamp
    let mut grouped: BTreeMap<DateTime<Utc>, Vec<(f64, f64)>> = BTreeMap::new();
    for result in &contributors {
        if let Some(points) = result.payload.get(key).and_then(|v| v.as_series()) {
            for point in points {
                grouped
                    .entry(point.timestamp)
                    .or_default()
                    .push((point.value, result.confidence));
            }
        }
    }

    if grouped.is_empty() {
        return None;
    }

    // BTreeMap iteration is already ascending by timestamp
    let fused_points: Vec<FusedPoint> = grouped
        .into_iter()
        .map(|(timestamp, entries)| {
            let weight_sum: f64 = entries.iter().map(|(_, c)| c).sum();
            let value = if weight_sum > 0.0 {
                entries.iter().map(|(v, c)| v * c).sum::<f64>() / weight_sum
            } else {
                entries.iter().map(|(v, _)| v).sum::<f64>() / entries.len() as f64
            };
            let confidence = entries
                .iter()
                .map(|(_, c)| *c)
                .fold(f64::INFINITY, f64::min)
                .clamp(0.0, 1.0);
            FusedPoint {
                timestamp,
                value,
                confidence,
            }
        })
        .collect();

    let confidence = fused_points
        .iter()
        .map(|p| p.confidence)
        .fold(f64::INFINITY, f64::min)
        .clamp(0.0, 1.0);

    debug!(
        task_type = task_type,
        key = key,
        points = fused_points.len(),
        confidence,
        "Time-series fusion complete"
    );

    Some(FusedRecord {
        kind: FusedKind::FusedTimeSeries,
        task_type: task_type.to_string(),
        data_key: Some(key.to_string()),
        value: FusedValue::TimeSeries(fused_points),
        confidence,
        sources: collect_sources(contributors.iter().copied()),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use angel_common::types::{FieldValue, Payload, ResultMetadata, SeriesPoint};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn result(source: &str, confidence: f64, points: Vec<SeriesPoint>) -> StandardizedResult {
        let mut payload = Payload::new();
        payload.insert("load".to_string(), FieldValue::Series(points));
        StandardizedResult {
            id: format!("{}_t_0", source),
            source_type: source.to_string(),
            task_id: "t".to_string(),
            task_type: "capacity".to_string(),
            payload,
            insights: vec![],
            confidence,
            timestamp: Utc::now(),
            metadata: ResultMetadata::default(),
        }
    }

    #[test]
    fn test_shared_timestamp_weighted_average_and_min_confidence() {
        let results = vec![
            result(
                "a",
                0.8,
                vec![SeriesPoint { timestamp: at(0), value: 100.0 }],
            ),
            result(
                "b",
                0.4,
                vec![SeriesPoint { timestamp: at(0), value: 200.0 }],
            ),
        ];

        let record = fuse("capacity", "load", &results).unwrap();
        let points = match &record.value {
            FusedValue::TimeSeries(p) => p,
            other => panic!("expected time series, got {:?}", other),
        };

        assert_eq!(points.len(), 1);
        // (100*0.8 + 200*0.4) / 1.2 = 133.33
        assert!((points[0].value - 400.0 / 3.0).abs() < 1e-9);
        assert!((points[0].confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_output_sorted_ascending() {
        let results = vec![result(
            "a",
            0.9,
            vec![
                SeriesPoint { timestamp: at(60), value: 2.0 },
                SeriesPoint { timestamp: at(0), value: 1.0 },
                SeriesPoint { timestamp: at(120), value: 3.0 },
            ],
        )];

        let record = fuse("capacity", "load", &results).unwrap();
        match &record.value {
            FusedValue::TimeSeries(points) => {
                let stamps: Vec<_> = points.iter().map(|p| p.timestamp).collect();
                assert_eq!(stamps, vec![at(0), at(60), at(120)]);
            }
            other => panic!("expected time series, got {:?}", other),
        }
    }

    #[test]
    fn test_distinct_timestamps_stay_separate() {
        let results = vec![
            result("a", 0.8, vec![SeriesPoint { timestamp: at(0), value: 1.0 }]),
            result("b", 0.6, vec![SeriesPoint { timestamp: at(30), value: 5.0 }]),
        ];

        let record = fuse("capacity", "load", &results).unwrap();
        match &record.value {
            FusedValue::TimeSeries(points) => {
                assert_eq!(points.len(), 2);
                assert_eq!(points[0].value, 1.0);
                assert_eq!(points[1].value, 5.0);
            }
            other => panic!("expected time series, got {:?}", other),
        }
        assert_eq!(record.sources, vec!["a", "b"]);
    }

    #[test]
    fn test_no_series_yields_none() {
        let mut no_series = result("a", 0.8, vec![]);
        no_series.payload.insert("load".to_string(), FieldValue::Number(3.0));
        assert!(fuse("capacity", "load", &[no_series]).is_none());
    }
}
