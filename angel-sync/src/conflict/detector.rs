//! Conflict Detector - cross-source disagreement scan
//!
//! A new result is compared against recent results from *other* source
//! types for the same task type. Per shared payload field: numeric values
//! conflict when their midpoint-relative difference exceeds 20%, strings
//! conflict on exact inequality. Series fields and fields present on only
//! one side never conflict (series are reconciled by time-series fusion).

use angel_common::types::{FieldValue, StandardizedResult};
use chrono::Duration;
use tracing::debug;

/// Percent difference above which two numeric values disagree
const NUMERIC_CONFLICT_THRESHOLD_PCT: f64 = 20.0;

/// Scans prior results for disagreement with a new result
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    /// Sliding recency window; older records are not considered
    window: Duration,
}

impl ConflictDetector {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Detector with the default 10 minute window
    pub fn with_default_window() -> Self {
        Self::new(Duration::seconds(600))
    }

    /// Find prior records that conflict with `result`
    ///
    /// Only records from other source types with the same task type and a
    /// timestamp inside the recency window are considered. Returns the
    /// full set of conflicting records, not just the differing fields.
    pub fn detect<'a, I>(&self, result: &StandardizedResult, history: I) -> Vec<StandardizedResult>
    where
        I: IntoIterator<Item = &'a StandardizedResult>,
    {
        let cutoff = result.timestamp - self.window;

        let conflicts: Vec<StandardizedResult> = history
            .into_iter()
            .filter(|prior| prior.source_type != result.source_type)
            .filter(|prior| prior.task_type == result.task_type)
            .filter(|prior| prior.timestamp >= cutoff)
            .filter(|prior| records_conflict(result, prior))
            .cloned()
            .collect();

        if !conflicts.is_empty() {
            debug!(
                id = %result.id,
                task_type = %result.task_type,
                conflicts = conflicts.len(),
                "Cross-source conflicts detected"
            );
        }

        conflicts
    }
}

/// Whether any shared payload field of the two records disagrees
fn records_conflict(a: &StandardizedResult, b: &StandardizedResult) -> bool {
    a.payload.iter().any(|(key, value_a)| {
        b.payload
            .get(key)
            .map(|value_b| values_conflict(value_a, value_b))
            .unwrap_or(false)
    })
}

/// Conflict rule for one shared field
pub fn values_conflict(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Number(x), FieldValue::Number(y)) => {
            percent_difference(*x, *y) > NUMERIC_CONFLICT_THRESHOLD_PCT
        }
        (FieldValue::Text(x), FieldValue::Text(y)) => x != y,
        // Series fields are merged by fusion, never flagged here;
        // mismatched kinds for the same key are left to fusion as well.
        _ => false,
    }
}

/// Midpoint-relative percent difference: |a-b| / ((a+b)/2) * 100
///
/// A zero midpoint with equal values is no difference; with differing
/// values it is treated as total disagreement.
pub fn percent_difference(a: f64, b: f64) -> f64 {
    let midpoint = (a + b) / 2.0;
    if midpoint == 0.0 {
        if a == b {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        ((a - b).abs() / midpoint.abs()) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use angel_common::types::{Payload, ResultMetadata};
    use chrono::Utc;

    fn result_with_value(source: &str, task_type: &str, key: &str, value: FieldValue) -> StandardizedResult {
        let mut payload = Payload::new();
        payload.insert(key.to_string(), value);
        StandardizedResult {
            id: format!("{}_{}_0", source, task_type),
            source_type: source.to_string(),
            task_id: "t1".to_string(),
            task_type: task_type.to_string(),
            payload,
            insights: vec![],
            confidence: 0.8,
            timestamp: Utc::now(),
            metadata: ResultMetadata::default(),
        }
    }

    #[test]
    fn test_numeric_disagreement_beyond_threshold() {
        // |100-130| / 115 * 100 = 26.1% > 20%
        let detector = ConflictDetector::with_default_window();
        let new = result_with_value("analysis", "revenue", "projection", FieldValue::Number(100.0));
        let prior = result_with_value("forecasting", "revenue", "projection", FieldValue::Number(130.0));

        let conflicts = detector.detect(&new, [&prior]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].source_type, "forecasting");
    }

    #[test]
    fn test_numeric_agreement_within_threshold() {
        // |100-110| / 105 * 100 = 9.5% <= 20%
        let detector = ConflictDetector::with_default_window();
        let new = result_with_value("analysis", "revenue", "projection", FieldValue::Number(100.0));
        let prior = result_with_value("forecasting", "revenue", "projection", FieldValue::Number(110.0));

        assert!(detector.detect(&new, [&prior]).is_empty());
    }

    #[test]
    fn test_string_mismatch_conflicts() {
        let detector = ConflictDetector::with_default_window();
        let new = result_with_value("analysis", "status", "verdict", FieldValue::Text("pass".into()));
        let prior = result_with_value("validation", "status", "verdict", FieldValue::Text("fail".into()));

        assert_eq!(detector.detect(&new, [&prior]).len(), 1);
    }

    #[test]
    fn test_same_source_never_conflicts() {
        let detector = ConflictDetector::with_default_window();
        let new = result_with_value("analysis", "revenue", "projection", FieldValue::Number(100.0));
        let prior = result_with_value("analysis", "revenue", "projection", FieldValue::Number(500.0));

        assert!(detector.detect(&new, [&prior]).is_empty());
    }

    #[test]
    fn test_different_task_type_ignored() {
        let detector = ConflictDetector::with_default_window();
        let new = result_with_value("analysis", "revenue", "projection", FieldValue::Number(100.0));
        let prior = result_with_value("forecasting", "costs", "projection", FieldValue::Number(500.0));

        assert!(detector.detect(&new, [&prior]).is_empty());
    }

    #[test]
    fn test_records_outside_window_ignored() {
        let detector = ConflictDetector::with_default_window();
        let new = result_with_value("analysis", "revenue", "projection", FieldValue::Number(100.0));
        let mut prior =
            result_with_value("forecasting", "revenue", "projection", FieldValue::Number(500.0));
        prior.timestamp = new.timestamp - Duration::seconds(601);

        assert!(detector.detect(&new, [&prior]).is_empty());
    }

    #[test]
    fn test_disjoint_fields_do_not_conflict() {
        let detector = ConflictDetector::with_default_window();
        let new = result_with_value("analysis", "revenue", "projection", FieldValue::Number(100.0));
        let prior = result_with_value("forecasting", "revenue", "other_field", FieldValue::Number(500.0));

        assert!(detector.detect(&new, [&prior]).is_empty());
    }

    #[test]
    fn test_percent_difference_zero_midpoint() {
        assert_eq!(percent_difference(0.0, 0.0), 0.0);
        assert!(percent_difference(-5.0, 5.0).is_infinite());
    }

    #[test]
    fn test_multiple_conflicting_priors_all_returned() {
        let detector = ConflictDetector::with_default_window();
        let new = result_with_value("analysis", "revenue", "projection", FieldValue::Number(100.0));
        let p1 = result_with_value("forecasting", "revenue", "projection", FieldValue::Number(130.0));
        let p2 = result_with_value("research", "revenue", "projection", FieldValue::Number(160.0));
        let p3 = result_with_value("reporting", "revenue", "projection", FieldValue::Number(101.0));

        let conflicts = detector.detect(&new, [&p1, &p2, &p3]);
        assert_eq!(conflicts.len(), 2);
    }
}
