//! Categorical fusion - confidence-weighted vote over one payload key

use super::collect_sources;
use angel_common::types::{
    CategoricalSummary, FusedKind, FusedRecord, FusedValue, StandardizedResult,
};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::debug;

/// Fuse the string values of `key` across `results`
///
/// Each candidate value accumulates the confidences of the results that
/// reported it; the heaviest value becomes `primary`. Output confidence is
/// `winning_weight / total_record_count` over the whole input — records
/// lacking a string value for the key dilute it. The full weight
/// distribution is returned alongside the winner. `None` when no result
/// carries a string value for the key.
pub fn fuse(task_type: &str, key: &str, results: &[StandardizedResult]) -> Option<FusedRecord> {
    let contributors: Vec<&StandardizedResult> = results
        .iter()
        .filter(|r| r.payload.get(key).and_then(|v| v.as_text()).is_some())
        .collect();

    if contributors.is_empty() {
        return None;
    }

    let mut distribution: BTreeMap<String, f64> = BTreeMap::new();
    for result in &contributors {
        if let Some(value) = result.payload.get(key).and_then(|v| v.as_text()) {
            *distribution.entry(value.to_string()).or_insert(0.0) += result.confidence;
        }
    }

    // Heaviest value wins; ties resolve to the first in key order
    let (primary, winning_weight) = distribution
        .iter()
        .fold(None::<(&String, f64)>, |best, (value, &weight)| match best {
            Some((_, best_weight)) if weight <= best_weight => best,
            _ => Some((value, weight)),
        })
        .map(|(value, weight)| (value.clone(), weight))?;

    let confidence = (winning_weight / results.len() as f64).clamp(0.0, 1.0);

    debug!(
        task_type = task_type,
        key = key,
        primary = %primary,
        candidates = distribution.len(),
        confidence,
        "Categorical fusion complete"
    );

    Some(FusedRecord {
        kind: FusedKind::FusedCategorical,
        task_type: task_type.to_string(),
        data_key: Some(key.to_string()),
        value: FusedValue::Categorical(CategoricalSummary {
            primary,
            distribution,
        }),
        confidence,
        sources: collect_sources(contributors.iter().copied()),
        timestamp: Utc::now(),
    })
}
