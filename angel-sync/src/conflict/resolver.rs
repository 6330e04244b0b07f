//! Conflict Resolver - reconciles a disagreeing set into one record
//!
//! Four selectable strategies. The strategy is parsed defensively at the
//! configuration layer: an unrecognized name already degraded to
//! weighted_average before it reaches this module.

use angel_common::config::ResolutionStrategy;
use angel_common::types::{
    Confidence, FieldValue, FusedKind, FusedPoint, FusedRecord, FusedValue,
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// One record reduced to its disputed value
#[derive(Debug, Clone)]
pub struct Candidate {
    pub value: FieldValue,
    pub confidence: Confidence,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// Applies the configured strategy to a set of disagreeing candidates
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    strategy: ResolutionStrategy,
}

impl ConflictResolver {
    pub fn new(strategy: ResolutionStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ResolutionStrategy {
        self.strategy
    }

    /// Reconcile `candidates` into a single `resolved_conflict` record
    ///
    /// Returns `None` for an empty candidate set. Output confidence is
    /// clamped to [0, 1] and `sources` carries every contributing source
    /// type in first-appearance order.
    pub fn resolve(
        &self,
        task_type: &str,
        data_key: Option<&str>,
        candidates: &[Candidate],
    ) -> Option<FusedRecord> {
        if candidates.is_empty() {
            return None;
        }

        let (value, confidence) = match self.strategy {
            ResolutionStrategy::WeightedAverage => weighted_average(candidates),
            ResolutionStrategy::MajorityVote => majority_vote(candidates),
            ResolutionStrategy::HighestConfidence => highest_confidence(candidates),
            ResolutionStrategy::TemporalPriority => temporal_priority(candidates),
        };

        let mut sources = Vec::new();
        for candidate in candidates {
            if !sources.contains(&candidate.source) {
                sources.push(candidate.source.clone());
            }
        }

        debug!(
            task_type = task_type,
            strategy = %self.strategy,
            candidates = candidates.len(),
            confidence,
            "Conflict resolved"
        );

        Some(FusedRecord {
            kind: FusedKind::ResolvedConflict,
            task_type: task_type.to_string(),
            data_key: data_key.map(str::to_string),
            value,
            confidence: confidence.clamp(0.0, 1.0),
            sources,
            timestamp: Utc::now(),
        })
    }
}

/// resolved = sum(value * confidence) / sum(confidence); confidence = sum / count
///
/// Defined over numeric candidates. When none are numeric the value falls
/// back to the highest-confidence candidate while confidence accounting is
/// unchanged.
fn weighted_average(candidates: &[Candidate]) -> (FusedValue, Confidence) {
    let confidence_sum: f64 = candidates.iter().map(|c| c.confidence).sum();
    let confidence = confidence_sum / candidates.len() as f64;

    let numeric: Vec<(f64, f64)> = candidates
        .iter()
        .filter_map(|c| c.value.as_number().map(|v| (v, c.confidence)))
        .collect();

    if numeric.is_empty() {
        warn!("No numeric candidates for weighted_average, selecting by confidence");
        let (value, _) = highest_confidence(candidates);
        return (value, confidence);
    }

    let weight_sum: f64 = numeric.iter().map(|(_, c)| c).sum();
    let resolved = if weight_sum > 0.0 {
        numeric.iter().map(|(v, c)| v * c).sum::<f64>() / weight_sum
    } else {
        numeric.iter().map(|(v, _)| v).sum::<f64>() / numeric.len() as f64
    };

    (FusedValue::Scalar(resolved), confidence)
}

/// Highest summed confidence per exact value; confidence = winning sum / count
fn majority_vote(candidates: &[Candidate]) -> (FusedValue, Confidence) {
    // Linear grouping by exact value equality (values are not hashable)
    let mut groups: Vec<(&FieldValue, f64)> = Vec::new();
    for candidate in candidates {
        match groups.iter_mut().find(|(v, _)| **v == candidate.value) {
            Some((_, weight)) => *weight += candidate.confidence,
            None => groups.push((&candidate.value, candidate.confidence)),
        }
    }

    // First-encountered group wins ties (strict comparison)
    let (winner, winning_weight) = groups
        .iter()
        .fold(None::<(&FieldValue, f64)>, |best, &(value, weight)| match best {
            Some((_, best_weight)) if weight <= best_weight => best,
            _ => Some((value, weight)),
        })
        .expect("candidates is non-empty");

    (
        fused_value_of(winner),
        winning_weight / candidates.len() as f64,
    )
}

/// Single candidate with the maximum confidence; ties keep the first seen
fn highest_confidence(candidates: &[Candidate]) -> (FusedValue, Confidence) {
    let best = candidates
        .iter()
        .fold(None::<&Candidate>, |best, candidate| match best {
            Some(b) if candidate.confidence <= b.confidence => best,
            _ => Some(candidate),
        })
        .expect("candidates is non-empty");

    (fused_value_of(&best.value), best.confidence)
}

/// Candidate with the latest timestamp; ties keep the first seen
fn temporal_priority(candidates: &[Candidate]) -> (FusedValue, Confidence) {
    let latest = candidates
        .iter()
        .fold(None::<&Candidate>, |best, candidate| match best {
            Some(b) if candidate.timestamp <= b.timestamp => best,
            _ => Some(candidate),
        })
        .expect("candidates is non-empty");

    (fused_value_of(&latest.value), latest.confidence)
}

fn fused_value_of(value: &FieldValue) -> FusedValue {
    match value {
        FieldValue::Number(n) => FusedValue::Scalar(*n),
        FieldValue::Text(s) => FusedValue::Label(s.clone()),
        FieldValue::Series(points) => FusedValue::TimeSeries(
            points
                .iter()
                .map(|p| FusedPoint {
                    timestamp: p.timestamp,
                    value: p.value,
                    confidence: 1.0,
                })
                .collect(),
        ),
    }
}
