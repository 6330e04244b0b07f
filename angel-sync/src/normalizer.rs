//! Result Normalizer - raw producer output to StandardizedResult
//!
//! Confidence is derived from a static per-source base-confidence table
//! with a default for source types that appear at runtime. Normalization
//! is pure construction: no I/O, never blocks.

use angel_common::types::{RawTaskResult, StandardizedResult};
use angel_common::{Error, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::debug;

/// Base confidence assigned to results from unlisted source types
pub const DEFAULT_BASE_CONFIDENCE: f64 = 0.75;

/// Base confidence per known source type
///
/// Reflects observed reliability of each specialist producer; validation
/// output is trusted most, forecasting least.
static BASE_CONFIDENCE: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("research", 0.85),
        ("analysis", 0.90),
        ("code_generation", 0.80),
        ("validation", 0.95),
        ("forecasting", 0.65),
        ("reporting", 0.75),
        ("optimization", 0.82),
        ("monitoring", 0.88),
    ])
});

/// Base confidence for a source type, with the unlisted-source default
pub fn base_confidence(source_type: &str) -> f64 {
    BASE_CONFIDENCE
        .get(source_type)
        .copied()
        .unwrap_or(DEFAULT_BASE_CONFIDENCE)
}

/// Normalize a raw producer output into a StandardizedResult
///
/// # Errors
/// `Error::Ingestion` when the raw input is missing its task descriptor or
/// payload. The input is discarded and the failure is returned to the
/// caller synchronously; nothing is retried.
pub fn normalize(source_type: &str, raw: RawTaskResult) -> Result<StandardizedResult> {
    let task = raw
        .task
        .ok_or_else(|| Error::Ingestion(format!("Missing task descriptor from '{}'", source_type)))?;
    let payload = raw.payload.ok_or_else(|| {
        Error::Ingestion(format!(
            "Missing payload for task '{}' from '{}'",
            task.id, source_type
        ))
    })?;

    let timestamp = Utc::now();
    let confidence = base_confidence(source_type);

    let result = StandardizedResult {
        id: format!("{}_{}_{}", source_type, task.id, timestamp.timestamp_millis()),
        source_type: source_type.to_string(),
        task_id: task.id,
        task_type: task.task_type,
        payload,
        insights: raw.insights,
        confidence,
        timestamp,
        metadata: raw.metadata,
    };

    debug!(
        id = %result.id,
        source_type = %result.source_type,
        task_type = %result.task_type,
        confidence = result.confidence,
        fields = result.payload.len(),
        "Result normalized"
    );

    Ok(result)
}
