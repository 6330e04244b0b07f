//! Insight fusion - cross-source grouping of free-form insight entries
//!
//! Entries are grouped by exact category string; within a category each
//! theme accumulates a consensus weight (the summed confidences of the
//! entries reporting it) and the group confidence is the average entry
//! confidence. Known limitation: category and theme text are matched
//! exactly, with no case folding or synonym handling.

use super::collect_sources;
use angel_common::types::{
    FusedKind, FusedRecord, FusedValue, InsightGroup, StandardizedResult,
};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::debug;

/// Fuse insight entries across `results` into one group per category
///
/// Returns `None` when no result carries insights.
pub fn fuse(task_type: &str, results: &[StandardizedResult]) -> Option<FusedRecord> {
    struct GroupAccumulator {
        themes: BTreeMap<String, f64>,
        confidence_sum: f64,
        entry_count: usize,
        sources: Vec<String>,
    }

    let mut groups: BTreeMap<String, GroupAccumulator> = BTreeMap::new();

    for result in results {
        for insight in &result.insights {
            let group = groups
                .entry(insight.category.clone())
                .or_insert_with(|| GroupAccumulator {
                    themes: BTreeMap::new(),
                    confidence_sum: 0.0,
                    entry_count: 0,
                    sources: Vec::new(),
                });

            *group.themes.entry(insight.theme.clone()).or_insert(0.0) += insight.confidence;
            group.confidence_sum += insight.confidence;
            group.entry_count += 1;
            if !group.sources.contains(&result.source_type) {
                group.sources.push(result.source_type.clone());
            }
        }
    }

    if groups.is_empty() {
        return None;
    }

    let fused_groups: Vec<InsightGroup> = groups
        .into_iter()
        .map(|(category, acc)| InsightGroup {
            category,
            themes: acc.themes,
            confidence: (acc.confidence_sum / acc.entry_count as f64).clamp(0.0, 1.0),
            sources: acc.sources,
        })
        .collect();

    let confidence = (fused_groups.iter().map(|g| g.confidence).sum::<f64>()
        / fused_groups.len() as f64)
        .clamp(0.0, 1.0);

    let contributors: Vec<&StandardizedResult> = results
        .iter()
        .filter(|r| !r.insights.is_empty())
        .collect();

    debug!(
        task_type = task_type,
        groups = fused_groups.len(),
        sources = contributors.len(),
        "Insight fusion complete"
    );

    Some(FusedRecord {
        kind: FusedKind::FusedInsights,
        task_type: task_type.to_string(),
        data_key: None,
        value: FusedValue::Insights(fused_groups),
        confidence,
        sources: collect_sources(contributors.iter().copied()),
        timestamp: Utc::now(),
    })
}
