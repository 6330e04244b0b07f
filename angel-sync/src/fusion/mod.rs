//! Fusion Engine - aggregate summaries over multi-source results
//!
//! Four independent aggregation functions, each a pure function of its
//! input list: numeric, categorical, time-series, and insight fusion.
//! Deterministic for identical inputs; no hidden state.

pub mod categorical;
pub mod insights;
pub mod numeric;
pub mod time_series;

use angel_common::types::StandardizedResult;

/// Contributing source types in first-appearance order, deduped
pub(crate) fn collect_sources<'a, I>(results: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a StandardizedResult>,
{
    let mut sources = Vec::new();
    for result in results {
        if !sources.contains(&result.source_type) {
            sources.push(result.source_type.clone());
        }
    }
    sources
}
