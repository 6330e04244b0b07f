//! Sync Scheduler - batch-path processing of the backlog queue
//!
//! Each cycle drains up to a configured batch size from the queue, groups
//! results by task type in first-seen order, and routes each group through
//! numeric, categorical, and insight fusion. A failing group returns the
//! whole drained batch to the queue head for the next cycle: at-least-once
//! semantics, tolerated because fusion is idempotent per invocation.
//!
//! The timer loop itself (cadence, busy flag, shutdown) lives in the
//! engine; this module is the synchronous cycle body, directly testable.

use crate::fusion;
use crate::queue::SyncQueue;
use crate::store::CentralStore;
use angel_common::events::{EventBus, SyncEvent};
use angel_common::types::{FusedRecord, FusedValue, StandardizedResult};
use angel_common::{Error, Result};
use tracing::{debug, info, warn};

/// Outcome of one batch cycle
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub drained: usize,
    pub groups: usize,
    pub fused_records: usize,
}

/// Drain and process one batch from the queue
///
/// On a group failure the entire drained batch is requeued at the head
/// and `Error::Sync` is returned; the caller logs and waits for the next
/// cycle.
pub fn run_batch_cycle(
    queue: &mut SyncQueue,
    store: &mut CentralStore,
    events: &EventBus,
    batch_size: usize,
) -> Result<CycleReport> {
    let batch = queue.drain_batch(batch_size);
    if batch.is_empty() {
        return Ok(CycleReport::default());
    }

    let drained = batch.len();
    let groups = group_by_task_type(batch);
    let group_count = groups.len();
    let mut fused_records = 0;

    for (task_type, results) in &groups {
        match process_group(store, events, task_type, results) {
            Ok(count) => fused_records += count,
            Err(e) => {
                warn!(
                    task_type = %task_type,
                    error = %e,
                    "Batch group failed, requeueing drained batch"
                );
                // Message built before the requeue batch takes `groups`
                let message = format!("Fusion failed for task type '{}': {}", task_type, e);
                let batch: Vec<StandardizedResult> =
                    groups.into_iter().flat_map(|(_, results)| results).collect();
                queue.requeue_front(batch);
                return Err(Error::Sync(message));
            }
        }
    }

    info!(
        drained,
        groups = group_count,
        fused_records,
        "Batch sync cycle complete"
    );

    Ok(CycleReport {
        drained,
        groups: group_count,
        fused_records,
    })
}

/// Group a drained batch by task type, first-seen order
///
/// The order has no contract with callers beyond determinism for
/// identical inputs.
pub fn group_by_task_type(
    batch: Vec<StandardizedResult>,
) -> Vec<(String, Vec<StandardizedResult>)> {
    let mut groups: Vec<(String, Vec<StandardizedResult>)> = Vec::new();
    for result in batch {
        match groups.iter_mut().find(|(t, _)| *t == result.task_type) {
            Some((_, members)) => members.push(result),
            None => groups.push((result.task_type.clone(), vec![result])),
        }
    }
    groups
}

/// Fuse one task-type group and store every fusion output
///
/// Numeric and categorical fusion run for every distinct payload key in
/// the group, then insight fusion runs once for the group. Each stored
/// result keeps both the raw record and the fusion outputs queryable.
fn process_group(
    store: &mut CentralStore,
    events: &EventBus,
    task_type: &str,
    results: &[StandardizedResult],
) -> anyhow::Result<usize> {
    // Fusion statistics are only defined over finite values; a group
    // carrying NaN or infinity fails before anything enters the store, and
    // the cycle requeues the whole batch.
    reject_non_finite(results)?;

    // The raw records themselves enter the store first
    for result in results {
        store.put(result.id.clone(), result.clone().into_store_record());
    }

    let mut fused = 0;

    for key in distinct_payload_keys(results) {
        if let Some(record) = fusion::numeric::fuse(task_type, &key, results) {
            store_fused(store, record);
            fused += 1;
        }
        if let Some(record) = fusion::categorical::fuse(task_type, &key, results) {
            store_fused(store, record);
            fused += 1;
        }
        if let Some(record) = fusion::time_series::fuse(task_type, &key, results) {
            store_fused(store, record);
            fused += 1;
        }
    }

    if let Some(record) = fusion::insights::fuse(task_type, results) {
        if let FusedValue::Insights(groups) = &record.value {
            let _ = events.emit(SyncEvent::InsightsGenerated {
                task_type: task_type.to_string(),
                groups: groups.clone(),
            });
        }
        store_fused(store, record);
        fused += 1;
    }

    debug!(task_type = task_type, fused, "Group fusion complete");
    Ok(fused)
}

/// Fail on any non-finite numeric payload value in the group
fn reject_non_finite(results: &[StandardizedResult]) -> anyhow::Result<()> {
    for result in results {
        for (key, value) in &result.payload {
            let bad_number = value.as_number().map(|n| !n.is_finite()).unwrap_or(false);
            let bad_series = value
                .as_series()
                .map(|points| points.iter().any(|p| !p.value.is_finite()))
                .unwrap_or(false);
            if bad_number || bad_series {
                anyhow::bail!("Non-finite value for '{}' in result {}", key, result.id);
            }
        }
    }
    Ok(())
}

/// Distinct payload keys across a group, first-seen order
fn distinct_payload_keys(results: &[StandardizedResult]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for result in results {
        for key in result.payload.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    }
    keys
}

/// Store a fused record under its stable key
///
/// Keys embed kind, task type, and data key so a re-run of the same
/// fusion overwrites its previous output instead of accumulating.
pub fn store_fused(store: &mut CentralStore, record: FusedRecord) {
    let key = match &record.data_key {
        Some(data_key) => format!("{}_{}_{}", record.kind, record.task_type, data_key),
        None => format!("{}_{}", record.kind, record.task_type),
    };
    store.put(key, angel_common::types::StoreRecord::Fused(record));
}

/// Convenience conversion used when storing raw records
trait IntoStoreRecord {
    fn into_store_record(self) -> angel_common::types::StoreRecord;
}

impl IntoStoreRecord for StandardizedResult {
    fn into_store_record(self) -> angel_common::types::StoreRecord {
        angel_common::types::StoreRecord::Standardized(self)
    }
}
