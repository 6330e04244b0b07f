//! SyncEngine - engine facade and cadence loops
//!
//! Owns the central store, backlog queue, and per-source history
//! exclusively; producers interact only through `ingest`. Two interval
//! loops (batch sync, snapshots) run as spawned tasks guarded by per-
//! cadence busy flags, so a cycle that is still in flight when its timer
//! fires again is skipped rather than run concurrently against the store.
//! Shutdown cancels both timers before the engine is dropped.

use crate::conflict::{Candidate, ConflictDetector, ConflictResolver};
use crate::conflict::detector::values_conflict;
use crate::fusion;
use crate::normalizer;
use crate::queue::SyncQueue;
use crate::scheduler::{self, store_fused};
use crate::snapshot::{SnapshotManager, SnapshotStore};
use crate::store::CentralStore;
use angel_common::config::SyncConfig;
use angel_common::events::{EventBus, SyncEvent};
use angel_common::types::{
    FusedValue, InsightGroup, RawTaskResult, StandardizedResult, StoreRecord,
};
use angel_common::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Point-in-time engine statistics
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EngineStats {
    pub store_size: usize,
    pub queue_depth: usize,
    pub total_ingested: u64,
    pub is_active: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// Mutable engine state behind a single lock
///
/// One lock for store + queue + history models the original's cooperative
/// single-threaded scheduling: no two mutations of the store interleave.
struct EngineState {
    store: CentralStore,
    queue: SyncQueue,
    /// Bounded recent results per source type (conflict-detection context)
    source_history: HashMap<String, VecDeque<StandardizedResult>>,
}

/// Multi-source result synchronization engine
///
/// Cheap to clone (all shared state behind Arcs); clones observe the same
/// store, queue, and timers.
pub struct SyncEngine<S: SnapshotStore> {
    config: SyncConfig,
    state: Arc<Mutex<EngineState>>,
    events: EventBus,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    snapshots: Arc<SnapshotManager<S>>,
    total_ingested: Arc<AtomicU64>,
    last_sync: Arc<RwLock<Option<DateTime<Utc>>>>,
    active: Arc<AtomicBool>,
    batch_busy: Arc<AtomicBool>,
    snapshot_busy: Arc<AtomicBool>,
    shutdown: CancellationToken,
    engine_id: Uuid,
}

impl<S: SnapshotStore> Clone for SyncEngine<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            detector: self.detector.clone(),
            resolver: self.resolver.clone(),
            snapshots: Arc::clone(&self.snapshots),
            total_ingested: Arc::clone(&self.total_ingested),
            last_sync: Arc::clone(&self.last_sync),
            active: Arc::clone(&self.active),
            batch_busy: Arc::clone(&self.batch_busy),
            snapshot_busy: Arc::clone(&self.snapshot_busy),
            shutdown: self.shutdown.clone(),
            engine_id: self.engine_id,
        }
    }
}

impl<S: SnapshotStore + 'static> SyncEngine<S> {
    pub fn new(config: SyncConfig, snapshot_store: S) -> Self {
        let events = EventBus::new(config.event_bus_capacity);
        let detector =
            ConflictDetector::new(ChronoDuration::seconds(config.conflict_window_secs as i64));
        let resolver = ConflictResolver::new(config.conflict_resolution_strategy);
        let snapshots = Arc::new(SnapshotManager::new(snapshot_store, config.max_snapshots));

        Self {
            state: Arc::new(Mutex::new(EngineState {
                store: CentralStore::new(config.store_capacity),
                queue: SyncQueue::new(),
                source_history: HashMap::new(),
            })),
            events,
            detector,
            resolver,
            snapshots,
            total_ingested: Arc::new(AtomicU64::new(0)),
            last_sync: Arc::new(RwLock::new(None)),
            active: Arc::new(AtomicBool::new(false)),
            batch_busy: Arc::new(AtomicBool::new(false)),
            snapshot_busy: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            engine_id: Uuid::new_v4(),
            config,
        }
    }

    /// Restore the latest snapshot (if any) and start both cadence loops
    pub async fn start(&self) -> Result<()> {
        info!(
            engine_id = %self.engine_id,
            strategy = %self.resolver.strategy(),
            sync_interval_ms = self.config.sync_interval_ms,
            snapshot_interval_ms = self.config.snapshot_interval_ms,
            real_time_sync = self.config.real_time_sync,
            "Starting synchronization engine"
        );

        self.restore_from_snapshot().await;
        self.active.store(true, Ordering::SeqCst);

        let engine = self.clone();
        tokio::spawn(async move { engine.batch_loop().await });

        let engine = self.clone();
        tokio::spawn(async move { engine.snapshot_loop().await });

        Ok(())
    }

    /// Stop both interval timers, then mark the engine inactive
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.active.store(false, Ordering::SeqCst);

        let state = self.state.lock().await;
        info!(
            engine_id = %self.engine_id,
            store_size = state.store.len(),
            queue_depth = state.queue.len(),
            total_ingested = self.total_ingested.load(Ordering::Relaxed),
            "Synchronization engine stopped"
        );
    }

    /// Ingest one raw producer result
    ///
    /// Normalization failures (`Error::Ingestion`) are returned to the
    /// caller synchronously and nothing is retried. On success the result
    /// enters the immediate path or the backlog queue, depending on
    /// `real_time_sync`.
    pub async fn ingest(
        &self,
        source_type: &str,
        raw: RawTaskResult,
    ) -> Result<StandardizedResult> {
        let result = normalizer::normalize(source_type, raw)?;
        self.total_ingested.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock().await;
        self.record_history(&mut state, result.clone());

        let _ = self.events.emit(SyncEvent::ResultReceived {
            result: result.clone(),
        });

        if self.config.real_time_sync {
            self.process_immediate(&mut state, &result);
        } else {
            state.queue.push(result.clone());
            debug!(
                id = %result.id,
                queue_depth = state.queue.len(),
                "Result queued for batch sync"
            );
        }

        Ok(result)
    }

    /// Point-in-time copy of matching store records
    pub async fn query(&self, task_type: Option<&str>) -> Vec<StoreRecord> {
        self.state.lock().await.store.query(task_type)
    }

    /// Fused insight groups currently held in the store
    pub async fn insights(&self, task_type: Option<&str>) -> Vec<InsightGroup> {
        self.state
            .lock()
            .await
            .store
            .query(task_type)
            .into_iter()
            .filter_map(|record| match record {
                StoreRecord::Fused(fused) => match fused.value {
                    FusedValue::Insights(groups) => Some(groups),
                    _ => None,
                },
                StoreRecord::Standardized(_) => None,
            })
            .flatten()
            .collect()
    }

    pub async fn stats(&self) -> EngineStats {
        let state = self.state.lock().await;
        EngineStats {
            store_size: state.store.len(),
            queue_depth: state.queue.len(),
            total_ingested: self.total_ingested.load(Ordering::Relaxed),
            is_active: self.active.load(Ordering::SeqCst),
            last_sync_time: *self.last_sync.read().await,
        }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Producer-supervision status report; informational, logged only
    pub fn report_source_status(&self, source_type: &str, status: &str) {
        info!(source_type, status, "Source status report");
    }

    /// Run one batch cycle immediately, outside the timer cadence
    ///
    /// Used by tests and by callers that want a drain-now operation;
    /// identical semantics to a timer-fired cycle.
    pub async fn run_batch_cycle_now(&self) -> Result<scheduler::CycleReport> {
        let mut state = self.state.lock().await;
        let EngineState { store, queue, .. } = &mut *state;
        let report = scheduler::run_batch_cycle(queue, store, &self.events, self.config.batch_size)?;
        *self.last_sync.write().await = Some(Utc::now());
        Ok(report)
    }

    /// Write one snapshot immediately, outside the timer cadence
    pub async fn snapshot_now(&self) -> Result<String> {
        let (entries, history) = {
            let state = self.state.lock().await;
            let history: BTreeMap<String, Vec<StandardizedResult>> = state
                .source_history
                .iter()
                .map(|(source, results)| {
                    (source.clone(), results.iter().cloned().collect())
                })
                .collect();
            (state.store.entries(), history)
        };

        let entry_count = entries.len();
        let name = self.snapshots.write_snapshot(entries, history).await?;
        let _ = self.events.emit(SyncEvent::SnapshotWritten {
            name: name.clone(),
            entry_count,
            timestamp: Utc::now(),
        });
        Ok(name)
    }

    // ------------------------------------------------------------------
    // Immediate path
    // ------------------------------------------------------------------

    /// Detect, resolve, store, then refresh insights for the task type
    fn process_immediate(&self, state: &mut EngineState, result: &StandardizedResult) {
        let history_iter = state
            .source_history
            .values()
            .flatten()
            // The new result itself is already in history; skip it
            .filter(|prior| prior.id != result.id);
        let conflicts = self.detector.detect(result, history_iter);

        if conflicts.is_empty() {
            state
                .store
                .put(result.id.clone(), StoreRecord::Standardized(result.clone()));
        } else {
            self.resolve_and_store(state, result, &conflicts);
        }

        self.refresh_insights(state, &result.task_type);
    }

    /// Reduce the disagreeing records to candidates and reconcile them
    ///
    /// Candidates are drawn from the first field (payload key order) of
    /// the new result on which any detected record actually disagrees.
    fn resolve_and_store(
        &self,
        state: &mut EngineState,
        result: &StandardizedResult,
        conflicts: &[StandardizedResult],
    ) {
        let Some(disputed_key) = first_conflicting_field(result, conflicts) else {
            // Defensive: detector flagged records but no shared field
            // disagrees anymore; keep the new result as-is.
            state
                .store
                .put(result.id.clone(), StoreRecord::Standardized(result.clone()));
            return;
        };

        let mut candidates = Vec::with_capacity(conflicts.len() + 1);
        for record in std::iter::once(result).chain(conflicts.iter()) {
            if let Some(value) = record.payload.get(&disputed_key) {
                candidates.push(Candidate {
                    value: value.clone(),
                    confidence: record.confidence,
                    source: record.source_type.clone(),
                    timestamp: record.timestamp,
                });
            }
        }

        let Some(resolved) =
            self.resolver
                .resolve(&result.task_type, Some(disputed_key.as_str()), &candidates)
        else {
            return;
        };

        info!(
            task_type = %result.task_type,
            data_key = %disputed_key,
            conflicts = conflicts.len(),
            strategy = %self.resolver.strategy(),
            confidence = resolved.confidence,
            "Conflict resolved"
        );

        let _ = self.events.emit(SyncEvent::ConflictResolved {
            resolved: resolved.clone(),
            conflict_count: conflicts.len(),
        });

        store_fused(&mut state.store, resolved);
    }

    /// Insight fusion for a task type once at least two records exist for it
    fn refresh_insights(&self, state: &mut EngineState, task_type: &str) {
        if state.store.count_for_task_type(task_type) < 2 {
            return;
        }

        let standardized: Vec<StandardizedResult> = state
            .store
            .query(Some(task_type))
            .into_iter()
            .filter_map(|record| match record {
                StoreRecord::Standardized(r) => Some(r),
                StoreRecord::Fused(_) => None,
            })
            .collect();

        if let Some(record) = fusion::insights::fuse(task_type, &standardized) {
            if let FusedValue::Insights(groups) = &record.value {
                let _ = self.events.emit(SyncEvent::InsightsGenerated {
                    task_type: task_type.to_string(),
                    groups: groups.clone(),
                });
            }
            store_fused(&mut state.store, record);
        }
    }

    /// Append to the per-source history, pruning by bound and retention
    fn record_history(&self, state: &mut EngineState, result: StandardizedResult) {
        let retention_cutoff =
            Utc::now() - ChronoDuration::days(self.config.data_retention_days as i64);
        let history = state
            .source_history
            .entry(result.source_type.clone())
            .or_default();

        history.push_back(result);
        while history.len() > self.config.source_history_limit {
            history.pop_front();
        }
        while history
            .front()
            .map(|r| r.timestamp < retention_cutoff)
            .unwrap_or(false)
        {
            history.pop_front();
        }
    }

    // ------------------------------------------------------------------
    // Cadence loops
    // ------------------------------------------------------------------

    async fn batch_loop(&self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.sync_interval_ms.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a freshly started
        // engine does not sync an empty queue at once.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Batch loop stopped");
                    return;
                }
                _ = interval.tick() => {
                    if self
                        .batch_busy
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                    {
                        debug!("Batch cycle still in flight, skipping tick");
                        continue;
                    }

                    if let Err(e) = self.run_batch_cycle_now().await {
                        warn!(error = %e, "Batch sync cycle failed, batch requeued");
                    }

                    self.batch_busy.store(false, Ordering::SeqCst);
                }
            }
        }
    }

    async fn snapshot_loop(&self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.snapshot_interval_ms.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Snapshot loop stopped");
                    return;
                }
                _ = interval.tick() => {
                    if self
                        .snapshot_busy
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                    {
                        debug!("Snapshot cycle still in flight, skipping tick");
                        continue;
                    }

                    match self.snapshot_now().await {
                        Ok(name) => debug!(name = %name, "Snapshot cycle complete"),
                        // Skipped cycle, never fatal
                        Err(e) => warn!(error = %e, "Snapshot cycle failed, skipping"),
                    }

                    self.snapshot_busy.store(false, Ordering::SeqCst);
                }
            }
        }
    }

    /// Load the most recent snapshot into the store and history
    ///
    /// Any failure here means a cold start, never a crash.
    async fn restore_from_snapshot(&self) {
        match self.snapshots.restore_latest().await {
            Ok(Some(file)) => {
                let mut state = self.state.lock().await;
                state.store.restore(file.store_entries);
                state.source_history = file
                    .source_history
                    .into_iter()
                    .map(|(source, results)| (source, results.into_iter().collect()))
                    .collect();
                info!(store_size = state.store.len(), "State restored from snapshot");
            }
            Ok(None) => {
                debug!("No snapshot found, starting cold");
            }
            Err(e) => {
                warn!(error = %e, "Snapshot restore failed, starting cold");
            }
        }
    }
}

/// First field of `result` (payload key order) on which any conflicting
/// record disagrees
fn first_conflicting_field(
    result: &StandardizedResult,
    conflicts: &[StandardizedResult],
) -> Option<String> {
    for (key, value) in &result.payload {
        let disputed = conflicts.iter().any(|prior| {
            prior
                .payload
                .get(key)
                .map(|other| values_conflict(value, other))
                .unwrap_or(false)
        });
        if disputed {
            return Some(key.clone());
        }
    }
    None
}
