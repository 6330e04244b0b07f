//! End-to-end engine tests through the public API

use angel_common::config::SyncConfig;
use angel_common::events::SyncEvent;
use angel_common::types::{
    FieldValue, FusedKind, FusedValue, Insight, Payload, RawTaskResult, StoreRecord,
    TaskDescriptor,
};
use angel_common::Error;
use angel_sync::{FsSnapshotStore, MemorySnapshotStore, SyncEngine};

/// Test diagnostics; honors RUST_LOG, idempotent across tests
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn raw(task_id: &str, task_type: &str, key: &str, value: FieldValue) -> RawTaskResult {
    let mut payload = Payload::new();
    payload.insert(key.to_string(), value);
    RawTaskResult {
        task: Some(TaskDescriptor {
            id: task_id.to_string(),
            task_type: task_type.to_string(),
        }),
        payload: Some(payload),
        ..Default::default()
    }
}

fn realtime_engine() -> SyncEngine<MemorySnapshotStore> {
    SyncEngine::new(SyncConfig::default(), MemorySnapshotStore::new())
}

#[tokio::test]
async fn test_ingest_stores_standardized_result() {
    init_tracing();
    let engine = realtime_engine();

    let result = engine
        .ingest("analysis", raw("t1", "revenue", "projection", FieldValue::Number(100.0)))
        .await
        .unwrap();

    assert_eq!(result.source_type, "analysis");
    assert_eq!(result.task_type, "revenue");
    // Base confidence for the analysis source type
    assert!((result.confidence - 0.90).abs() < 1e-9);

    let records = engine.query(Some("revenue")).await;
    assert_eq!(records.len(), 1);
    match &records[0] {
        StoreRecord::Standardized(stored) => assert_eq!(stored.id, result.id),
        other => panic!("expected standardized record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ingest_rejects_missing_payload() {
    init_tracing();
    let engine = realtime_engine();

    let malformed = RawTaskResult {
        task: Some(TaskDescriptor {
            id: "t1".to_string(),
            task_type: "revenue".to_string(),
        }),
        payload: None,
        ..Default::default()
    };

    match engine.ingest("analysis", malformed).await {
        Err(Error::Ingestion(_)) => {}
        other => panic!("expected ingestion error, got {:?}", other),
    }
    assert!(engine.query(None).await.is_empty());
}

#[tokio::test]
async fn test_cross_source_conflict_resolves_immediately() {
    init_tracing();
    let engine = realtime_engine();
    let mut rx = engine.subscribe();

    engine
        .ingest("analysis", raw("t1", "revenue", "projection", FieldValue::Number(100.0)))
        .await
        .unwrap();
    // 100 vs 150 is a 40% midpoint-relative difference
    engine
        .ingest("forecasting", raw("t1", "revenue", "projection", FieldValue::Number(150.0)))
        .await
        .unwrap();

    let records = engine.query(Some("revenue")).await;
    let resolved: Vec<_> = records
        .iter()
        .filter_map(|r| match r {
            StoreRecord::Fused(f) if f.kind == FusedKind::ResolvedConflict => Some(f),
            _ => None,
        })
        .collect();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].data_key.as_deref(), Some("projection"));
    assert_eq!(resolved[0].sources, vec!["forecasting", "analysis"]);

    // Weighted average: (100*0.90 + 150*0.65) / 1.55 = 120.97...
    match resolved[0].value {
        FusedValue::Scalar(v) => assert!((v - 120.967).abs() < 0.01),
        ref other => panic!("expected scalar, got {:?}", other),
    }

    // ResultReceived x2, then the resolution event
    let mut saw_resolution = false;
    while let Ok(event) = rx.try_recv() {
        if let SyncEvent::ConflictResolved { conflict_count, .. } = event {
            assert_eq!(conflict_count, 1);
            saw_resolution = true;
        }
    }
    assert!(saw_resolution);
}

#[tokio::test]
async fn test_agreeing_sources_both_stored() {
    init_tracing();
    let engine = realtime_engine();

    engine
        .ingest("analysis", raw("t1", "revenue", "projection", FieldValue::Number(100.0)))
        .await
        .unwrap();
    // 9.5% apart, below the threshold
    engine
        .ingest("forecasting", raw("t1", "revenue", "projection", FieldValue::Number(110.0)))
        .await
        .unwrap();

    let records = engine.query(Some("revenue")).await;
    let standardized = records
        .iter()
        .filter(|r| matches!(r, StoreRecord::Standardized(_)))
        .count();
    assert_eq!(standardized, 2);
    assert!(!records
        .iter()
        .any(|r| matches!(r, StoreRecord::Fused(f) if f.kind == FusedKind::ResolvedConflict)));
}

#[tokio::test]
async fn test_batch_mode_queues_until_cycle_runs() {
    init_tracing();
    let config = SyncConfig {
        real_time_sync: false,
        ..SyncConfig::default()
    };
    let engine = SyncEngine::new(config, MemorySnapshotStore::new());

    for n in 0..3 {
        engine
            .ingest(
                "analysis",
                raw(&format!("t{}", n), "metrics", "latency", FieldValue::Number(10.0 + n as f64)),
            )
            .await
            .unwrap();
    }

    let stats = engine.stats().await;
    assert_eq!(stats.queue_depth, 3);
    assert_eq!(stats.store_size, 0);
    assert!(stats.last_sync_time.is_none());

    let report = engine.run_batch_cycle_now().await.unwrap();
    assert_eq!(report.drained, 3);
    assert_eq!(report.groups, 1);

    let stats = engine.stats().await;
    assert_eq!(stats.queue_depth, 0);
    assert!(stats.last_sync_time.is_some());

    let records = engine.query(Some("metrics")).await;
    // 3 raw records + numeric fusion for the shared key
    assert_eq!(records.len(), 4);
    assert!(records
        .iter()
        .any(|r| matches!(r, StoreRecord::Fused(f) if f.kind == FusedKind::FusedNumeric)));
}

#[tokio::test]
async fn test_stats_track_lifecycle() {
    init_tracing();
    let engine = realtime_engine();
    assert!(!engine.stats().await.is_active);

    engine.start().await.unwrap();
    assert!(engine.stats().await.is_active);

    engine
        .ingest("analysis", raw("t1", "revenue", "projection", FieldValue::Number(1.0)))
        .await
        .unwrap();
    assert_eq!(engine.stats().await.total_ingested, 1);

    engine.shutdown().await;
    assert!(!engine.stats().await.is_active);
}

#[tokio::test]
async fn test_insights_fuse_across_sources() {
    init_tracing();
    let engine = realtime_engine();
    let mut rx = engine.subscribe();

    let mut first = raw("t1", "market", "trend", FieldValue::Text("up".into()));
    first.insights.push(Insight {
        category: "growth".to_string(),
        theme: "apac".to_string(),
        confidence: 0.8,
    });
    let mut second = raw("t1", "market", "trend", FieldValue::Text("up".into()));
    second.insights.push(Insight {
        category: "growth".to_string(),
        theme: "emea".to_string(),
        confidence: 0.6,
    });

    engine.ingest("research", first).await.unwrap();
    engine.ingest("reporting", second).await.unwrap();

    let groups = engine.insights(Some("market")).await;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].category, "growth");
    assert!(groups[0].themes.contains_key("apac"));
    assert!(groups[0].themes.contains_key("emea"));
    assert_eq!(groups[0].sources.len(), 2);

    let mut saw_insights = false;
    while let Ok(event) = rx.try_recv() {
        if let SyncEvent::InsightsGenerated { task_type, .. } = event {
            assert_eq!(task_type, "market");
            saw_insights = true;
        }
    }
    assert!(saw_insights);
}

#[tokio::test]
async fn test_snapshot_restore_round_trip() {
    init_tracing();
    // Clones of the memory store share the same artifacts
    let artifacts = MemorySnapshotStore::new();

    let engine = SyncEngine::new(SyncConfig::default(), artifacts.clone());
    engine
        .ingest("analysis", raw("t1", "revenue", "projection", FieldValue::Number(100.0)))
        .await
        .unwrap();
    engine
        .ingest("research", raw("t2", "market", "trend", FieldValue::Text("up".into())))
        .await
        .unwrap();
    let name = engine.snapshot_now().await.unwrap();
    assert!(name.starts_with("snapshot_") && name.ends_with(".json"));

    let restored = SyncEngine::new(SyncConfig::default(), artifacts);
    restored.start().await.unwrap();

    assert_eq!(restored.stats().await.store_size, 2);
    assert_eq!(restored.query(Some("revenue")).await.len(), 1);
    assert_eq!(restored.query(Some("market")).await.len(), 1);

    restored.shutdown().await;
}

#[tokio::test]
async fn test_snapshot_written_to_disk() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(
        SyncConfig::default(),
        FsSnapshotStore::new(dir.path().to_path_buf()),
    );
    let mut rx = engine.subscribe();

    engine
        .ingest("analysis", raw("t1", "revenue", "projection", FieldValue::Number(100.0)))
        .await
        .unwrap();
    let name = engine.snapshot_now().await.unwrap();

    assert!(dir.path().join(&name).is_file());

    let mut saw_snapshot = false;
    while let Ok(event) = rx.try_recv() {
        if let SyncEvent::SnapshotWritten { name: n, entry_count, .. } = event {
            assert_eq!(n, name);
            assert_eq!(entry_count, 1);
            saw_snapshot = true;
        }
    }
    assert!(saw_snapshot);
}

#[tokio::test]
async fn test_store_capacity_bounds_engine_growth() {
    init_tracing();
    let config = SyncConfig {
        store_capacity: 5,
        ..SyncConfig::default()
    };
    let engine = SyncEngine::new(config, MemorySnapshotStore::new());

    for n in 0..12 {
        engine
            .ingest(
                "analysis",
                raw(&format!("t{}", n), "metrics", "latency", FieldValue::Number(n as f64)),
            )
            .await
            .unwrap();
    }

    let stats = engine.stats().await;
    assert_eq!(stats.total_ingested, 12);
    assert!(stats.store_size <= 5);
}
