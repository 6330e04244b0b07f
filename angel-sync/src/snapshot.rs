//! Snapshot Manager - durable checkpoints of the central store
//!
//! On each cycle the full central store plus the bounded per-source
//! history is serialized to a uniquely named artifact, then old artifacts
//! are pruned so only the most recent remain. At startup the most recent
//! artifact (if any) is restored; failures there mean a cold start, never
//! a crash.
//!
//! Storage is a trait seam: the engine assumes a durable key-value store
//! and does not design one. A filesystem store and an in-memory store
//! (tests, ephemeral deployments) are provided.

use angel_common::types::{StandardizedResult, StoreRecord};
use angel_common::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Snapshot artifact format version; readers reject any other version
pub const FORMAT_VERSION: u32 = 1;

const ARTIFACT_PREFIX: &str = "snapshot_";
const ARTIFACT_SUFFIX: &str = ".json";

/// Serialized snapshot contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    /// Central store entries in insertion order
    pub store_entries: Vec<(String, StoreRecord)>,
    /// Bounded recent history per source type
    pub source_history: BTreeMap<String, Vec<StandardizedResult>>,
}

/// Durable artifact storage for snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<()>;
    async fn read(&self, name: &str) -> Result<Vec<u8>>;
    /// All artifact names, unordered
    async fn list(&self) -> Result<Vec<String>>;
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Filesystem-backed snapshot store (one file per artifact)
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(name), bytes).await?;
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.dir.join(name)).await?)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            // Directory not created yet: no artifacts
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(Error::Io(e)),
        };
        while let Some(entry) = dir.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(ARTIFACT_PREFIX) && name.ends_with(ARTIFACT_SUFFIX) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        tokio::fs::remove_file(self.dir.join(name)).await?;
        Ok(())
    }
}

/// In-memory snapshot store for tests and ephemeral deployments
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    artifacts: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.artifacts
            .lock()
            .expect("snapshot store lock poisoned")
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.artifacts
            .lock()
            .expect("snapshot store lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Persistence(format!("No such artifact: {}", name)))
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .artifacts
            .lock()
            .expect("snapshot store lock poisoned")
            .keys()
            .cloned()
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.artifacts
            .lock()
            .expect("snapshot store lock poisoned")
            .remove(name);
        Ok(())
    }
}

/// Writes, prunes, and restores snapshot artifacts
pub struct SnapshotManager<S: SnapshotStore> {
    store: S,
    max_snapshots: usize,
    /// Last embedded timestamp, to keep artifact names strictly increasing
    /// even when two cycles land in the same millisecond
    last_millis: AtomicI64,
}

impl<S: SnapshotStore> SnapshotManager<S> {
    pub fn new(store: S, max_snapshots: usize) -> Self {
        Self {
            store,
            max_snapshots: max_snapshots.max(1),
            last_millis: AtomicI64::new(0),
        }
    }

    /// Serialize and write one snapshot, then prune old artifacts
    ///
    /// Returns the artifact name. Pruning failures are logged and do not
    /// fail the write.
    pub async fn write_snapshot(
        &self,
        store_entries: Vec<(String, StoreRecord)>,
        source_history: BTreeMap<String, Vec<StandardizedResult>>,
    ) -> Result<String> {
        let now = Utc::now();
        let millis = self.next_millis(now.timestamp_millis());
        let name = format!("{}{:013}{}", ARTIFACT_PREFIX, millis, ARTIFACT_SUFFIX);

        let file = SnapshotFile {
            format_version: FORMAT_VERSION,
            created_at: now,
            store_entries,
            source_history,
        };
        let bytes = serde_json::to_vec(&file)?;
        self.store.write(&name, &bytes).await?;

        debug!(
            name = %name,
            entries = file.store_entries.len(),
            "Snapshot written"
        );

        if let Err(e) = self.prune().await {
            warn!(error = %e, "Snapshot pruning failed, continuing");
        }

        Ok(name)
    }

    /// Delete all but the most recent `max_snapshots` artifacts
    ///
    /// Artifact names embed a zero-padded creation timestamp, so name
    /// order is creation order.
    pub async fn prune(&self) -> Result<()> {
        let mut names = self.store.list().await?;
        if names.len() <= self.max_snapshots {
            return Ok(());
        }

        names.sort();
        let excess = names.len() - self.max_snapshots;
        for name in names.iter().take(excess) {
            self.store.delete(name).await?;
            debug!(name = %name, "Pruned old snapshot");
        }
        Ok(())
    }

    /// Load the most recent snapshot, if any exists
    ///
    /// Returns `Ok(None)` when storage holds no artifacts. A corrupt or
    /// version-mismatched artifact is an error; callers treat it as a
    /// cold start.
    pub async fn restore_latest(&self) -> Result<Option<SnapshotFile>> {
        let mut names = self.store.list().await?;
        if names.is_empty() {
            return Ok(None);
        }
        names.sort();
        let latest = names.last().expect("names is non-empty");

        let bytes = self.store.read(latest).await?;
        let file: SnapshotFile = serde_json::from_slice(&bytes)?;

        if file.format_version != FORMAT_VERSION {
            return Err(Error::Persistence(format!(
                "Unsupported snapshot format version {} in {} (expected {})",
                file.format_version, latest, FORMAT_VERSION
            )));
        }

        info!(
            name = %latest,
            entries = file.store_entries.len(),
            created_at = %file.created_at,
            "Restored snapshot"
        );

        Ok(Some(file))
    }

    fn next_millis(&self, now: i64) -> i64 {
        let mut last = self.last_millis.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_millis.compare_exchange(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}
