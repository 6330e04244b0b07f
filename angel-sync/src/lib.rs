//! angel-sync - Multi-Source Result Synchronization Engine
//!
//! Accepts results produced independently by many specialized sources over
//! a shared task space, detects cross-source disagreement, reconciles it
//! with a selectable strategy, and maintains a bounded, queryable store of
//! the reconciled knowledge with durable snapshots for recovery.
//!
//! Pipeline: raw result -> normalizer -> (immediate path) conflict
//! detector -> resolver / fusion -> central store, or (batch path) backlog
//! queue -> scheduler -> fusion -> central store. The snapshot manager
//! reads the store on its own cadence.

pub mod conflict;
pub mod engine;
pub mod fusion;
pub mod normalizer;
pub mod queue;
pub mod scheduler;
pub mod snapshot;
pub mod store;

pub use engine::{EngineStats, SyncEngine};
pub use snapshot::{FsSnapshotStore, MemorySnapshotStore, SnapshotStore};
