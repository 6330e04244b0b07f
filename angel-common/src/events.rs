//! Event types and EventBus for the synchronization engine
//!
//! Subscribers receive events over a tokio broadcast channel: publishing
//! never blocks on a slow subscriber, and one subscriber failing or lagging
//! cannot abort delivery to the others.

use crate::types::{FusedRecord, InsightGroup, StandardizedResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Engine event types
///
/// Events are broadcast via [`EventBus`] and can be serialized for
/// downstream transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A raw result was normalized and accepted for synchronization
    ResultReceived {
        result: StandardizedResult,
    },

    /// Disagreeing results were reconciled into a single record
    ConflictResolved {
        resolved: FusedRecord,
        /// Number of prior records that conflicted with the new result
        conflict_count: usize,
    },

    /// Insight fusion produced (or refreshed) groups for a task type
    InsightsGenerated {
        task_type: String,
        groups: Vec<InsightGroup>,
    },

    /// A snapshot artifact was written to durable storage
    SnapshotWritten {
        name: String,
        entry_count: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`, providing non-blocking publish,
/// multiple concurrent subscribers, and automatic cleanup when
/// subscribers drop.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    ///
    /// Old events are dropped for subscribers that lag beyond `capacity`.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the subscriber count, or `Err` when nobody is listening.
    /// Callers that treat events as best-effort observability can ignore
    /// the error.
    pub fn emit(
        &self,
        event: SyncEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
