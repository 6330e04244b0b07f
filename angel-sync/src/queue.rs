//! Sync queue - FIFO backlog of results awaiting batch processing
//!
//! Not capacity-limited by design: the scheduler drains a fixed-size batch
//! each cycle, and depth is exposed through engine stats for monitoring.

use angel_common::types::StandardizedResult;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct SyncQueue {
    items: VecDeque<StandardizedResult>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: StandardizedResult) {
        self.items.push_back(result);
    }

    /// Remove and return up to `n` results from the front
    pub fn drain_batch(&mut self, n: usize) -> Vec<StandardizedResult> {
        let count = n.min(self.items.len());
        self.items.drain(..count).collect()
    }

    /// Return a failed batch to the front, preserving its original order
    ///
    /// The next cycle retries the same results first (at-least-once).
    pub fn requeue_front(&mut self, batch: Vec<StandardizedResult>) {
        for result in batch.into_iter().rev() {
            self.items.push_front(result);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
