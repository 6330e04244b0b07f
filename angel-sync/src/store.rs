//! Central Store - bounded, insertion-ordered record map
//!
//! Holds the latest standardized and fused records under generated keys.
//! When an insert would exceed capacity the oldest entry by insertion
//! order is evicted (FIFO, not LRU). Queries return point-in-time copies,
//! never live references.

use angel_common::types::StoreRecord;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

pub struct CentralStore {
    records: HashMap<String, StoreRecord>,
    /// Insertion order of keys; front is the oldest
    order: VecDeque<String>,
    capacity: usize,
}

impl CentralStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Insert or overwrite a record, evicting the oldest entry beyond capacity
    ///
    /// Overwriting an existing key keeps its original insertion position
    /// (Map semantics). The size invariant `len() <= capacity` holds after
    /// every call.
    pub fn put(&mut self, key: String, record: StoreRecord) {
        if self.records.insert(key.clone(), record).is_none() {
            self.order.push_back(key);
        }

        while self.records.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.records.remove(&oldest);
                debug!(key = %oldest, "Evicted oldest store entry");
            } else {
                break;
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&StoreRecord> {
        self.records.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Records matching `task_type` (all records when `None`), cloned in
    /// insertion order
    pub fn query(&self, task_type: Option<&str>) -> Vec<StoreRecord> {
        self.order
            .iter()
            .filter_map(|key| self.records.get(key))
            .filter(|record| task_type.map(|t| record.task_type() == t).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count records for a task type without cloning
    pub fn count_for_task_type(&self, task_type: &str) -> usize {
        self.records
            .values()
            .filter(|r| r.task_type() == task_type)
            .count()
    }

    /// Snapshot view: (key, record) pairs in insertion order
    pub fn entries(&self) -> Vec<(String, StoreRecord)> {
        self.order
            .iter()
            .filter_map(|key| self.records.get(key).map(|r| (key.clone(), r.clone())))
            .collect()
    }

    /// Replace contents from snapshot entries, re-applying the capacity bound
    pub fn restore(&mut self, entries: Vec<(String, StoreRecord)>) {
        self.records.clear();
        self.order.clear();
        for (key, record) in entries {
            self.put(key, record);
        }
    }
}
