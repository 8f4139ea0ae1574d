//! Bounded local transaction store.
//!
//! RULE: only the store mutates its records. The controller appends;
//! the resync coordinator flips `synced`. Queries hand out cloned
//! snapshots, so no caller can observe a half-written append.
//!
//! Capacity is hard-bounded at [`STORE_CAPACITY`]; eviction removes
//! strictly the oldest record by timestamp, one at a time, until the
//! bound holds again.

use crate::transaction::TransactionRecord;
use crate::types::EpochSecs;
use std::collections::VecDeque;
use uuid::Uuid;

pub const STORE_CAPACITY: usize = 100;

/// 24 h window backing the `today` query.
const TODAY_WINDOW_SECS: u64 = 24 * 3600;

pub struct TransactionStore {
    records: VecDeque<TransactionRecord>,
    capacity: usize,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::with_capacity(STORE_CAPACITY)
    }

    /// Non-default capacity is for tests only; the device always runs
    /// with [`STORE_CAPACITY`].
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "store capacity must be positive");
        Self {
            records: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a record, assigning an id when absent, then evict the
    /// oldest records until the store is back within capacity.
    /// Returns a reference to the stored record (with its final id).
    pub fn append(&mut self, mut record: TransactionRecord) -> &TransactionRecord {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        self.records.push_back(record);

        while self.records.len() > self.capacity {
            if let Some(evicted) = self.evict_oldest() {
                log::debug!(
                    "Store: evicted {} (ts {})",
                    evicted.id,
                    evicted.timestamp
                );
            }
        }

        // Just pushed, so the back always exists.
        self.records.back().unwrap()
    }

    fn evict_oldest(&mut self) -> Option<TransactionRecord> {
        let oldest = self
            .records
            .iter()
            .enumerate()
            .min_by_key(|(_, r)| r.timestamp)
            .map(|(i, _)| i)?;
        self.records.remove(oldest)
    }

    /// Records within the trailing window, in arrival order.
    pub fn recent(&self, window_secs: u64, now_secs: EpochSecs) -> Vec<TransactionRecord> {
        let cutoff = now_secs.saturating_sub(window_secs);
        self.records
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// This student's records in the last 24 hours, in arrival order.
    pub fn today(&self, student_id: &str, now_secs: EpochSecs) -> Vec<TransactionRecord> {
        let cutoff = now_secs.saturating_sub(TODAY_WINDOW_SECS);
        self.records
            .iter()
            .filter(|r| r.student_id == student_id && r.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// All records not yet acknowledged by the backend, in arrival order.
    pub fn unsynced(&self) -> Vec<TransactionRecord> {
        self.records.iter().filter(|r| !r.synced).cloned().collect()
    }

    /// Flip `synced` to true for the given id. Monotonic — a record
    /// never goes back to unsynced. Returns false if the id is absent
    /// (it may have been evicted since it was queued).
    pub fn mark_synced(&mut self, id: &str) -> bool {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.synced = true;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Read-only view of everything currently held, in arrival order.
    pub fn records(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.records.iter()
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}
