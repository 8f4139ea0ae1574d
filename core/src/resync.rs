//! Offline resynchronization — batched upload of locally recorded
//! transactions once connectivity returns.
//!
//! The coordinator keeps its own FIFO queue, separate from the store.
//! One attempt uploads the entire queue as a single batch; the batch
//! is all-or-nothing from this layer's perspective. The backend may
//! report a partial count, but anything short of the full batch
//! leaves the queue intact for the next attempt.

use crate::hardware::Backend;
use crate::store::TransactionStore;
use crate::transaction::TransactionRecord;
use crate::types::Millis;
use std::collections::VecDeque;

/// Minimum spacing between periodic attempts.
pub const RESYNC_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every queued record was accepted and marked synced.
    Completed { uploaded: usize },
    /// The attempt ran and failed (or was only partially accepted);
    /// the queue is unchanged.
    Deferred { queued: usize },
}

pub struct ResyncCoordinator {
    queue: VecDeque<TransactionRecord>,
    last_attempt_ms: Option<Millis>,
}

impl ResyncCoordinator {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            last_attempt_ms: None,
        }
    }

    /// Queue a record for upload. Called after the record has been
    /// appended to the store — never before.
    pub fn enqueue(&mut self, record: TransactionRecord) {
        log::info!("Resync: queued transaction {}", record.id);
        self.queue.push_back(record);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Periodic entry point, called every tick. Rate-limits to one
    /// attempt per [`RESYNC_INTERVAL_MS`]. Returns `None` when nothing
    /// was attempted.
    pub fn maybe_sync(
        &mut self,
        now_ms: Millis,
        store: &mut TransactionStore,
        backend: &mut dyn Backend,
    ) -> Option<SyncOutcome> {
        if self.queue.is_empty() {
            return None;
        }
        if let Some(last) = self.last_attempt_ms {
            if now_ms.saturating_sub(last) < RESYNC_INTERVAL_MS {
                return None;
            }
        }
        self.sync_now(now_ms, store, backend)
    }

    /// Attempt one batched upload immediately. An empty queue is a
    /// no-op: no network call, no state change.
    pub fn sync_now(
        &mut self,
        now_ms: Millis,
        store: &mut TransactionStore,
        backend: &mut dyn Backend,
    ) -> Option<SyncOutcome> {
        if self.queue.is_empty() {
            return None;
        }
        if !backend.is_connected() {
            // Not an attempt — don't burn the rate limit while offline.
            return None;
        }

        self.last_attempt_ms = Some(now_ms);
        let batch: Vec<TransactionRecord> = self.queue.iter().cloned().collect();
        log::info!("Resync: uploading {} transaction(s)", batch.len());

        match backend.sync_batch(&batch) {
            Ok(accepted) if accepted == batch.len() => {
                for record in &batch {
                    if !store.mark_synced(&record.id) {
                        // Evicted from the store since queueing; the
                        // upload itself still succeeded.
                        log::debug!("Resync: {} no longer in store", record.id);
                    }
                }
                self.queue.clear();
                log::info!("Resync: all {accepted} transaction(s) synced");
                Some(SyncOutcome::Completed { uploaded: accepted })
            }
            Ok(accepted) => {
                log::warn!(
                    "Resync: partial acknowledgement ({accepted}/{}), will retry",
                    batch.len()
                );
                Some(SyncOutcome::Deferred {
                    queued: self.queue.len(),
                })
            }
            Err(e) => {
                log::warn!("Resync: upload failed ({e}), will retry");
                Some(SyncOutcome::Deferred {
                    queued: self.queue.len(),
                })
            }
        }
    }
}

impl Default for ResyncCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
