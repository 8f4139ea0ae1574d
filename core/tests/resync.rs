//! Resync coordinator tests — idempotent no-op, all-or-nothing batches,
//! retry pacing.

mod common;

use common::{record, MockBackend, SyncReply};
use kiosk_core::hardware::ApiError;
use kiosk_core::resync::{ResyncCoordinator, SyncOutcome, RESYNC_INTERVAL_MS};
use kiosk_core::store::TransactionStore;
use kiosk_core::transaction::TransactionStatus;

fn stored(store: &mut TransactionStore, student: &str, ts: u64) -> kiosk_core::transaction::TransactionRecord {
    store.append(record(student, TransactionStatus::Approved, ts)).clone()
}

/// Empty queue: no network call, no state change.
#[test]
fn empty_queue_sync_is_a_noop() {
    let mut coordinator = ResyncCoordinator::new();
    let mut store = TransactionStore::new();
    let mut backend = MockBackend::online(Err(ApiError::Unreachable));

    assert_eq!(coordinator.sync_now(0, &mut store, &mut backend), None);
    assert_eq!(coordinator.maybe_sync(0, &mut store, &mut backend), None);
    assert_eq!(backend.sync_calls, 0);
}

#[test]
fn successful_batch_marks_synced_and_empties_queue() {
    let mut coordinator = ResyncCoordinator::new();
    let mut store = TransactionStore::new();
    let mut backend = MockBackend::online(Err(ApiError::Unreachable));

    let a = stored(&mut store, "S1", 100);
    let b = stored(&mut store, "S2", 200);
    coordinator.enqueue(a);
    coordinator.enqueue(b);

    let outcome = coordinator.sync_now(1_000, &mut store, &mut backend);
    assert_eq!(outcome, Some(SyncOutcome::Completed { uploaded: 2 }));
    assert_eq!(coordinator.pending(), 0);
    assert_eq!(backend.last_batch_len, 2);
    assert!(store.unsynced().is_empty());
}

#[test]
fn failed_batch_leaves_queue_intact() {
    let mut coordinator = ResyncCoordinator::new();
    let mut store = TransactionStore::new();
    let mut backend = MockBackend::online(Err(ApiError::Unreachable));
    backend.sync_reply = SyncReply::Fail(ApiError::Timeout);

    let a = stored(&mut store, "S1", 100);
    coordinator.enqueue(a);

    let outcome = coordinator.sync_now(1_000, &mut store, &mut backend);
    assert_eq!(outcome, Some(SyncOutcome::Deferred { queued: 1 }));
    assert_eq!(coordinator.pending(), 1);
    assert_eq!(store.unsynced().len(), 1);
}

/// Partial acknowledgement counts as failure: retry the whole batch.
#[test]
fn partial_acknowledgement_is_retried() {
    let mut coordinator = ResyncCoordinator::new();
    let mut store = TransactionStore::new();
    let mut backend = MockBackend::online(Err(ApiError::Unreachable));
    backend.sync_reply = SyncReply::Accept(1);

    coordinator.enqueue(stored(&mut store, "S1", 100));
    coordinator.enqueue(stored(&mut store, "S2", 200));

    let outcome = coordinator.sync_now(1_000, &mut store, &mut backend);
    assert_eq!(outcome, Some(SyncOutcome::Deferred { queued: 2 }));
    assert_eq!(store.unsynced().len(), 2);
}

#[test]
fn disconnected_backend_is_not_an_attempt() {
    let mut coordinator = ResyncCoordinator::new();
    let mut store = TransactionStore::new();
    let mut backend = MockBackend::offline();

    coordinator.enqueue(stored(&mut store, "S1", 100));

    assert_eq!(coordinator.sync_now(1_000, &mut store, &mut backend), None);
    assert_eq!(backend.sync_calls, 0);
    assert_eq!(coordinator.pending(), 1);
}

/// The periodic path rate-limits to one attempt per interval; a failed
/// attempt is retried once the interval has passed.
#[test]
fn periodic_attempts_respect_the_interval() {
    let mut coordinator = ResyncCoordinator::new();
    let mut store = TransactionStore::new();
    let mut backend = MockBackend::online(Err(ApiError::Unreachable));
    backend.sync_reply = SyncReply::Fail(ApiError::Unreachable);

    coordinator.enqueue(stored(&mut store, "S1", 100));

    // First attempt runs immediately.
    assert!(coordinator.maybe_sync(1_000, &mut store, &mut backend).is_some());
    assert_eq!(backend.sync_calls, 1);

    // Within the interval: suppressed.
    assert_eq!(
        coordinator.maybe_sync(1_000 + RESYNC_INTERVAL_MS - 1, &mut store, &mut backend),
        None
    );
    assert_eq!(backend.sync_calls, 1);

    // Interval elapsed: retried, and this time it succeeds.
    backend.sync_reply = SyncReply::AcceptAll;
    let outcome = coordinator.maybe_sync(1_000 + RESYNC_INTERVAL_MS, &mut store, &mut backend);
    assert_eq!(outcome, Some(SyncOutcome::Completed { uploaded: 1 }));
    assert_eq!(backend.sync_calls, 2);
}

/// A queued record evicted from the store before sync still uploads;
/// only the mark-synced step is skipped.
#[test]
fn evicted_records_still_upload() {
    let mut coordinator = ResyncCoordinator::new();
    let mut store = TransactionStore::with_capacity(1);
    let mut backend = MockBackend::online(Err(ApiError::Unreachable));

    let old = stored(&mut store, "S1", 100);
    coordinator.enqueue(old);
    stored(&mut store, "S2", 200); // evicts S1's record

    let outcome = coordinator.sync_now(1_000, &mut store, &mut backend);
    assert_eq!(outcome, Some(SyncOutcome::Completed { uploaded: 1 }));
    assert_eq!(coordinator.pending(), 0);
}
