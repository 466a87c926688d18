//! Dispatcher scenarios against in-memory collaborators.
//!
//! Run with: cargo test -p domain --test dispatch_scenarios

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use domain::models::{LargeText, QueueStatus, RowValue, SendStatus};
use domain::services::{DispatcherSettings, EntryOutcome, QueueStore, TransportError};
use support::{detail_row, queue_entry, settings, Harness};
use uuid::Uuid;

fn harness_with_entry(id: i64, retry_count: i32) -> Harness {
    let harness = Harness::new();
    harness
        .recipients
        .set("ORDER_DELAY", &["ops@example.com"], &["lead@example.com"]);
    harness
        .store
        .register_query("orders.delayed", vec![detail_row("A-100", 2)]);
    harness
        .store
        .insert(queue_entry(id, "ORDER_DELAY", retry_count));
    harness
}

// ============================================================================
// Success path
// ============================================================================

#[tokio::test]
async fn test_pending_entry_is_sent_and_logged() {
    let harness = harness_with_entry(1, 0);
    let dispatcher = harness.dispatcher(settings(3));

    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.sent, 1);

    let entry = harness.store.get(1);
    assert_eq!(entry.status, QueueStatus::Success);
    assert!(entry.error_message.is_none());
    assert_eq!(entry.retry_count, 0);

    let sent = harness.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "[CRITICAL] Alarm 1");
    assert_eq!(sent[0].to[0].email, "ops@example.com");
    assert_eq!(sent[0].cc[0].email, "lead@example.com");
    assert_eq!(
        sent[0].body_html,
        "Delayed orders|Orders below are late.|order_no,delay_days,note|A-100,2,"
    );

    let logs = harness.send_log.entries();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].send_status, SendStatus::Success);
    assert_eq!(logs[0].mail_source, "ORDER_DELAY");
    assert_eq!(logs[0].recipients, "ops@example.com");
    assert_eq!(logs[0].cc_recipients.as_deref(), Some("lead@example.com"));
    assert_eq!(logs[0].sender_email, "alerts@example.com");
    assert_eq!(logs[0].ip_address.as_deref(), Some("10.0.0.5"));
    assert!(logs[0].error_message.is_none());
}

#[tokio::test]
async fn test_terminal_entries_are_not_reprocessed() {
    let harness = harness_with_entry(1, 0);
    let dispatcher = harness.dispatcher(settings(3));

    dispatcher.run_cycle().await.unwrap();
    let second = dispatcher.run_cycle().await.unwrap();

    assert_eq!(second.fetched, 0);
    assert_eq!(harness.transport.attempts(), 1);
    assert_eq!(harness.send_log.entries().len(), 1);
}

#[tokio::test]
async fn test_oldest_entries_are_sent_first() {
    let harness = Harness::new();
    harness.recipients.set("ORDER_DELAY", &["ops@example.com"], &[]);
    harness.store.register_query("orders.delayed", vec![]);
    // Lower ids are older
    harness.store.insert(queue_entry(30, "ORDER_DELAY", 0));
    harness.store.insert(queue_entry(10, "ORDER_DELAY", 0));
    harness.store.insert(queue_entry(20, "ORDER_DELAY", 0));

    let dispatcher = harness.dispatcher(settings(3));
    dispatcher.run_cycle().await.unwrap();

    let subjects: Vec<String> = harness
        .transport
        .sent()
        .into_iter()
        .map(|m| m.subject)
        .collect();
    assert_eq!(
        subjects,
        vec!["[CRITICAL] Alarm 10", "[CRITICAL] Alarm 20", "[CRITICAL] Alarm 30"]
    );
}

#[tokio::test]
async fn test_batch_size_bounds_a_cycle() {
    let harness = Harness::new();
    harness.recipients.set("ORDER_DELAY", &["ops@example.com"], &[]);
    harness.store.register_query("orders.delayed", vec![]);
    for id in 1..=5 {
        harness.store.insert(queue_entry(id, "ORDER_DELAY", 0));
    }

    let mut cfg = settings(3);
    cfg.batch_size = 2;
    let dispatcher = harness.dispatcher(cfg);

    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(harness.store.get(1).status, QueueStatus::Success);
    assert_eq!(harness.store.get(2).status, QueueStatus::Success);
    assert_eq!(harness.store.get(3).status, QueueStatus::Pending);
}

// ============================================================================
// Retry state machine
// ============================================================================

#[tokio::test]
async fn test_retry_ceiling_scenario() {
    let harness = harness_with_entry(1, 2);
    let dispatcher = harness.dispatcher(settings(3));

    harness
        .transport
        .push_result(Err(TransportError::SendFailed("connection refused".into())));
    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.retrying, 1);

    let entry = harness.store.get(1);
    assert_eq!(entry.status, QueueStatus::Pending);
    assert_eq!(entry.retry_count, 3);
    assert!(harness.send_log.entries().is_empty());
    assert!(harness.store.claimed_by(1).is_none());

    harness.transport.push_result(Err(TransportError::Timeout));
    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.failed, 1);

    let entry = harness.store.get(1);
    assert_eq!(entry.status, QueueStatus::Failed);
    assert!(entry.retry_count >= 3);
    let error_message = entry.error_message.expect("error recorded");
    assert!(error_message.contains("timed out"));

    let logs = harness.send_log.entries();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].send_status, SendStatus::Failure);
    assert_eq!(logs[0].error_message.as_deref(), Some(error_message.as_str()));
    assert_eq!(logs[0].retry_count, entry.retry_count);
}

#[tokio::test]
async fn test_retriable_failure_is_not_retried_within_the_cycle() {
    let harness = harness_with_entry(1, 0);
    let dispatcher = harness.dispatcher(settings(3));
    harness
        .transport
        .push_result(Err(TransportError::Provider("451 try later".into())));

    let report = dispatcher.run_cycle().await.unwrap();

    assert_eq!(report.retrying, 1);
    assert_eq!(harness.transport.attempts(), 1);
    assert_eq!(harness.store.get(1).retry_count, 1);
}

#[tokio::test]
async fn test_retry_then_success_keeps_last_error_text() {
    let harness = harness_with_entry(1, 0);
    let dispatcher = harness.dispatcher(settings(3));
    harness
        .transport
        .push_result(Err(TransportError::SendFailed("greylisted".into())));

    dispatcher.run_cycle().await.unwrap();
    dispatcher.run_cycle().await.unwrap();

    let entry = harness.store.get(1);
    assert_eq!(entry.status, QueueStatus::Success);
    assert_eq!(entry.retry_count, 1);
    assert!(entry.error_message.unwrap().contains("greylisted"));

    let logs = harness.send_log.entries();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].send_status, SendStatus::Success);
    assert_eq!(logs[0].retry_count, 1);
}

// ============================================================================
// Non-retriable failures
// ============================================================================

#[tokio::test]
async fn test_malformed_recipient_fails_immediately() {
    let harness = Harness::new();
    harness
        .recipients
        .set("ORDER_DELAY", &["ops@example.com", "not-an-address"], &[]);
    harness.store.register_query("orders.delayed", vec![]);
    harness.store.insert(queue_entry(1, "ORDER_DELAY", 0));

    let dispatcher = harness.dispatcher(settings(3));
    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.failed, 1);

    let entry = harness.store.get(1);
    assert_eq!(entry.status, QueueStatus::Failed);
    assert_eq!(entry.retry_count, 0);
    assert!(entry
        .error_message
        .as_deref()
        .unwrap()
        .contains("not-an-address"));

    assert_eq!(harness.transport.attempts(), 0);
    let logs = harness.send_log.entries();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].send_status, SendStatus::Failure);
    assert_eq!(logs[0].retry_count, 0);
}

#[tokio::test]
async fn test_missing_recipient_configuration_fails_immediately() {
    let harness = Harness::new();
    harness.store.register_query("orders.delayed", vec![]);
    harness.store.insert(queue_entry(1, "UNKNOWN_SOURCE", 1));

    let dispatcher = harness.dispatcher(settings(3));
    let outcome = dispatcher.process_entry(&harness.store.get(1)).await;

    assert_eq!(outcome, EntryOutcome::Failed { retry_count: 1 });
    let entry = harness.store.get(1);
    assert_eq!(entry.status, QueueStatus::Failed);
    assert!(entry.error_message.unwrap().contains("empty"));
}

#[tokio::test]
async fn test_duplicate_between_to_and_cc_fails() {
    let harness = Harness::new();
    harness
        .recipients
        .set("ORDER_DELAY", &["ops@example.com"], &["OPS@example.com"]);
    harness.store.register_query("orders.delayed", vec![]);
    harness.store.insert(queue_entry(1, "ORDER_DELAY", 0));

    let dispatcher = harness.dispatcher(settings(3));
    dispatcher.run_cycle().await.unwrap();

    assert_eq!(harness.store.get(1).status, QueueStatus::Failed);
    assert_eq!(harness.transport.attempts(), 0);
}

// ============================================================================
// Content and detail resolution failures
// ============================================================================

#[derive(Debug)]
struct UnreadableLob;

impl LargeText for UnreadableLob {
    fn handle(&self) -> String {
        "lo:77".to_string()
    }

    fn length(&self) -> std::io::Result<u64> {
        Ok(128)
    }

    fn read(&self, _len: u64) -> std::io::Result<String> {
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "large object stream reset",
        ))
    }
}

#[tokio::test]
async fn test_content_read_error_is_retriable() {
    let harness = Harness::new();
    harness.recipients.set("ORDER_DELAY", &["ops@example.com"], &[]);
    harness.store.register_query("orders.delayed", vec![]);
    let mut entry = queue_entry(1, "ORDER_DELAY", 0);
    entry.section_content = RowValue::LargeText(Arc::new(UnreadableLob));
    harness.store.insert(entry);

    let dispatcher = harness.dispatcher(settings(3));
    let report = dispatcher.run_cycle().await.unwrap();

    assert_eq!(report.retrying, 1);
    let entry = harness.store.get(1);
    assert_eq!(entry.status, QueueStatus::Pending);
    assert_eq!(entry.retry_count, 1);
    assert!(entry.error_message.unwrap().contains("lo:77"));
    assert_eq!(harness.transport.attempts(), 0);
}

#[tokio::test]
async fn test_unknown_detail_query_is_a_delivery_failure() {
    let harness = Harness::new();
    harness.recipients.set("ORDER_DELAY", &["ops@example.com"], &[]);
    harness.store.insert(queue_entry(1, "ORDER_DELAY", 3));

    let dispatcher = harness.dispatcher(settings(3));
    let report = dispatcher.run_cycle().await.unwrap();

    assert_eq!(report.failed, 1);
    let entry = harness.store.get(1);
    assert_eq!(entry.status, QueueStatus::Failed);
    assert!(entry.error_message.unwrap().contains("orders.delayed"));
    assert_eq!(harness.send_log.entries().len(), 1);
}

#[tokio::test]
async fn test_one_failing_entry_does_not_abort_the_batch() {
    let harness = Harness::new();
    harness.recipients.set("ORDER_DELAY", &["ops@example.com"], &[]);
    harness.recipients.set("BROKEN", &["broken@"], &[]);
    harness.store.register_query("orders.delayed", vec![]);
    harness.store.insert(queue_entry(1, "ORDER_DELAY", 0));
    harness.store.insert(queue_entry(2, "BROKEN", 0));
    harness.store.insert(queue_entry(3, "ORDER_DELAY", 0));

    let dispatcher = harness.dispatcher(settings(3));
    let report = dispatcher.run_cycle().await.unwrap();

    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(harness.store.get(1).status, QueueStatus::Success);
    assert_eq!(harness.store.get(2).status, QueueStatus::Failed);
    assert_eq!(harness.store.get(3).status, QueueStatus::Success);
}

// ============================================================================
// Persistence failures around a send
// ============================================================================

#[tokio::test]
async fn test_send_log_failure_does_not_change_outcome() {
    let harness = harness_with_entry(1, 0);
    harness.send_log.fail_writes.store(true, Ordering::SeqCst);

    let dispatcher = harness.dispatcher(settings(3));
    let outcome = dispatcher.process_entry(&harness.store.get(1)).await;

    assert_eq!(outcome, EntryOutcome::Sent);
    assert_eq!(harness.store.get(1).status, QueueStatus::Success);
    assert_eq!(harness.transport.attempts(), 1);
}

#[tokio::test]
async fn test_queue_update_failure_after_send_is_not_resent() {
    let harness = harness_with_entry(1, 0);
    harness.store.fail_mark_success.store(true, Ordering::SeqCst);

    let dispatcher = harness.dispatcher(settings(3));
    let report = dispatcher.run_cycle().await.unwrap();

    assert_eq!(report.sent, 1);
    assert_eq!(harness.transport.attempts(), 1);

    let logs = harness.send_log.entries();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].send_status, SendStatus::Success);

    // Row stays pending, still owned by this worker and flagged as sent
    let entry = harness.store.get(1);
    assert_eq!(entry.status, QueueStatus::Pending);
    assert_eq!(entry.retry_count, 0);
    assert_eq!(harness.store.claimed_by(1), Some(dispatcher.worker_id()));
    assert!(harness.store.is_held_sent(1));
    assert!(dispatcher.unrecorded_sends().contains(1));

    let next = dispatcher.run_cycle().await.unwrap();
    assert_eq!(next.fetched, 0);
    assert_eq!(harness.transport.attempts(), 1);
}

fn short_lease() -> DispatcherSettings {
    DispatcherSettings {
        claim_lease: Duration::from_millis(50),
        ..settings(3)
    }
}

#[tokio::test]
async fn test_sent_entry_stays_unclaimable_after_lease_expiry() {
    let harness = harness_with_entry(1, 0);
    harness.store.fail_mark_success.store(true, Ordering::SeqCst);

    let first = harness.dispatcher(short_lease());
    assert_eq!(first.run_cycle().await.unwrap().sent, 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.store.fail_mark_success.store(false, Ordering::SeqCst);

    let second = harness.dispatcher(short_lease());
    let report = second.run_cycle().await.unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(report.sent, 0);
    assert_eq!(harness.transport.attempts(), 1);
    assert_eq!(harness.send_log.entries().len(), 1);

    // The sending worker records SUCCESS once the store is writable again
    first.run_cycle().await.unwrap();
    assert_eq!(harness.store.get(1).status, QueueStatus::Success);
    assert!(first.unrecorded_sends().is_empty());
    assert_eq!(harness.transport.attempts(), 1);
}

#[tokio::test]
async fn test_sent_entry_is_not_resent_when_store_stays_unwritable() {
    let harness = harness_with_entry(1, 0);
    harness.store.fail_mark_success.store(true, Ordering::SeqCst);
    harness.store.fail_hold_sent.store(true, Ordering::SeqCst);

    let first = harness.dispatcher(short_lease());
    let second = harness
        .dispatcher(short_lease())
        .with_unrecorded_sends(first.unrecorded_sends().clone());
    assert_eq!(first.run_cycle().await.unwrap().sent, 1);
    assert!(!harness.store.is_held_sent(1));

    tokio::time::sleep(Duration::from_millis(100)).await;

    // Lease expired and nothing was written, but both workers know it went out
    let again = first.run_cycle().await.unwrap();
    assert_eq!(again.fetched, 1);
    assert_eq!(again.skipped, 1);
    let other = second.run_cycle().await.unwrap();
    assert_eq!(other.skipped, 1);
    assert_eq!(harness.transport.attempts(), 1);

    harness.store.fail_mark_success.store(false, Ordering::SeqCst);
    harness.store.fail_hold_sent.store(false, Ordering::SeqCst);

    let recovered = first.run_cycle().await.unwrap();
    assert_eq!(recovered.fetched, 0);
    assert_eq!(harness.store.get(1).status, QueueStatus::Success);
    assert!(second.unrecorded_sends().is_empty());
    assert_eq!(harness.transport.attempts(), 1);
    assert_eq!(harness.send_log.entries().len(), 1);
}

#[tokio::test]
async fn test_terminal_failure_is_not_logged_when_claim_was_lost() {
    let harness = Harness::new();
    harness
        .recipients
        .set("ORDER_DELAY", &["not-an-address"], &[]);
    harness.store.register_query("orders.delayed", vec![]);
    harness.store.insert(queue_entry(1, "ORDER_DELAY", 0));
    harness
        .store
        .lose_claim_before_mark_failed
        .store(true, Ordering::SeqCst);

    let dispatcher = harness.dispatcher(settings(3));
    let outcome = dispatcher.process_entry(&harness.store.get(1)).await;

    assert_eq!(outcome, EntryOutcome::Skipped);
    assert!(harness.send_log.entries().is_empty());
    let entry = harness.store.get(1);
    assert_eq!(entry.status, QueueStatus::Pending);
    assert!(entry.error_message.is_none());
}

// ============================================================================
// Concurrent workers
// ============================================================================

#[tokio::test]
async fn test_racing_workers_send_once() {
    let harness = harness_with_entry(1, 0);
    let first = harness.dispatcher(settings(3));
    let second = harness.dispatcher(settings(3));
    assert_ne!(first.worker_id(), second.worker_id());

    let snapshot = harness.store.get(1);
    let (a, b) = tokio::join!(first.process_entry(&snapshot), second.process_entry(&snapshot));

    let outcomes = [a, b];
    assert_eq!(
        outcomes.iter().filter(|o| **o == EntryOutcome::Sent).count(),
        1
    );
    assert_eq!(
        outcomes.iter().filter(|o| **o == EntryOutcome::Skipped).count(),
        1
    );
    assert_eq!(harness.transport.attempts(), 1);
    assert_eq!(harness.send_log.entries().len(), 1);
    assert_eq!(harness.store.get(1).status, QueueStatus::Success);
}

#[tokio::test]
async fn test_stale_snapshot_is_skipped_after_completion() {
    let harness = harness_with_entry(1, 0);
    let first = harness.dispatcher(settings(3));
    let second = harness.dispatcher(settings(3));

    let snapshot = harness.store.get(1);
    assert_eq!(first.process_entry(&snapshot).await, EntryOutcome::Sent);
    assert_eq!(second.process_entry(&snapshot).await, EntryOutcome::Skipped);
    assert_eq!(harness.transport.attempts(), 1);
}

#[tokio::test]
async fn test_stale_retry_count_cannot_be_claimed() {
    let harness = harness_with_entry(1, 0);
    let first = harness.dispatcher(settings(3));
    let second = harness.dispatcher(settings(3));
    harness
        .transport
        .push_result(Err(TransportError::SendFailed("refused".into())));

    let snapshot = harness.store.get(1);
    assert_eq!(
        first.process_entry(&snapshot).await,
        EntryOutcome::Retrying { retry_count: 1 }
    );
    // The snapshot still says retry_count = 0, so the optimistic guard rejects it
    assert_eq!(second.process_entry(&snapshot).await, EntryOutcome::Skipped);
    assert_eq!(harness.store.get(1).retry_count, 1);
    assert_eq!(harness.transport.attempts(), 1);
}

#[tokio::test]
async fn test_abandoned_claim_is_picked_up_after_lease_expiry() {
    let harness = harness_with_entry(1, 2);
    let snapshot = harness.store.get(1);

    // A worker that claimed the entry and died before finishing
    let dead_worker = Uuid::new_v4();
    let claim = harness
        .store
        .claim(&snapshot, dead_worker, Duration::ZERO)
        .await
        .unwrap();
    assert!(claim.is_some());

    let entry = harness.store.get(1);
    assert_eq!(entry.status, QueueStatus::Pending);
    assert_eq!(entry.retry_count, 2);

    let dispatcher = harness.dispatcher(settings(3));
    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(harness.store.get(1).status, QueueStatus::Success);
}

#[tokio::test]
async fn test_live_claim_blocks_other_workers() {
    let harness = harness_with_entry(1, 0);
    let snapshot = harness.store.get(1);

    harness
        .store
        .claim(&snapshot, Uuid::new_v4(), Duration::from_secs(300))
        .await
        .unwrap();

    let dispatcher = harness.dispatcher(settings(3));
    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(
        dispatcher.process_entry(&snapshot).await,
        EntryOutcome::Skipped
    );
    assert_eq!(harness.transport.attempts(), 0);
}
