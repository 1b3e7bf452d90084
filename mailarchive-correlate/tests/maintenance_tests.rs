#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mailarchive_common::{
    DeliveryLogLine, Event, Message, MessageCounter, MessageStatus, NotificationSink, QueueKey,
    QueueRecord, SyslogLine,
};
use mailarchive_correlate::{
    CorrelationConfig, CorrelationEngine, PendingUpdates, ReconcileReport, Reconciler,
    ReconcilerConfig, RetentionConfig, SweepReport, Sweeper,
};
use mailarchive_store::{
    CorrelationStore, MemoryCorrelationStore, MemoryMessageStore, MessageStore, StoreError,
};
use pretty_assertions::assert_eq;
use uuid::Uuid;

#[derive(Debug, Default)]
struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(Event::name).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

/// Memory store whose status writes, or log lines containing a given text,
/// can be made to fail
#[derive(Debug, Default)]
struct FlakyStore {
    inner: MemoryCorrelationStore,
    fail_status_writes: AtomicBool,
    fail_lines_containing: Mutex<Option<String>>,
}

#[async_trait]
impl CorrelationStore for FlakyStore {
    async fn insert_message(&self, message: &Message) -> mailarchive_store::Result<()> {
        self.inner.insert_message(message).await
    }

    async fn message(&self, uuid: Uuid) -> mailarchive_store::Result<Option<Message>> {
        self.inner.message(uuid).await
    }

    async fn messages_by_message_id(
        &self,
        message_id: &str,
    ) -> mailarchive_store::Result<Vec<Message>> {
        self.inner.messages_by_message_id(message_id).await
    }

    async fn messages_received_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> mailarchive_store::Result<Vec<Message>> {
        self.inner.messages_received_before(cutoff).await
    }

    async fn set_message_status(
        &self,
        uuid: Uuid,
        status: MessageStatus,
    ) -> mailarchive_store::Result<()> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("status write refused".to_string()));
        }
        self.inner.set_message_status(uuid, status).await
    }

    async fn delete_message(&self, uuid: Uuid) -> mailarchive_store::Result<()> {
        self.inner.delete_message(uuid).await
    }

    async fn message_count(&self) -> mailarchive_store::Result<u64> {
        self.inner.message_count().await
    }

    async fn save_queue_record(&self, record: &QueueRecord) -> mailarchive_store::Result<()> {
        self.inner.save_queue_record(record).await
    }

    async fn queue_record(&self, key: &QueueKey) -> mailarchive_store::Result<Option<QueueRecord>> {
        self.inner.queue_record(key).await
    }

    async fn queue_records_by_message_id(
        &self,
        message_id: &str,
    ) -> mailarchive_store::Result<Vec<QueueRecord>> {
        self.inner.queue_records_by_message_id(message_id).await
    }

    async fn delete_queue_record(&self, key: &QueueKey) -> mailarchive_store::Result<()> {
        self.inner.delete_queue_record(key).await
    }

    async fn append_log_line(&self, line: &DeliveryLogLine) -> mailarchive_store::Result<()> {
        let refused = self
            .fail_lines_containing
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|needle| line.content.contains(needle));
        if refused {
            return Err(StoreError::Internal("log line refused".to_string()));
        }
        self.inner.append_log_line(line).await
    }

    async fn log_lines(&self, key: &QueueKey) -> mailarchive_store::Result<Vec<DeliveryLogLine>> {
        self.inner.log_lines(key).await
    }

    async fn delete_log_lines(&self, key: &QueueKey) -> mailarchive_store::Result<usize> {
        self.inner.delete_log_lines(key).await
    }
}

fn message(message_id: &str, received_at: DateTime<Utc>) -> Message {
    Message {
        uuid: Uuid::new_v4(),
        message_id: message_id.to_string(),
        from: "alice@example.org".to_string(),
        to: "bob@example.com".to_string(),
        subject: "Hello".to_string(),
        has_plain_text: true,
        has_html: false,
        has_attachments: false,
        spam_score: 0,
        source_ip: "mail.example.org (203.0.113.5)".to_string(),
        size_bytes: 42,
        received_at,
        status: MessageStatus::Unknown,
    }
}

fn record(queue_id: &str, message_id: &str, status: MessageStatus, ignore: bool) -> QueueRecord {
    QueueRecord {
        status,
        ignore,
        ..QueueRecord::queued("mx1", queue_id, message_id)
    }
}

struct Reconciling {
    reconciler: Reconciler,
    store: Arc<FlakyStore>,
    pending: PendingUpdates,
    sink: Arc<RecordingSink>,
}

fn reconciling() -> Reconciling {
    let store = Arc::new(FlakyStore::default());
    let pending = PendingUpdates::new();
    let sink = Arc::new(RecordingSink::default());
    let reconciler = Reconciler::new(
        &ReconcilerConfig::default(),
        store.clone(),
        pending.clone(),
        sink.clone(),
    );

    Reconciling {
        reconciler,
        store,
        pending,
        sink,
    }
}

async fn status_of(store: &dyn CorrelationStore, uuid: Uuid) -> MessageStatus {
    store.message(uuid).await.unwrap().unwrap().status
}

#[tokio::test]
async fn test_reconcile_updates_every_message_with_the_id() {
    let r = reconciling();
    let first = message("x@y", Utc::now());
    let second = message("x@y", Utc::now());
    let other = message("other@y", Utc::now());
    for m in [&first, &second, &other] {
        r.store.insert_message(m).await.unwrap();
    }
    r.store
        .save_queue_record(&record("ABC123", "x@y", MessageStatus::Sent, false))
        .await
        .unwrap();
    r.pending.mark(QueueKey::new("mx1", "ABC123"));

    let report = r.reconciler.reconcile().await;

    assert_eq!(
        report,
        ReconcileReport {
            examined: 1,
            updated: 2,
            failed: 0
        }
    );
    assert_eq!(status_of(r.store.as_ref(), first.uuid).await, MessageStatus::Sent);
    assert_eq!(status_of(r.store.as_ref(), second.uuid).await, MessageStatus::Sent);
    assert_eq!(status_of(r.store.as_ref(), other.uuid).await, MessageStatus::Unknown);
    assert_eq!(r.sink.names(), vec!["messageStatusesUpdated"]);
    assert!(r.pending.is_empty());
}

#[tokio::test]
async fn test_reconcile_twice_is_idempotent() {
    let r = reconciling();
    let m = message("x@y", Utc::now());
    r.store.insert_message(&m).await.unwrap();
    r.store
        .save_queue_record(&record("ABC123", "x@y", MessageStatus::Deferred, false))
        .await
        .unwrap();
    r.pending.mark(QueueKey::new("mx1", "ABC123"));

    r.reconciler.reconcile().await;
    let second = r.reconciler.reconcile().await;

    assert_eq!(second, ReconcileReport::default());
    assert_eq!(r.sink.names(), vec!["messageStatusesUpdated"]);

    // Marked again without a new status: nothing to write, nothing to announce.
    r.pending.mark(QueueKey::new("mx1", "ABC123"));
    let third = r.reconciler.reconcile().await;
    assert_eq!(third.examined, 1);
    assert_eq!(third.updated, 0);
    assert_eq!(r.sink.names().len(), 1);
}

#[tokio::test]
async fn test_ignored_record_is_not_propagated() {
    let r = reconciling();
    let m = message("x@y", Utc::now());
    r.store.insert_message(&m).await.unwrap();
    r.store
        .save_queue_record(&record("ARCH01", "x@y", MessageStatus::Sent, true))
        .await
        .unwrap();
    r.pending.mark(QueueKey::new("mx1", "ARCH01"));

    let report = r.reconciler.reconcile().await;

    assert_eq!(report.updated, 0);
    assert_eq!(status_of(r.store.as_ref(), m.uuid).await, MessageStatus::Unknown);
    assert!(r.sink.names().is_empty());
}

#[tokio::test]
async fn test_missing_record_is_skipped() {
    let r = reconciling();
    r.pending.mark(QueueKey::new("mx1", "GONE00"));

    let report = r.reconciler.reconcile().await;

    assert_eq!(
        report,
        ReconcileReport {
            examined: 1,
            updated: 0,
            failed: 0
        }
    );
    assert!(r.pending.is_empty());
}

#[tokio::test]
async fn test_failed_write_is_retried_next_pass() {
    let r = reconciling();
    let m = message("x@y", Utc::now());
    r.store.insert_message(&m).await.unwrap();
    r.store
        .save_queue_record(&record("ABC123", "x@y", MessageStatus::Bounced, false))
        .await
        .unwrap();
    r.pending.mark(QueueKey::new("mx1", "ABC123"));
    r.store.fail_status_writes.store(true, Ordering::SeqCst);

    let report = r.reconciler.reconcile().await;

    assert_eq!(report.failed, 1);
    assert!(r.pending.contains(&QueueKey::new("mx1", "ABC123")));
    assert!(r.sink.names().is_empty());

    r.store.fail_status_writes.store(false, Ordering::SeqCst);
    let report = r.reconciler.reconcile().await;

    assert_eq!(report.updated, 1);
    assert_eq!(status_of(r.store.as_ref(), m.uuid).await, MessageStatus::Bounced);
}

struct Sweeping {
    sweeper: Sweeper,
    store: MemoryCorrelationStore,
    messages: MemoryMessageStore,
    sink: Arc<RecordingSink>,
    counter: MessageCounter,
}

fn sweeping(max_age_secs: u64) -> Sweeping {
    let store = MemoryCorrelationStore::new();
    let messages = MemoryMessageStore::new();
    let sink = Arc::new(RecordingSink::default());
    let counter = MessageCounter::default();
    let config = RetentionConfig {
        max_age_secs,
        ..RetentionConfig::default()
    };
    let sweeper = Sweeper::new(
        &config,
        Arc::new(store.clone()),
        Arc::new(messages.clone()),
        sink.clone(),
        counter.clone(),
    )
    .expect("valid retention");

    Sweeping {
        sweeper,
        store,
        messages,
        sink,
        counter,
    }
}

impl Sweeping {
    async fn archive(&self, m: &Message) {
        self.messages.put(m.uuid, b"raw").await.unwrap();
        self.store.insert_message(m).await.unwrap();
        self.counter.increment();
    }
}

#[tokio::test]
async fn test_sweep_removes_expired_messages_with_their_trail() {
    let s = sweeping(3600);
    let now = Utc::now();
    let cutoff = now - TimeDelta::seconds(3600);

    let old = message("old@y", cutoff - TimeDelta::seconds(10));
    let at_cutoff = message("", cutoff);
    let fresh = message("fresh@y", now - TimeDelta::seconds(10));
    for m in [&old, &at_cutoff, &fresh] {
        s.archive(m).await;
    }

    for (queue_id, message_id) in [("OLD001", "old@y"), ("NEW001", "fresh@y")] {
        s.store
            .save_queue_record(&record(queue_id, message_id, MessageStatus::Sent, false))
            .await
            .unwrap();
        let line = SyslogLine::new("mx1", "postfix/smtp", format!("{queue_id}: status=sent"));
        s.store
            .append_log_line(&DeliveryLogLine::attribute(&line, queue_id))
            .await
            .unwrap();
    }

    let report = s.sweeper.sweep_at(now).await.expect("sweep");

    assert_eq!(
        report,
        SweepReport {
            expired: 2,
            removed: 2,
            failed: 0
        }
    );
    assert_eq!(s.counter.get(), 1);
    assert_eq!(s.store.message_count().await.unwrap(), 1);
    assert!(s.store.message(old.uuid).await.unwrap().is_none());
    assert!(!s.messages.contains(old.uuid).await.unwrap());
    assert!(!s.messages.contains(at_cutoff.uuid).await.unwrap());
    assert!(s.messages.contains(fresh.uuid).await.unwrap());

    assert!(
        s.store
            .queue_record(&QueueKey::new("mx1", "OLD001"))
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(s.store.queue_record_count(), 1);
    assert_eq!(s.store.log_line_count(), 1);

    let events = s.sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::UpdateMessageCount(1)));
}

#[tokio::test]
async fn test_sweep_with_nothing_expired_is_silent() {
    let s = sweeping(3600);
    s.archive(&message("fresh@y", Utc::now())).await;

    let report = s.sweeper.sweep().await.expect("sweep");

    assert_eq!(report, SweepReport::default());
    assert_eq!(s.counter.get(), 1);
    assert!(s.sink.names().is_empty());
}

#[test]
fn test_retention_out_of_range_is_rejected() {
    let config = RetentionConfig {
        max_age_secs: u64::MAX,
        ..RetentionConfig::default()
    };

    assert!(
        Sweeper::new(
            &config,
            Arc::new(MemoryCorrelationStore::new()),
            Arc::new(MemoryMessageStore::new()),
            Arc::new(RecordingSink::default()),
            MessageCounter::default(),
        )
        .is_err()
    );
}

#[tokio::test]
async fn test_failed_buffered_line_does_not_drop_the_rest() {
    let store = Arc::new(FlakyStore::default());
    *store.fail_lines_containing.lock().unwrap() = Some("second".to_string());
    let mut engine = CorrelationEngine::new(
        &CorrelationConfig::default(),
        store.clone(),
        PendingUpdates::new(),
    )
    .expect("valid config");

    for content in [
        "connect from client[192.0.2.10]",
        "first buffered",
        "second buffered",
        "third buffered",
    ] {
        engine
            .correlate(&SyslogLine::new("mx1", "postfix/smtpd", content))
            .await
            .expect("correlate");
    }

    let result = engine
        .correlate(&SyslogLine::new(
            "mx1",
            "postfix/cleanup",
            "ABC123: message-id=<x@y>",
        ))
        .await;

    assert!(result.is_err());
    let trail: Vec<_> = store
        .log_lines(&QueueKey::new("mx1", "ABC123"))
        .await
        .unwrap()
        .into_iter()
        .map(|line| line.content)
        .collect();
    assert_eq!(
        trail,
        vec!["first buffered", "third buffered", "ABC123: message-id=<x@y>"]
    );
}
