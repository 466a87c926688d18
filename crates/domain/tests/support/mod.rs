//! In-memory collaborators for dispatcher tests.
//!
//! The queue store applies the same guards as the SQL repository: every
//! update only lands while the row is pending, owned by the caller's claim and
//! still at the expected retry count.

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use domain::models::{
    MailMessage, QueryParams, QueueEntry, QueueStatus, Recipient, Row, RowValue, SendLogEntry,
    Severity,
};
use domain::services::{
    Claim, DispatcherSettings, MailRenderer, MailSendLogger, MailTransport, PersistenceError,
    QueueDispatcher, QueueStore, RecipientSet, RecipientSource, RenderContext, StoreError,
    TransportError,
};

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: QueueEntry,
    claimed_by: Option<Uuid>,
    claim_expires_at: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn claimable(&self, now: DateTime<Utc>) -> bool {
        self.entry.status == QueueStatus::Pending && self.sent_at.is_none() && self.claim_free(now)
    }

    fn claim_free(&self, now: DateTime<Utc>) -> bool {
        match (self.claimed_by, self.claim_expires_at) {
            (None, _) => true,
            (Some(_), Some(expires)) => expires <= now,
            (Some(_), None) => false,
        }
    }

    fn guard_holds(&self, claim: &Claim) -> bool {
        self.entry.status == QueueStatus::Pending
            && self.claimed_by == Some(claim.worker_id)
            && self.entry.retry_count == claim.retry_count
    }
}

#[derive(Default)]
pub struct InMemoryQueueStore {
    rows: Mutex<Vec<StoredEntry>>,
    detail_rows: Mutex<HashMap<String, Vec<Row>>>,
    pub fail_mark_success: AtomicBool,
    pub fail_hold_sent: AtomicBool,
    /// Another worker takes the row over just before the failure update.
    pub lose_claim_before_mark_failed: AtomicBool,
}

impl InMemoryQueueStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, entry: QueueEntry) {
        self.rows.lock().unwrap().push(StoredEntry {
            entry,
            claimed_by: None,
            claim_expires_at: None,
            sent_at: None,
        });
    }

    pub fn register_query(&self, query_id: &str, rows: Vec<Row>) {
        self.detail_rows
            .lock()
            .unwrap()
            .insert(query_id.to_string(), rows);
    }

    pub fn get(&self, id: i64) -> QueueEntry {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.entry.id == id)
            .map(|r| r.entry.clone())
            .expect("entry exists")
    }

    pub fn claimed_by(&self, id: i64) -> Option<Uuid> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.entry.id == id)
            .and_then(|r| r.claimed_by)
    }

    pub fn is_held_sent(&self, id: i64) -> bool {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.entry.id == id && r.sent_at.is_some())
    }
}

#[async_trait::async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<QueueEntry>, StoreError> {
        let now = Utc::now();
        let rows = self.rows.lock().unwrap();
        let mut pending: Vec<QueueEntry> = rows
            .iter()
            .filter(|r| r.claimable(now))
            .map(|r| r.entry.clone())
            .collect();
        pending.sort_by_key(|e| (e.created_at, e.id));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn claim(
        &self,
        entry: &QueueEntry,
        worker_id: Uuid,
        lease: Duration,
    ) -> Result<Option<Claim>, StoreError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.entry.id == entry.id) else {
            return Ok(None);
        };

        if row.entry.retry_count != entry.retry_count || !row.claimable(now) {
            return Ok(None);
        }

        row.claimed_by = Some(worker_id);
        row.claim_expires_at =
            Some(now + ChronoDuration::from_std(lease).expect("lease fits chrono"));
        Ok(Some(Claim {
            entry_id: entry.id,
            worker_id,
            retry_count: entry.retry_count,
        }))
    }

    async fn fetch_detail_rows(
        &self,
        query_id: &str,
        _params: &QueryParams,
    ) -> Result<Vec<Row>, StoreError> {
        self.detail_rows
            .lock()
            .unwrap()
            .get(query_id)
            .cloned()
            .ok_or_else(|| StoreError::QueryNotFound(query_id.to_string()))
    }

    async fn mark_success(&self, claim: &Claim) -> Result<bool, StoreError> {
        if self.fail_mark_success.load(Ordering::SeqCst) {
            return Err(StoreError::Database("connection reset".to_string()));
        }

        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.entry.id == claim.entry_id) else {
            return Ok(false);
        };
        if !row.guard_holds(claim) {
            return Ok(false);
        }

        row.entry.status = QueueStatus::Success;
        row.entry.updated_at = Utc::now();
        row.claimed_by = None;
        row.claim_expires_at = None;
        row.sent_at.get_or_insert_with(Utc::now);
        Ok(true)
    }

    async fn hold_sent(&self, claim: &Claim) -> Result<bool, StoreError> {
        if self.fail_hold_sent.load(Ordering::SeqCst) {
            return Err(StoreError::Database("connection reset".to_string()));
        }

        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.entry.id == claim.entry_id) else {
            return Ok(false);
        };
        if !row.guard_holds(claim) {
            return Ok(false);
        }

        row.sent_at = Some(Utc::now());
        row.entry.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_failed(
        &self,
        claim: &Claim,
        error_message: &str,
        next_retry_count: i32,
        status: QueueStatus,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.entry.id == claim.entry_id) else {
            return Ok(false);
        };
        if self.lose_claim_before_mark_failed.load(Ordering::SeqCst) {
            row.claimed_by = Some(Uuid::new_v4());
        }
        if !row.guard_holds(claim) {
            return Ok(false);
        }

        row.entry.status = status;
        row.entry.retry_count = next_retry_count;
        row.entry.error_message = Some(error_message.to_string());
        row.entry.updated_at = Utc::now();
        row.claimed_by = None;
        row.claim_expires_at = None;
        Ok(true)
    }
}

/// Transport that replays scripted results, then succeeds.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    sent: Mutex<Vec<MailMessage>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_result(&self, result: Result<(), TransportError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl MailTransport for ScriptedTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), TransportError> {
        tokio::task::yield_now().await;
        self.sent.lock().unwrap().push(message.clone());
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[derive(Default)]
pub struct RecordingSendLog {
    entries: Mutex<Vec<SendLogEntry>>,
    pub fail_writes: AtomicBool,
}

impl RecordingSendLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<SendLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MailSendLogger for RecordingSendLog {
    async fn record(&self, entry: &SendLogEntry) -> Result<i64, PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError("disk full".to_string()));
        }
        let mut entries = self.entries.lock().unwrap();
        entries.push(entry.clone());
        Ok(entries.len() as i64)
    }
}

#[derive(Default)]
pub struct StaticRecipients {
    sets: Mutex<HashMap<String, RecipientSet>>,
}

impl StaticRecipients {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, mail_source: &str, to: &[&str], cc: &[&str]) {
        self.sets.lock().unwrap().insert(
            mail_source.to_string(),
            RecipientSet {
                to: to.iter().map(|a| Recipient::new(*a)).collect(),
                cc: cc.iter().map(|a| Recipient::new(*a)).collect(),
            },
        );
    }
}

#[async_trait::async_trait]
impl RecipientSource for StaticRecipients {
    async fn resolve(&self, mail_source: &str) -> Result<RecipientSet, StoreError> {
        Ok(self
            .sets
            .lock()
            .unwrap()
            .get(mail_source)
            .cloned()
            .unwrap_or_default())
    }
}

/// Renders `title|text|col1,col2|v1,v2;v1,v2` so tests can assert on structure.
pub struct PipeRenderer;

impl MailRenderer for PipeRenderer {
    fn render(&self, context: &RenderContext<'_>) -> String {
        let header = context
            .rows
            .first()
            .map(|row| row.keys().collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        let body = context
            .rows
            .iter()
            .map(|row| row.iter().map(|(_, v)| v.as_str()).collect::<Vec<_>>().join(","))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}|{}|{}|{}",
            context.entry.section_title.as_deref().unwrap_or_default(),
            context.section_text,
            header,
            body
        )
    }
}

pub struct Harness {
    pub store: Arc<InMemoryQueueStore>,
    pub transport: Arc<ScriptedTransport>,
    pub send_log: Arc<RecordingSendLog>,
    pub recipients: Arc<StaticRecipients>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: InMemoryQueueStore::new(),
            transport: ScriptedTransport::new(),
            send_log: RecordingSendLog::new(),
            recipients: StaticRecipients::new(),
        }
    }

    pub fn dispatcher(&self, settings: DispatcherSettings) -> QueueDispatcher {
        QueueDispatcher::new(
            self.store.clone(),
            self.recipients.clone(),
            self.transport.clone(),
            self.send_log.clone(),
            Arc::new(PipeRenderer),
            settings,
        )
    }
}

pub fn settings(max_retries: i32) -> DispatcherSettings {
    DispatcherSettings {
        max_retries,
        sender_email: "alerts@example.com".to_string(),
        ip_address: Some("10.0.0.5".to_string()),
        ..DispatcherSettings::default()
    }
}

pub fn queue_entry(id: i64, mail_source: &str, retry_count: i32) -> QueueEntry {
    let created_at = Utc::now() - ChronoDuration::minutes(60 - id);
    QueueEntry {
        id,
        mail_source: mail_source.to_string(),
        alarm_name: format!("Alarm {}", id),
        severity: Severity::Critical,
        query_id: "orders.delayed".to_string(),
        section_title: Some("Delayed orders".to_string()),
        section_content: RowValue::from("Orders below are late."),
        status: QueueStatus::Pending,
        retry_count,
        error_message: None,
        created_at,
        updated_at: created_at,
    }
}

pub fn detail_row(order_no: &str, days: i64) -> Row {
    vec![
        ("order_no", RowValue::from(order_no)),
        ("delay_days", RowValue::Integer(days)),
        ("note", RowValue::Null),
    ]
    .into_iter()
    .collect()
}
