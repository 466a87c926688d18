//! Queue dispatcher.
//!
//! Turns pending queue entries into sent mail:
//! 1. Claims the oldest pending entries, one conditional update each
//! 2. Resolves the entry's detail rows through its registered query
//! 3. Normalizes stored content and renders the body
//! 4. Resolves and validates recipients
//! 5. Hands the message to the transport
//! 6. Updates the queue row, then writes the send log for terminal outcomes
//!
//! Nothing that goes wrong for one entry aborts the rest of the batch. A mail
//! that went out is never sent again: when its SUCCESS update cannot be
//! written, the entry is held as sent and remembered until the update lands.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{
    serialize_recipients, MailMessage, MailType, QueryParams, QueueEntry, QueueStatus, Recipient,
    RowValue, SendLogEntry, SendStatus,
};

use super::content::{ContentNormalizer, ContentReadError};
use super::queue_store::{Claim, QueueStore, StoreError};
use super::recipient_source::RecipientSource;
use super::recipient_validator::{RecipientValidator, ValidationError};
use super::renderer::{MailRenderer, RenderContext};
use super::send_logger::MailSendLogger;
use super::transport::{MailTransport, TransportError};

/// Why a single delivery attempt failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Recipient validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Content(#[from] ContentReadError),

    #[error("Detail query failed: {0}")]
    DetailQuery(#[source] StoreError),

    #[error("Recipient lookup failed: {0}")]
    Recipients(#[source] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl DispatchError {
    /// Validation problems recur on every attempt; everything else may clear up.
    pub fn is_retriable(&self) -> bool {
        match self {
            DispatchError::Validation(_) => false,
            DispatchError::Content(_)
            | DispatchError::DetailQuery(_)
            | DispatchError::Recipients(_)
            | DispatchError::Transport(_) => true,
        }
    }
}

/// Tunables consumed by the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Maximum entries claimed per cycle.
    pub batch_size: i64,
    /// Number of retries allowed after the first failed attempt.
    pub max_retries: i32,
    /// How long a claim protects an entry from other workers.
    pub claim_lease: Duration,
    pub mail_type: MailType,
    pub sender_email: String,
    pub ip_address: Option<String>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: 3,
            claim_lease: Duration::from_secs(300),
            mail_type: MailType::Alarm,
            sender_email: "noreply@localhost.localdomain".to_string(),
            ip_address: None,
        }
    }
}

/// What happened to one entry during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Sent,
    /// Retriable failure, entry stays pending with the new retry count.
    Retrying { retry_count: i32 },
    /// Terminal failure.
    Failed { retry_count: i32 },
    /// Another worker owns the entry, or it is no longer pending.
    Skipped,
}

impl EntryOutcome {
    fn label(&self) -> &'static str {
        match self {
            EntryOutcome::Sent => "success",
            EntryOutcome::Retrying { .. } => "retry",
            EntryOutcome::Failed { .. } => "failed",
            EntryOutcome::Skipped => "skipped",
        }
    }
}

/// Totals for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub sent: usize,
    pub retrying: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::Sent => self.sent += 1,
            EntryOutcome::Retrying { .. } => self.retrying += 1,
            EntryOutcome::Failed { .. } => self.failed += 1,
            EntryOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Entries this worker actually attempted.
    pub fn processed(&self) -> usize {
        self.sent + self.retrying + self.failed
    }
}

/// Attempts at the SUCCESS update before the entry is held as sent.
const MARK_SUCCESS_ATTEMPTS: u32 = 3;

/// Entries whose mail went out but whose SUCCESS update has not landed yet.
///
/// Cloning shares the same set, so workers in one process can skip each
/// other's unrecorded sends.
#[derive(Debug, Clone, Default)]
pub struct UnrecordedSends {
    claims: Arc<Mutex<HashMap<i64, Claim>>>,
}

impl UnrecordedSends {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, Claim>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, entry_id: i64) -> bool {
        self.lock().contains_key(&entry_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn insert(&self, claim: Claim) {
        self.lock().insert(claim.entry_id, claim);
    }

    fn remove(&self, entry_id: i64) {
        self.lock().remove(&entry_id);
    }

    fn claims(&self) -> Vec<Claim> {
        self.lock().values().cloned().collect()
    }
}

/// Pieces of the message known so far; failures are logged with whatever was built.
#[derive(Debug, Default)]
struct Attempt {
    subject: String,
    to: Vec<Recipient>,
    cc: Vec<Recipient>,
    body_html: String,
}

/// Polls the mail queue and drives each entry to a terminal outcome.
pub struct QueueDispatcher {
    store: Arc<dyn QueueStore>,
    recipients: Arc<dyn RecipientSource>,
    transport: Arc<dyn MailTransport>,
    send_log: Arc<dyn MailSendLogger>,
    renderer: Arc<dyn MailRenderer>,
    validator: RecipientValidator,
    normalizer: ContentNormalizer,
    settings: DispatcherSettings,
    worker_id: Uuid,
    unrecorded: UnrecordedSends,
}

impl QueueDispatcher {
    /// Create a dispatcher with a fresh worker identity.
    pub fn new(
        store: Arc<dyn QueueStore>,
        recipients: Arc<dyn RecipientSource>,
        transport: Arc<dyn MailTransport>,
        send_log: Arc<dyn MailSendLogger>,
        renderer: Arc<dyn MailRenderer>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            store,
            recipients,
            transport,
            send_log,
            renderer,
            validator: RecipientValidator::new(),
            normalizer: ContentNormalizer::new(),
            settings,
            worker_id: Uuid::new_v4(),
            unrecorded: UnrecordedSends::new(),
        }
    }

    /// Use a fixed worker identity.
    pub fn with_worker_id(mut self, worker_id: Uuid) -> Self {
        self.worker_id = worker_id;
        self
    }

    /// Share the set of unrecorded sends with other dispatchers.
    pub fn with_unrecorded_sends(mut self, unrecorded: UnrecordedSends) -> Self {
        self.unrecorded = unrecorded;
        self
    }

    pub fn unrecorded_sends(&self) -> &UnrecordedSends {
        &self.unrecorded
    }

    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Run one poll cycle over a batch of pending entries.
    ///
    /// Only a failure to read the batch itself is returned as an error.
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        self.reconcile_unrecorded().await;

        let entries = self.store.fetch_pending(self.settings.batch_size).await?;
        let mut report = CycleReport {
            fetched: entries.len(),
            ..CycleReport::default()
        };

        for entry in &entries {
            let outcome = self.process_entry(entry).await;
            metrics::counter!("mail_dispatch_total", "outcome" => outcome.label()).increment(1);
            report.record(&outcome);
        }

        if report.fetched > 0 {
            info!(
                worker_id = %self.worker_id,
                fetched = report.fetched,
                sent = report.sent,
                retrying = report.retrying,
                failed = report.failed,
                skipped = report.skipped,
                "Mail dispatch cycle finished"
            );
        }

        Ok(report)
    }

    /// Claim and process a single entry.
    pub async fn process_entry(&self, entry: &QueueEntry) -> EntryOutcome {
        match entry.status {
            QueueStatus::Pending => {}
            QueueStatus::Success | QueueStatus::Failed => {
                debug!(queue_id = entry.id, status = %entry.status, "Skipping terminal entry");
                return EntryOutcome::Skipped;
            }
        }

        if self.unrecorded.contains(entry.id) {
            debug!(
                queue_id = entry.id,
                "Entry already sent, waiting for its SUCCESS update"
            );
            return EntryOutcome::Skipped;
        }

        let claim = match self
            .store
            .claim(entry, self.worker_id, self.settings.claim_lease)
            .await
        {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                debug!(
                    queue_id = entry.id,
                    worker_id = %self.worker_id,
                    "Entry claimed elsewhere, skipping"
                );
                return EntryOutcome::Skipped;
            }
            Err(e) => {
                warn!(queue_id = entry.id, error = %e, "Failed to claim queue entry");
                return EntryOutcome::Skipped;
            }
        };

        let mut attempt = Attempt {
            subject: entry.subject(),
            ..Attempt::default()
        };

        match self.attempt_delivery(entry, &mut attempt).await {
            Ok(()) => self.complete_success(entry, &claim, attempt).await,
            Err(e) => self.complete_failure(entry, &claim, attempt, e).await,
        }
    }

    async fn attempt_delivery(
        &self,
        entry: &QueueEntry,
        attempt: &mut Attempt,
    ) -> Result<(), DispatchError> {
        let rows = self
            .store
            .fetch_detail_rows(&entry.query_id, &detail_params(entry))
            .await
            .map_err(DispatchError::DetailQuery)?;
        let rows: Vec<_> = rows.into_iter().map(Some).collect();
        let table = self.normalizer.rows_to_string_maps(Some(&rows));

        let section_text = self.normalizer.to_text(&entry.section_content)?;
        attempt.body_html = self.renderer.render(&RenderContext {
            entry,
            section_text: &section_text,
            rows: &table,
        });

        let recipients = self
            .recipients
            .resolve(&entry.mail_source)
            .await
            .map_err(DispatchError::Recipients)?;
        attempt.to = recipients.to;
        attempt.cc = recipients.cc;
        self.validator.validate_message(&attempt.to, &attempt.cc)?;

        let message = MailMessage {
            subject: attempt.subject.clone(),
            to: attempt.to.clone(),
            cc: attempt.cc.clone(),
            body_html: attempt.body_html.clone(),
        };
        self.transport.send(&message).await?;

        Ok(())
    }

    async fn complete_success(
        &self,
        entry: &QueueEntry,
        claim: &Claim,
        attempt: Attempt,
    ) -> EntryOutcome {
        self.write_send_log(entry, &attempt, SendStatus::Success, None, entry.retry_count)
            .await;

        match self.record_success(claim).await {
            Ok(true) => {}
            Ok(false) => {
                metrics::counter!("mail_queue_update_failures_total").increment(1);
                error!(
                    queue_id = entry.id,
                    worker_id = %self.worker_id,
                    "Mail sent but queue entry was no longer held by this worker"
                );
            }
            Err(e) => {
                metrics::counter!("mail_queue_update_failures_total").increment(1);
                error!(
                    queue_id = entry.id,
                    error = %e,
                    "Mail sent but marking queue entry as SUCCESS failed"
                );
                self.hold_sent(entry, claim).await;
            }
        }

        info!(
            queue_id = entry.id,
            mail_source = %entry.mail_source,
            retry_count = entry.retry_count,
            "Queued mail sent"
        );

        EntryOutcome::Sent
    }

    /// Mark the entry as sent, retrying a failed update a few times.
    async fn record_success(&self, claim: &Claim) -> Result<bool, StoreError> {
        let mut attempt = 1;
        loop {
            match self.store.mark_success(claim).await {
                Ok(updated) => return Ok(updated),
                Err(e) if attempt < MARK_SUCCESS_ATTEMPTS => {
                    warn!(
                        queue_id = claim.entry_id,
                        attempt,
                        error = %e,
                        "SUCCESS update failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Keep a sent entry away from every worker until its SUCCESS update lands.
    async fn hold_sent(&self, entry: &QueueEntry, claim: &Claim) {
        match self.store.hold_sent(claim).await {
            Ok(true) => {
                warn!(queue_id = entry.id, "Sent entry held until its SUCCESS update lands");
            }
            Ok(false) => {
                error!(
                    queue_id = entry.id,
                    worker_id = %self.worker_id,
                    "Sent entry was taken over before it could be held"
                );
                return;
            }
            Err(e) => {
                error!(
                    queue_id = entry.id,
                    error = %e,
                    "Failed to hold sent entry, only this process will skip it"
                );
            }
        }
        self.unrecorded.insert(claim.clone());
    }

    /// Retry the SUCCESS update of entries sent in earlier cycles.
    async fn reconcile_unrecorded(&self) {
        for claim in self.unrecorded.claims() {
            match self.store.mark_success(&claim).await {
                Ok(true) => {
                    self.unrecorded.remove(claim.entry_id);
                    info!(queue_id = claim.entry_id, "Recorded SUCCESS for previously sent entry");
                }
                Ok(false) => {
                    self.unrecorded.remove(claim.entry_id);
                    warn!(
                        queue_id = claim.entry_id,
                        "Previously sent entry is no longer held, dropping it"
                    );
                }
                Err(e) => {
                    warn!(
                        queue_id = claim.entry_id,
                        error = %e,
                        "SUCCESS update for previously sent entry still failing"
                    );
                }
            }
        }
    }

    async fn complete_failure(
        &self,
        entry: &QueueEntry,
        claim: &Claim,
        attempt: Attempt,
        failure: DispatchError,
    ) -> EntryOutcome {
        let retriable = failure.is_retriable();
        let exhausted = entry.retry_count >= self.settings.max_retries;
        let next_retry_count = if retriable {
            entry.retry_count + 1
        } else {
            entry.retry_count
        };
        let terminal = !retriable || exhausted;
        let status = if terminal {
            QueueStatus::Failed
        } else {
            QueueStatus::Pending
        };
        let error_message = failure.to_string();

        match self
            .store
            .mark_failed(claim, &error_message, next_retry_count, status)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    queue_id = entry.id,
                    worker_id = %self.worker_id,
                    "Failure update lost to another worker"
                );
                return EntryOutcome::Skipped;
            }
            Err(e) => {
                metrics::counter!("mail_queue_update_failures_total").increment(1);
                error!(
                    queue_id = entry.id,
                    error = %e,
                    "Failed to record delivery failure on queue entry"
                );
                if !terminal {
                    return EntryOutcome::Skipped;
                }
            }
        }

        if terminal {
            self.write_send_log(
                entry,
                &attempt,
                SendStatus::Failure,
                Some(error_message.clone()),
                next_retry_count,
            )
            .await;
            error!(
                queue_id = entry.id,
                mail_source = %entry.mail_source,
                retry_count = next_retry_count,
                retriable = retriable,
                error = %error_message,
                "Mail delivery failed permanently"
            );
            return EntryOutcome::Failed {
                retry_count: next_retry_count,
            };
        }

        warn!(
            queue_id = entry.id,
            mail_source = %entry.mail_source,
            retry_count = next_retry_count,
            error = %error_message,
            "Mail delivery failed, will retry"
        );
        EntryOutcome::Retrying {
            retry_count: next_retry_count,
        }
    }

    /// Append the audit record. A write failure is reported and otherwise ignored.
    async fn write_send_log(
        &self,
        entry: &QueueEntry,
        attempt: &Attempt,
        send_status: SendStatus,
        error_message: Option<String>,
        retry_count: i32,
    ) {
        let now = Utc::now();
        let log_entry = SendLogEntry {
            mail_type: self.settings.mail_type,
            mail_source: entry.mail_source.clone(),
            subject: attempt.subject.clone(),
            recipients: serialize_recipients(&attempt.to),
            cc_recipients: if attempt.cc.is_empty() {
                None
            } else {
                Some(serialize_recipients(&attempt.cc))
            },
            body_html: attempt.body_html.clone(),
            send_status,
            error_message,
            retry_count,
            send_date: now,
            sender_email: self.settings.sender_email.clone(),
            ip_address: self.settings.ip_address.clone(),
            reg_date: now,
        };

        if let Err(e) = self.send_log.record(&log_entry).await {
            metrics::counter!("mail_send_log_write_failures_total").increment(1);
            error!(
                queue_id = entry.id,
                mail_source = %entry.mail_source,
                send_status = %send_status,
                error = %e,
                "Failed to write mail send log"
            );
        }
    }
}

/// Parameters made available to every detail query.
fn detail_params(entry: &QueueEntry) -> QueryParams {
    let mut params = QueryParams::with_capacity(5);
    params.insert("queue_id", RowValue::Integer(entry.id));
    params.insert("mail_source", RowValue::from(entry.mail_source.as_str()));
    params.insert("alarm_name", RowValue::from(entry.alarm_name.as_str()));
    params.insert("severity", RowValue::from(entry.severity.as_str()));
    params.insert("created_at", RowValue::Timestamp(entry.created_at));
    params
}
