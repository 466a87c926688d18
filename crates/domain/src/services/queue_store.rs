//! Queue storage abstraction.
//!
//! Pure data access over the mail queue. Every mutation is a single
//! conditional update so that concurrent dispatchers never both win the same
//! row: the loser sees zero rows affected and moves on.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{QueryParams, QueueEntry, QueueStatus, Row};

/// Errors raised by the queue store and the detail query catalog.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Detail query not registered: {0}")]
    QueryNotFound(String),

    #[error("Detail query {query_id} failed: {message}")]
    QueryExecution { query_id: String, message: String },

    #[error("Database error: {0}")]
    Database(String),
}

/// Proof that a worker owns a pending entry for the current attempt.
///
/// Updates made with a claim only apply while the row is still pending, still
/// owned by the same worker and still at the retry count seen when claiming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub entry_id: i64,
    pub worker_id: Uuid,
    pub retry_count: i32,
}

#[async_trait::async_trait]
pub trait QueueStore: Send + Sync {
    /// Pending entries that are not currently claimed, oldest first.
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<QueueEntry>, StoreError>;

    /// Atomically take ownership of a pending entry for `lease`.
    ///
    /// Returns `None` when another worker got there first or the entry is no
    /// longer pending.
    async fn claim(
        &self,
        entry: &QueueEntry,
        worker_id: Uuid,
        lease: Duration,
    ) -> Result<Option<Claim>, StoreError>;

    /// Run the registered detail query identified by `query_id`.
    async fn fetch_detail_rows(
        &self,
        query_id: &str,
        params: &QueryParams,
    ) -> Result<Vec<Row>, StoreError>;

    /// Move a claimed entry to `SUCCESS`. Returns false when the guard no longer holds.
    async fn mark_success(&self, claim: &Claim) -> Result<bool, StoreError>;

    /// Flag a claimed entry as sent so that no worker claims it again, even
    /// after the lease expires. The entry stays `PENDING` until a later
    /// `mark_success` with the same claim lands.
    async fn hold_sent(&self, claim: &Claim) -> Result<bool, StoreError>;

    /// Record a failed attempt.
    ///
    /// `status` is `Pending` for a retriable failure (the claim is released)
    /// or `Failed` for a terminal one. Returns false when the guard no longer holds.
    async fn mark_failed(
        &self,
        claim: &Claim,
        error_message: &str,
        next_retry_count: i32,
        status: QueueStatus,
    ) -> Result<bool, StoreError>;
}
