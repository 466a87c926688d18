//! Mail queue dispatch job.
//!
//! One job per configured worker. Each owns a dispatcher with its own worker
//! identity, so several jobs can poll the same queue without double sends.

use domain::services::QueueDispatcher;
use std::sync::Arc;
use tracing::debug;

use super::scheduler::{Job, JobFrequency};

/// Background job that runs one dispatch cycle per tick.
pub struct MailDispatchJob {
    name: String,
    dispatcher: Arc<QueueDispatcher>,
    poll_interval_secs: u64,
}

impl MailDispatchJob {
    /// Create a dispatch job.
    ///
    /// # Arguments
    /// * `index` - Worker number, used in the job name
    /// * `dispatcher` - Dispatcher owning this worker's identity
    /// * `poll_interval_secs` - Seconds between cycles
    pub fn new(index: usize, dispatcher: QueueDispatcher, poll_interval_secs: u64) -> Self {
        Self {
            name: format!("mail_dispatch_{}", index),
            dispatcher: Arc::new(dispatcher),
            poll_interval_secs,
        }
    }

    pub fn dispatcher(&self) -> &QueueDispatcher {
        &self.dispatcher
    }
}

#[async_trait::async_trait]
impl Job for MailDispatchJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.poll_interval_secs)
    }

    fn run_on_start(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .dispatcher
            .run_cycle()
            .await
            .map_err(|e| format!("Failed to fetch pending mail: {}", e))?;

        if report.fetched == 0 {
            debug!(job = %self.name, "No pending mail");
        }

        Ok(())
    }
}
