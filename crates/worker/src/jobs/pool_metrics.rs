//! Background job to record connection pool metrics.

use sqlx::PgPool;

use super::scheduler::{Job, JobFrequency};

/// Job that periodically publishes database pool gauges.
pub struct PoolMetricsJob {
    pool: PgPool,
    frequency: JobFrequency,
}

impl PoolMetricsJob {
    /// Create a pool metrics job reporting once a minute.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            frequency: JobFrequency::Minutes(1),
        }
    }

    pub fn with_frequency(mut self, frequency: JobFrequency) -> Self {
        self.frequency = frequency;
        self
    }
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &str {
        "pool_metrics"
    }

    fn frequency(&self) -> JobFrequency {
        self.frequency
    }

    fn run_on_start(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<(), String> {
        persistence::metrics::record_pool_metrics(&self.pool);
        Ok(())
    }
}
