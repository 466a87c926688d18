//! Background job scheduler and job implementations.

mod mail_dispatch;
mod pool_metrics;
mod scheduler;

pub use mail_dispatch::MailDispatchJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
