//! Prometheus exporter installation.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the global recorder and serve `/metrics` on `addr`.
///
/// Must be called from within the tokio runtime, once, before any metric
/// is recorded.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(&[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0])?
        .install()?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "mail_dispatch_total",
        "Queue entries handled, labelled by outcome"
    );
    describe_counter!(
        "mail_send_log_write_failures_total",
        "Send log rows that could not be written"
    );
    describe_counter!(
        "mail_queue_update_failures_total",
        "Queue rows whose final status could not be recorded"
    );
    describe_counter!("job_failures_total", "Failed background job runs");
    describe_histogram!(
        "job_duration_seconds",
        Unit::Seconds,
        "Background job run duration"
    );
    describe_histogram!(
        "database_query_duration_seconds",
        Unit::Seconds,
        "Database query duration"
    );
    describe_gauge!("database_connections_active", "Connections in use");
    describe_gauge!("database_connections_idle", "Idle connections");
    describe_gauge!("database_connections_total", "Open connections");
}
