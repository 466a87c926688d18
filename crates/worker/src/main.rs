use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use domain::services::{QueueDispatcher, UnrecordedSends};
use mail_dispatcher::config::Config;
use mail_dispatcher::jobs::{JobScheduler, MailDispatchJob, PoolMetricsJob};
use mail_dispatcher::services::{HtmlTableRenderer, MailService};
use persistence::repositories::{
    MailQueueRepository, MailRecipientRepository, MailSendLogRepository,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    mail_dispatcher::logging::init_logging(&config.logging);

    info!("Starting mail dispatcher v{}", env!("CARGO_PKG_VERSION"));

    if config.metrics.enabled {
        let addr = config
            .metrics_addr()
            .context("metrics.listen_addr is not a socket address")?;
        mail_dispatcher::metrics::init_metrics(addr)?;
        info!(%addr, "Prometheus exporter listening");
    }

    let pool = persistence::db::create_pool(&config.pool_config()).await?;
    persistence::db::ping(&pool)
        .await
        .context("Database is not reachable")?;
    info!("Database connection established");

    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;
    info!("Migrations completed");

    let store = Arc::new(MailQueueRepository::new(pool.clone()));
    let recipients = Arc::new(MailRecipientRepository::new(pool.clone()));
    let send_log = Arc::new(MailSendLogRepository::new(pool.clone()));
    let transport = Arc::new(
        MailService::new(config.mail.clone()).context("Failed to initialise mail transport")?,
    );
    let renderer = Arc::new(HtmlTableRenderer::new());

    let mut scheduler = JobScheduler::new();
    scheduler.register(PoolMetricsJob::new(pool.clone()));

    if config.dispatcher.enabled {
        let unrecorded = UnrecordedSends::new();
        for index in 0..config.dispatcher.workers {
            let dispatcher = QueueDispatcher::new(
                store.clone(),
                recipients.clone(),
                transport.clone(),
                send_log.clone(),
                renderer.clone(),
                config.dispatcher_settings(),
            )
            .with_unrecorded_sends(unrecorded.clone());
            info!(
                worker = index,
                worker_id = %dispatcher.worker_id(),
                provider = transport.provider_name(),
                "Registering mail dispatch worker"
            );
            scheduler.register(MailDispatchJob::new(
                index,
                dispatcher,
                config.dispatcher.poll_interval_secs,
            ));
        }
    } else {
        warn!("Mail dispatch disabled by configuration");
    }

    scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    scheduler.shutdown();
    scheduler.wait_for_shutdown(SHUTDOWN_TIMEOUT).await;
    pool.close().await;

    info!("Mail dispatcher stopped");
    Ok(())
}
