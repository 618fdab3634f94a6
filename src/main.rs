//! Hermod: multi-tenant outbound communication worker.
//!
//! Supervises the two halves of the system: the dispatch engine draining
//! the job queue and the proactive scheduler refilling it. Coordinates
//! startup, signal handling, and graceful drain.

mod config;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use hermod_core::{storage, Clock, SystemClock};
use hermod_engine::DispatchEngine;
use hermod_providers::{DbTemplateRenderer, EmailRouter, HttpAttachmentFetcher, TwilioSms};
use hermod_scheduler::Scheduler;
use hermod_tenant::TenantGateway;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting Hermod communication worker");

    let config = Config::load()?;
    info!(
        central_db_url = %config.central_db_url_masked(),
        poll_interval_ms = config.poll_interval_ms,
        max_concurrent_jobs = config.max_concurrent_jobs,
        "configuration loaded"
    );

    let pool = create_central_pool(&config).await?;
    storage::ensure_schema(&pool).await.context("failed to prepare central schema")?;
    info!("central database ready");

    let store = storage::CentralStore::new(pool.clone());
    let gateway = Arc::new(TenantGateway::new(store.tenants.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let sms = Arc::new(TwilioSms::new().context("failed to initialise SMS adapter")?);
    let email = Arc::new(EmailRouter::new().context("failed to initialise email adapters")?);
    let attachments =
        Arc::new(HttpAttachmentFetcher::new().context("failed to initialise attachment fetcher")?);
    let renderer = Arc::new(DbTemplateRenderer::new(store.templates.clone()));

    let mut engine = DispatchEngine::new(
        store.jobs.clone(),
        gateway.clone(),
        gateway.clone(),
        email,
        sms,
        attachments,
        clock.clone(),
        config.to_dispatch_config(),
    );

    let mut scheduler = Scheduler::new(
        store.jobs.clone(),
        gateway.clone(),
        gateway.clone(),
        renderer,
        clock,
        config.to_sweep_intervals(),
    );

    engine.start();
    scheduler.start();
    info!("Hermod is processing communication jobs");

    shutdown_signal().await;
    info!("shutdown signal received, starting graceful drain");

    // Stop refilling first, then drain the in-flight handlers.
    scheduler.shutdown().await;
    if let Err(e) = engine.shutdown().await {
        error!(error = %e, "engine did not shut down cleanly");
    }

    gateway.close_pools().await;
    pool.close().await;
    info!("Hermod shutdown complete");

    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,hermod=debug"))
        .expect("invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the central pool, retrying while the database comes up.
async fn create_central_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .min_connections(1)
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(&config.central_db_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("failed to verify central database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "central database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to connect to the central database after retries");
            },
        }
    }
}

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
