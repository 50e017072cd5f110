mod smtp;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use fundflow_core::clock::SystemClock;
use fundflow_core::config::{AppConfig, LoadOptions};
use fundflow_db::repositories::SqlOutboxRepository;
use fundflow_engine::{DrainerSettings, MailTransport, NoopMailTransport, OutboxDrainer};

use crate::smtp::SmtpMailTransport;

fn init_logging(config: &AppConfig) {
    use fundflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let pool = fundflow_db::connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await?;
    fundflow_db::migrations::run_pending(&pool).await?;

    let transport: Arc<dyn MailTransport> = match SmtpMailTransport::from_config(&config.mail)? {
        Some(smtp) => Arc::new(smtp),
        None => {
            tracing::warn!("no smtp host configured, draining to the log");
            Arc::new(NoopMailTransport)
        }
    };

    let drainer = OutboxDrainer::new(
        Arc::new(SqlOutboxRepository::new(pool.clone())),
        transport,
        DrainerSettings {
            interval_secs: config.mail.drain_interval_secs,
            batch_size: config.mail.drain_batch_size,
            max_attempts: config.mail.max_attempts,
        },
        Arc::new(SystemClock),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let drain_task = tokio::spawn(async move { drainer.run(shutdown_rx).await });

    tracing::info!(
        interval_secs = config.mail.drain_interval_secs,
        batch_size = config.mail.drain_batch_size,
        "fundflow-worker started"
    );

    wait_for_shutdown().await?;
    tracing::info!("fundflow-worker stopping");

    let _ = shutdown_tx.send(true);
    drain_task.await?;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
