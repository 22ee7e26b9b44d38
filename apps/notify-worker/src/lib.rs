//! Notification Worker Service
//!
//! One engine instance: a stream worker consuming wallet lifecycle events
//! and an outbox flusher draining unconfirmed emails, sharing Redis with
//! every other running instance.
//!
//! ```text
//! Redis Stream (wallet:events)
//!   ↓ (Consumer Group: notify_workers)
//! StreamWorker<WalletEvent, NotificationEngine>
//!   ↓ resolve → dedup → render → deliver
//! SMTP / push gateway
//!   ↓ (transient email failure)
//! Redis outbox  ←  OutboxFlusher (lock-guarded, periodic)
//! ```
//!
//! Many instances may run concurrently: the consumer group hands each fresh
//! event to exactly one of them, and the distributed lock serializes outbox
//! flush cycles.

use core_config::redis::RedisConfig;
use core_config::{Environment, FromEnv};
use dist_lock::RedisLock;
use domain_notifications::{
    EmailChannel, EmailOpts, FlushConfig, HttpPushGateway, NotificationEngine, NotifyConfig,
    OutboxFlusher, PushChannel, PushOpts, RedisOutboxStore, SmtpConfig, SmtpMailer,
    TemplateEngine, WalletEvent, WalletEventStream,
};
use domain_wallet::RedisDirectory;
use eyre::{Result, WrapErr};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use stream_worker::{StreamWorker, WorkerConfig};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Run the notification worker.
///
/// Loads configuration from the environment, connects to Redis, wires the
/// engine and starts the worker and flusher tasks with graceful shutdown.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();

    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);
    info!("Starting notification worker. Environment: {:?}", environment);

    // Configuration
    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let notify_config = NotifyConfig::from_env().wrap_err("Failed to load notify configuration")?;
    let email_opts = EmailOpts::from_env().wrap_err("Failed to load email configuration")?;
    let smtp_config = SmtpConfig::from_env().wrap_err("Failed to load SMTP configuration")?;
    let push_opts = PushOpts::from_env().wrap_err("Failed to load push configuration")?;
    let flush_config = FlushConfig::from_env().wrap_err("Failed to load flush configuration")?;

    // Shared Redis connection
    info!("Connecting to Redis...");
    let client = redis::Client::open(redis_config.uri.clone())
        .wrap_err("Invalid Redis URI")?;
    let redis = ConnectionManager::new(client)
        .await
        .wrap_err("Failed to connect to Redis")?;
    info!("Connected to Redis");

    // Collaborators
    let directory = Arc::new(RedisDirectory::new(redis.clone()));
    let outbox = Arc::new(RedisOutboxStore::new(redis.clone()));
    let lock = Arc::new(RedisLock::new(redis.clone()));

    let mailer = SmtpMailer::new(smtp_config).wrap_err("Failed to build SMTP transport")?;
    let email_channel = Arc::new(EmailChannel::new(Arc::new(mailer), email_opts));

    let gateway = HttpPushGateway::new(&push_opts).wrap_err("Failed to build push client")?;
    let push_channel = PushChannel::new(Arc::new(gateway));

    let templates = TemplateEngine::new(notify_config.default_language.clone())
        .map_err(|e| eyre::eyre!("Failed to build template engine: {e}"))?;

    let engine = Arc::new(NotificationEngine::new(
        directory,
        templates,
        email_channel.clone(),
        push_channel,
        outbox.clone(),
        notify_config,
    ));

    // Shutdown signal shared by worker and flusher
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    // Outbox flusher task
    let flusher = OutboxFlusher::new(outbox, lock, email_channel, flush_config);
    let flusher_rx = shutdown_rx.clone();
    let flusher_handle = tokio::spawn(async move {
        flusher.run(flusher_rx).await;
    });

    // Stream worker (foreground)
    let worker_config = WorkerConfig::from_stream_def::<WalletEventStream>();
    info!(
        stream = %worker_config.stream_name,
        consumer_group = %worker_config.consumer_group,
        consumer_id = %worker_config.consumer_id,
        "Worker configuration loaded"
    );

    let worker = StreamWorker::<WalletEvent, _>::with_arc_processor(redis, engine, worker_config);
    worker
        .run(shutdown_rx)
        .await
        .map_err(|e| eyre::eyre!("{}", e))?;

    if let Err(e) = flusher_handle.await {
        error!(error = %e, "Flusher task panicked");
    }

    info!("Notification worker stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
