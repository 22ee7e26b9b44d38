//! Periodic, lock-guarded draining of the email outbox.
//!
//! Every instance runs a flusher; only the one holding the distributed lock
//! does any work in a given cycle. Contention is not an error, the losing
//! instance simply skips its turn.

use crate::channels::email::EmailChannel;
use crate::channels::Delivery;
use crate::error::NotifyError;
use crate::outbox::OutboxStore;
use core_config::{env_parse_or, ConfigError, FromEnv};
use dist_lock::LockService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Lock resource serializing flush cycles across all instances.
pub const FLUSH_LOCK_RESOURCE: &str = "notify:outbox:flush";

#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// Time between flush cycles.
    pub interval: Duration,
    /// Lock TTL; must comfortably exceed one cycle so a crashed holder
    /// blocks at most one period.
    pub lock_ttl: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            lock_ttl: Duration::from_secs(30),
        }
    }
}

impl FromEnv for FlushConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            interval: Duration::from_secs(env_parse_or("OUTBOX_FLUSH_INTERVAL_SECS", 60)),
            lock_ttl: Duration::from_secs(env_parse_or("OUTBOX_FLUSH_LOCK_TTL_SECS", 30)),
        })
    }
}

/// Drains pending outbox entries under the distributed lock.
pub struct OutboxFlusher {
    store: Arc<dyn OutboxStore>,
    lock: Arc<dyn LockService>,
    channel: Arc<EmailChannel>,
    config: FlushConfig,
}

impl OutboxFlusher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        lock: Arc<dyn LockService>,
        channel: Arc<EmailChannel>,
        config: FlushConfig,
    ) -> Self {
        Self {
            store,
            lock,
            channel,
            config,
        }
    }

    /// Run flush cycles until the shutdown signal flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = %self.config.interval.as_secs(),
            "Starting outbox flusher"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Received shutdown signal, stopping flusher");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.flush_once().await {
                        Ok(Some(sent)) if sent > 0 => {
                            info!(sent = %sent, "Outbox flush cycle complete");
                        }
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            debug!("Flush lock held elsewhere, skipping cycle");
                        }
                        Err(e) => {
                            // Aborted mid-cycle; whatever is still pending is
                            // picked up next period.
                            warn!(error = %e, "Flush cycle aborted");
                        }
                    }
                }
            }
        }
    }

    /// One flush cycle.
    ///
    /// Returns `None` when another instance holds the lock (the cycle is
    /// skipped entirely), otherwise the number of entries confirmed sent.
    pub async fn flush_once(&self) -> Result<Option<usize>, NotifyError> {
        let Some(guard) = self
            .lock
            .try_lock(FLUSH_LOCK_RESOURCE, self.config.lock_ttl)
            .await?
        else {
            return Ok(None);
        };

        let result = self.drain().await;

        // Release regardless of how the drain went; the TTL is only the
        // crash backstop.
        if let Err(e) = self.lock.release(guard).await {
            warn!(error = %e, "Failed to release flush lock, waiting for expiry");
        }

        result.map(Some)
    }

    async fn drain(&self) -> Result<usize, NotifyError> {
        let pending = self.store.fetch_unsent().await?;
        if pending.is_empty() {
            return Ok(0);
        }

        debug!(pending = %pending.len(), "Draining outbox");
        let mut sent = 0;

        for entry in pending {
            match self.channel.resend(&entry).await {
                Delivery::Sent => {
                    self.store.mark_sent(&entry.id).await?;
                    sent += 1;
                }
                Delivery::Transient(reason) => {
                    warn!(outbox_id = %entry.id, attempts = %(entry.attempts + 1), reason = %reason,
                        "Outbox retry failed, keeping pending");
                    self.store.record_attempt(&entry.id).await?;
                }
                Delivery::Permanent(reason) => {
                    warn!(outbox_id = %entry.id, reason = %reason,
                        "Outbox entry permanently undeliverable");
                    self.store.mark_failed(&entry.id).await?;
                }
            }
        }

        Ok(sent)
    }
}
