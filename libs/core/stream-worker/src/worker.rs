//! The generic worker loop.

use crate::config::WorkerConfig;
use crate::consumer::StreamConsumer;
use crate::error::StreamError;
use crate::registry::{StreamJob, StreamProcessor};
use redis::aio::ConnectionManager;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Generic stream worker that drives a processor from a consumer group.
///
/// Encapsulates the run loop: consumer group management, pending-message
/// recovery on startup, periodic claim of abandoned messages, connection
/// backoff and graceful shutdown. A processing error is logged and the
/// message acknowledged — a failing event is skipped, never retried in place
/// (the event source is at-least-once; durable retry belongs to the
/// processor's own storage).
pub struct StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J>,
{
    consumer: StreamConsumer,
    processor: Arc<P>,
    config: WorkerConfig,
    _phantom: PhantomData<J>,
}

impl<J, P> StreamWorker<J, P>
where
    J: StreamJob + 'static,
    P: StreamProcessor<J> + 'static,
{
    pub fn new(redis: ConnectionManager, processor: P, config: WorkerConfig) -> Self {
        Self::with_arc_processor(redis, Arc::new(processor), config)
    }

    pub fn with_arc_processor(
        redis: ConnectionManager,
        processor: Arc<P>,
        config: WorkerConfig,
    ) -> Self {
        let consumer = StreamConsumer::new(redis, config.clone());
        Self {
            consumer,
            processor,
            config,
            _phantom: PhantomData,
        }
    }

    pub fn consumer(&self) -> &StreamConsumer {
        &self.consumer
    }

    /// Run the worker loop until the shutdown signal flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            processor = %self.processor.name(),
            "Starting stream worker"
        );

        self.consumer.ensure_consumer_group().await?;

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let claim_interval = Duration::from_millis(self.config.claim_idle_ms * 2);
        let mut last_claim = std::time::Instant::now();
        let is_blocking = self.config.blocking_timeout_ms.is_some();

        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            match self.process_batch().await {
                Ok(_) => {
                    if consecutive_errors > 0 {
                        info!("Connection recovered after {} errors", consecutive_errors);
                        consecutive_errors = 0;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;

                    if e.is_nogroup_error() {
                        warn!("Consumer group missing, recreating...");
                        if let Err(create_err) = self.consumer.ensure_consumer_group().await {
                            error!(error = %create_err, "Failed to recreate consumer group");
                        }
                    } else if e.is_connection_error() {
                        let backoff_secs = backoff_secs(consecutive_errors);
                        warn!(
                            error = %e,
                            consecutive_errors = %consecutive_errors,
                            backoff_secs = %backoff_secs,
                            "Redis connection error, backing off"
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    } else {
                        error!(error = %e, "Error processing batch");
                    }

                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }

            if last_claim.elapsed() >= claim_interval {
                if let Err(e) = self.claim_and_process().await {
                    debug!(error = %e, "Error claiming abandoned messages");
                }
                last_claim = std::time::Instant::now();
            }

            // In blocking mode the XREADGROUP BLOCK call does the waiting
            if !is_blocking {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Received shutdown signal, stopping worker");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }

        info!("Stream worker stopped");
        Ok(())
    }

    /// Process one batch: redelivered messages first, then new ones.
    async fn process_batch(&self) -> Result<(), StreamError> {
        let pending = self.consumer.read_pending::<J>().await?;
        let new_messages = self.consumer.read_new::<J>().await?;

        for (message_id, job) in pending.into_iter().chain(new_messages) {
            self.process_one(&message_id, &job).await;
        }

        Ok(())
    }

    async fn claim_and_process(&self) -> Result<(), StreamError> {
        let claimed = self.consumer.claim_abandoned::<J>().await?;
        for (message_id, job) in claimed {
            self.process_one(&message_id, &job).await;
        }
        Ok(())
    }

    async fn process_one(&self, message_id: &str, job: &J) {
        debug!(
            message_id = %message_id,
            job_id = %job.job_id(),
            "Processing event"
        );

        if let Err(e) = self.processor.process(job).await {
            warn!(
                message_id = %message_id,
                job_id = %job.job_id(),
                error = %e,
                "Event processing failed, skipping"
            );
        }

        // Ack regardless of outcome so one event never blocks the stream
        if let Err(e) = self.consumer.ack(message_id).await {
            error!(message_id = %message_id, error = %e, "Failed to ACK message");
        }
    }
}

const MAX_BACKOFF_SECS: u64 = 30;

/// Exponential backoff for consecutive connection errors, capped.
fn backoff_secs(consecutive_errors: u32) -> u64 {
    std::cmp::min(2u64.pow(consecutive_errors.min(5)), MAX_BACKOFF_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(2), 4);
        assert_eq!(backoff_secs(4), 16);
        assert_eq!(backoff_secs(5), 30);
        assert_eq!(backoff_secs(50), 30);
    }
}
