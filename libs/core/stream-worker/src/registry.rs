//! Stream definitions and the job/processor traits.

use crate::error::StreamError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Stream definition trait.
///
/// Each domain implements this to pin its stream configuration, keeping
/// producers and workers consistent.
///
/// # Example
///
/// ```rust,ignore
/// pub struct WalletEventStream;
///
/// impl StreamDef for WalletEventStream {
///     const STREAM_NAME: &'static str = "wallet:events";
///     const CONSUMER_GROUP: &'static str = "notify_workers";
/// }
/// ```
/// The entry field job JSON is stored under; producers write it, consumers
/// decode it.
pub(crate) const JOB_FIELD: &str = "job";

pub trait StreamDef: Send + Sync {
    /// The Redis stream name (e.g. "wallet:events").
    const STREAM_NAME: &'static str;

    /// The consumer group name for this stream.
    const CONSUMER_GROUP: &'static str;

    /// Maximum stream length before auto-trim (MAXLEN ~).
    const MAX_LENGTH: i64 = 100_000;

    fn stream_name() -> &'static str {
        Self::STREAM_NAME
    }

    fn consumer_group() -> &'static str {
        Self::CONSUMER_GROUP
    }
}

/// Trait for stream payloads.
pub trait StreamJob: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the job ID for logging and tracking.
    fn job_id(&self) -> String;
}

/// Trait for event processors.
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl StreamProcessor<WalletEvent> for NotificationEngine {
///     async fn process(&self, event: &WalletEvent) -> Result<(), StreamError> {
///         self.fan_out(event).await
///     }
///
///     fn name(&self) -> &'static str {
///         "notification_engine"
///     }
/// }
/// ```
#[async_trait]
pub trait StreamProcessor<J: StreamJob>: Send + Sync {
    /// Process a single event.
    ///
    /// An `Err` is logged and the message acknowledged anyway: the event is
    /// skipped so it cannot block the rest of the stream. Processors that
    /// need durable retry must arrange it themselves.
    async fn process(&self, job: &J) -> Result<(), StreamError>;

    /// Get the processor name for logging.
    fn name(&self) -> &'static str;
}
