//! Stream producer for publishing events.

use crate::error::StreamError;
use crate::registry::{StreamDef, JOB_FIELD};
use redis::aio::ConnectionManager;
use serde::Serialize;
use tracing::debug;

/// Generic stream producer.
///
/// Used by whatever publishes wallet lifecycle events (the wallet service,
/// a chain monitor, tests) to append entries the workers consume.
#[derive(Clone)]
pub struct StreamProducer {
    redis: ConnectionManager,
    stream_name: String,
    max_length: i64,
}

impl StreamProducer {
    pub fn new(redis: ConnectionManager, stream_name: impl Into<String>) -> Self {
        Self {
            redis,
            stream_name: stream_name.into(),
            max_length: 100_000,
        }
    }

    /// Create a producer from a `StreamDef`, keeping the stream name and
    /// trim length consistent with the worker.
    pub fn from_stream_def<S: StreamDef>(redis: ConnectionManager) -> Self {
        Self {
            redis,
            stream_name: S::STREAM_NAME.to_string(),
            max_length: S::MAX_LENGTH,
        }
    }

    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Publish an event. Returns the Redis stream message ID.
    pub async fn send<J: Serialize>(&self, job: &J) -> Result<String, StreamError> {
        let mut conn = self.redis.clone();

        let cmd = xadd_command(&self.stream_name, self.max_length, job)?;
        let stream_id: String = cmd.query_async(&mut conn).await?;

        debug!(
            stream = %self.stream_name,
            stream_id = %stream_id,
            "Published event"
        );

        Ok(stream_id)
    }
}

/// Build the XADD a producer issues: job JSON under the field the consumer
/// decodes, with approximate trimming (MAXLEN ~ is cheaper than exact).
fn xadd_command<J: Serialize>(
    stream_name: &str,
    max_length: i64,
    job: &J,
) -> Result<redis::Cmd, StreamError> {
    let job_json = serde_json::to_string(job)?;

    let mut cmd = redis::cmd("XADD");
    cmd.arg(stream_name)
        .arg("MAXLEN")
        .arg("~")
        .arg(max_length)
        .arg("*")
        .arg(JOB_FIELD)
        .arg(&job_json);

    Ok(cmd)
}
