//! Worker configuration.

use crate::registry::StreamDef;
use uuid::Uuid;

/// Configuration for the stream worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Redis stream name
    pub stream_name: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Unique consumer ID (auto-generated if not provided)
    pub consumer_id: String,

    /// Poll interval in milliseconds when no messages are available
    pub poll_interval_ms: u64,

    /// Batch size for reading messages
    pub batch_size: usize,

    /// Blocking read timeout in milliseconds (None = non-blocking)
    pub blocking_timeout_ms: Option<u64>,

    /// Idle time in milliseconds before claiming abandoned messages
    pub claim_idle_ms: u64,
}

impl WorkerConfig {
    /// Create a WorkerConfig from a StreamDef
    pub fn from_stream_def<S: StreamDef>() -> Self {
        Self::new(S::STREAM_NAME, S::CONSUMER_GROUP)
    }

    /// Create a WorkerConfig with explicit values
    pub fn new(stream_name: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            consumer_group: consumer_group.into(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval_ms: 1000,
            batch_size: 10,
            blocking_timeout_ms: Some(5000),
            claim_idle_ms: 30_000,
        }
    }

    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    pub fn with_poll_interval_ms(mut self, interval: u64) -> Self {
        self.poll_interval_ms = interval;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the blocking timeout (None for non-blocking reads)
    pub fn with_blocking(mut self, timeout_ms: Option<u64>) -> Self {
        self.blocking_timeout_ms = timeout_ms;
        self
    }

    pub fn with_claim_idle_ms(mut self, idle_ms: u64) -> Self {
        self.claim_idle_ms = idle_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestStream;

    impl StreamDef for TestStream {
        const STREAM_NAME: &'static str = "test:stream";
        const CONSUMER_GROUP: &'static str = "test_group";
    }

    #[test]
    fn test_from_stream_def() {
        let config = WorkerConfig::from_stream_def::<TestStream>();

        assert_eq!(config.stream_name, "test:stream");
        assert_eq!(config.consumer_group, "test_group");
        assert!(config.consumer_id.starts_with("worker-"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = WorkerConfig::new("my:stream", "my_group")
            .with_consumer_id("worker-1")
            .with_batch_size(20)
            .with_blocking(None)
            .with_claim_idle_ms(5000);

        assert_eq!(config.consumer_id, "worker-1");
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.blocking_timeout_ms, None);
        assert_eq!(config.claim_idle_ms, 5000);
    }
}
