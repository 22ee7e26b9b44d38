//! Stream error types.

use thiserror::Error;

/// Stream processing errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Event processing failed; the message is logged and skipped
    #[error("Processing error: {0}")]
    Processing(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StreamError {
    pub fn processing(message: impl Into<String>) -> Self {
        StreamError::Processing(message.into())
    }

    /// Consumer group disappeared (e.g. Redis was flushed); the worker
    /// recreates it and continues.
    pub fn is_nogroup_error(&self) -> bool {
        matches!(self, StreamError::Redis(e) if e.to_string().contains("NOGROUP"))
    }

    /// Connection-level failure; the worker backs off before retrying.
    pub fn is_connection_error(&self) -> bool {
        let StreamError::Redis(e) = self else {
            return false;
        };
        let msg = e.to_string().to_lowercase();
        msg.contains("connection")
            || msg.contains("disconnected")
            || msg.contains("broken pipe")
            || msg.contains("reset by peer")
            || msg.contains("refused")
            || msg.contains("timed out")
            || msg.contains("io error")
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_helper() {
        let err = StreamError::processing("boom");
        assert!(matches!(err, StreamError::Processing(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_serde_error_maps_to_serialization() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StreamError = parse_err.into();
        assert!(matches!(err, StreamError::Serialization(_)));
    }

    #[test]
    fn test_non_redis_errors_are_not_connection_errors() {
        assert!(!StreamError::processing("connection refused").is_connection_error());
        assert!(!StreamError::Config("NOGROUP".into()).is_nogroup_error());
    }

    #[test]
    fn test_nogroup_redis_error_detected() {
        let redis_err: redis::RedisError = (
            redis::ErrorKind::Server(redis::ServerErrorKind::ResponseError),
            "NOGROUP",
            "No such consumer group".to_string(),
        )
            .into();
        let err = StreamError::Redis(redis_err);

        assert!(err.is_nogroup_error());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_connection_redis_error_detected() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Connection refused");
        let err = StreamError::Redis(redis::RedisError::from(io));

        assert!(err.is_connection_error());
        assert!(!err.is_nogroup_error());
    }
}
