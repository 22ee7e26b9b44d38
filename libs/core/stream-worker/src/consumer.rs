//! Stream consumer built on Redis consumer groups.

use crate::config::WorkerConfig;
use crate::error::StreamError;
use crate::registry::{StreamJob, JOB_FIELD};
use redis::aio::ConnectionManager;
use redis::RedisResult;
use tracing::{debug, info, warn};

type StreamReply = Vec<(String, Vec<(String, Vec<(String, String)>)>)>;

/// Stream consumer for Redis operations
pub struct StreamConsumer {
    redis: ConnectionManager,
    config: WorkerConfig,
}

impl StreamConsumer {
    pub fn new(redis: ConnectionManager, config: WorkerConfig) -> Self {
        Self { redis, config }
    }

    pub fn redis(&self) -> ConnectionManager {
        self.redis.clone()
    }

    pub fn consumer_id(&self) -> &str {
        &self.config.consumer_id
    }

    /// Create the consumer group if it doesn't exist yet.
    pub async fn ensure_consumer_group(&self) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
                Ok(())
            }
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Read messages delivered to this consumer but not yet acknowledged
    /// (redelivery after a crash or restart).
    pub async fn read_pending<J: StreamJob>(&self) -> Result<Vec<(String, J)>, StreamError> {
        let mut conn = self.redis.clone();

        let result: RedisResult<StreamReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg("0")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(streams) => self.parse_stream_reply(streams).await,
            Err(e) if e.to_string().contains("NOGROUP") => Ok(vec![]),
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Read new messages from the stream.
    pub async fn read_new<J: StreamJob>(&self) -> Result<Vec<(String, J)>, StreamError> {
        let mut conn = self.redis.clone();

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id);

        if let Some(timeout) = self.config.blocking_timeout_ms {
            cmd.arg("BLOCK").arg(timeout);
        }

        cmd.arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">");

        let result: RedisResult<Option<StreamReply>> = cmd.query_async(&mut conn).await;

        match result {
            Ok(Some(streams)) => self.parse_stream_reply(streams).await,
            // Blocking timeout elapsed with no messages
            Ok(None) => Ok(vec![]),
            Err(e) if e.to_string().contains("NOGROUP") => Ok(vec![]),
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Acknowledge a message.
    pub async fn ack(&self, message_id: &str) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let _: i64 = redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async(&mut conn)
            .await?;

        debug!(message_id = %message_id, "Acknowledged message");
        Ok(())
    }

    /// Claim messages abandoned by dead consumers.
    ///
    /// Messages pending on another consumer for longer than `claim_idle_ms`
    /// are transferred to this consumer and returned for processing.
    pub async fn claim_abandoned<J: StreamJob>(&self) -> Result<Vec<(String, J)>, StreamError> {
        let mut conn = self.redis.clone();

        let pending: RedisResult<Vec<(String, String, i64, i64)>> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(self.config.batch_size)
            .query_async(&mut conn)
            .await;

        let pending = match pending {
            Ok(p) => p,
            Err(e) if e.to_string().contains("NOGROUP") => return Ok(vec![]),
            Err(e) => return Err(StreamError::Redis(e)),
        };

        let claim_ids: Vec<String> = pending
            .iter()
            .filter(|(_, consumer, idle_ms, _)| {
                consumer != &self.config.consumer_id
                    && *idle_ms > self.config.claim_idle_ms as i64
            })
            .map(|(id, _, _, _)| id.clone())
            .collect();

        if claim_ids.is_empty() {
            return Ok(vec![]);
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(self.config.claim_idle_ms);
        for id in &claim_ids {
            cmd.arg(id);
        }

        let claimed: Vec<(String, Vec<(String, String)>)> = cmd.query_async(&mut conn).await?;

        info!(
            count = claimed.len(),
            stream = %self.config.stream_name,
            "Claimed abandoned messages"
        );

        self.decode_entries(claimed).await
    }

    async fn parse_stream_reply<J: StreamJob>(
        &self,
        streams: StreamReply,
    ) -> Result<Vec<(String, J)>, StreamError> {
        let entries = streams
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .collect();
        self.decode_entries(entries).await
    }

    /// Decode stream entries, acking poison messages away so they cannot be
    /// redelivered forever.
    async fn decode_entries<J: StreamJob>(
        &self,
        entries: Vec<(String, Vec<(String, String)>)>,
    ) -> Result<Vec<(String, J)>, StreamError> {
        let (jobs, poison) = split_decoded(entries);
        for message_id in poison {
            self.ack(&message_id).await?;
        }
        Ok(jobs)
    }
}

/// Split raw entries into decoded jobs and poison message ids.
///
/// A poison entry (no job field, or a payload that does not deserialize)
/// can never be processed; the caller acks the returned ids so the entry is
/// dropped instead of redelivered forever.
pub(crate) fn split_decoded<J: StreamJob>(
    entries: Vec<(String, Vec<(String, String)>)>,
) -> (Vec<(String, J)>, Vec<String>) {
    let mut jobs = Vec::with_capacity(entries.len());
    let mut poison = Vec::new();

    for (message_id, fields) in entries {
        let payload = fields.iter().find(|(name, _)| name == JOB_FIELD);

        match payload {
            Some((_, json)) => match serde_json::from_str::<J>(json) {
                Ok(job) => jobs.push((message_id, job)),
                Err(e) => {
                    warn!(
                        message_id = %message_id,
                        error = %e,
                        "Undecodable stream entry, dropping"
                    );
                    poison.push(message_id);
                }
            },
            None => {
                warn!(
                    message_id = %message_id,
                    "Stream entry without job field, dropping"
                );
                poison.push(message_id);
            }
        }
    }

    (jobs, poison)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestJob {
        id: String,
    }

    impl StreamJob for TestJob {
        fn job_id(&self) -> String {
            self.id.clone()
        }
    }

    fn entry(message_id: &str, fields: &[(&str, &str)]) -> (String, Vec<(String, String)>) {
        (
            message_id.to_string(),
            fields
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_valid_entry_decodes() {
        let entries = vec![entry("1-0", &[(JOB_FIELD, r#"{"id":"j1"}"#)])];

        let (jobs, poison) = split_decoded::<TestJob>(entries);

        assert_eq!(jobs, vec![("1-0".to_string(), TestJob { id: "j1".into() })]);
        assert!(poison.is_empty());
    }

    #[test]
    fn test_entry_without_job_field_is_poison() {
        let entries = vec![entry("1-0", &[("event", r#"{"id":"j1"}"#)])];

        let (jobs, poison) = split_decoded::<TestJob>(entries);

        assert!(jobs.is_empty());
        assert_eq!(poison, vec!["1-0".to_string()]);
    }

    #[test]
    fn test_undecodable_payload_is_poison() {
        let entries = vec![entry("1-0", &[(JOB_FIELD, "{not json")])];

        let (jobs, poison) = split_decoded::<TestJob>(entries);

        assert!(jobs.is_empty());
        assert_eq!(poison, vec!["1-0".to_string()]);
    }

    #[test]
    fn test_mixed_batch_keeps_good_jobs_in_order() {
        let entries = vec![
            entry("1-0", &[(JOB_FIELD, r#"{"id":"first"}"#)]),
            entry("2-0", &[(JOB_FIELD, "garbage")]),
            entry("3-0", &[("other", "x")]),
            entry("4-0", &[(JOB_FIELD, r#"{"id":"second"}"#)]),
        ];

        let (jobs, poison) = split_decoded::<TestJob>(entries);

        let ids: Vec<&str> = jobs.iter().map(|(_, j)| j.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_eq!(poison, vec!["2-0".to_string(), "3-0".to_string()]);
    }
}
