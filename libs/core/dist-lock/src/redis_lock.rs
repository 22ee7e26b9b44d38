//! Redis-backed lock using `SET NX PX` with a compare-and-delete release.

use crate::{ttl_millis, LockError, LockGuard, LockService};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Release only succeeds when the stored holder still matches the guard.
/// Prevents a stale holder from deleting a lock that expired and was
/// re-acquired by someone else.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Distributed lock backed by shared Redis.
#[derive(Clone)]
pub struct RedisLock {
    redis: ConnectionManager,
    key_prefix: String,
}

impl RedisLock {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            key_prefix: "lock:".to_string(),
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn key(&self, resource: &str) -> String {
        format!("{}{}", self.key_prefix, resource)
    }
}

#[async_trait]
impl LockService for RedisLock {
    async fn try_lock(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, LockError> {
        let millis = ttl_millis(ttl)?;
        let holder_id = Uuid::new_v4().to_string();
        let mut conn = self.redis.clone();

        let outcome: Option<String> = redis::cmd("SET")
            .arg(self.key(resource))
            .arg(&holder_id)
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await?;

        match outcome {
            Some(_) => {
                debug!(resource = %resource, holder = %holder_id, "Acquired lock");
                Ok(Some(LockGuard {
                    resource: resource.to_string(),
                    holder_id,
                    expires_at: Utc::now() + chrono::Duration::milliseconds(millis as i64),
                }))
            }
            None => {
                debug!(resource = %resource, "Lock held elsewhere, skipping");
                Ok(None)
            }
        }
    }

    async fn release(&self, guard: LockGuard) -> Result<(), LockError> {
        let mut conn = self.redis.clone();

        let freed: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(self.key(&guard.resource))
            .arg(&guard.holder_id)
            .invoke_async(&mut conn)
            .await?;

        if freed == 0 {
            debug!(
                resource = %guard.resource,
                holder = %guard.holder_id,
                "Lock already expired or re-acquired, nothing released"
            );
        }
        Ok(())
    }
}
