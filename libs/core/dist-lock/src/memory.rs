//! Process-local lock with the same expiry semantics as the Redis variant.

use crate::{ttl_millis, LockError, LockGuard, LockService};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Holder {
    holder_id: String,
    expires_at: DateTime<Utc>,
}

/// In-process lock service.
///
/// Cloning shares the underlying state, so several components (or several
/// engine instances in a test) can contend for the same resources.
#[derive(Clone, Default)]
pub struct MemoryLock {
    held: Arc<Mutex<HashMap<String, Holder>>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockService for MemoryLock {
    async fn try_lock(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, LockError> {
        let millis = ttl_millis(ttl)?;
        let now = Utc::now();
        let mut held = self.held.lock().await;

        if let Some(current) = held.get(resource) {
            if current.expires_at > now {
                return Ok(None);
            }
        }

        let holder_id = Uuid::new_v4().to_string();
        let expires_at = now + chrono::Duration::milliseconds(millis as i64);
        held.insert(
            resource.to_string(),
            Holder {
                holder_id: holder_id.clone(),
                expires_at,
            },
        );

        Ok(Some(LockGuard {
            resource: resource.to_string(),
            holder_id,
            expires_at,
        }))
    }

    async fn release(&self, guard: LockGuard) -> Result<(), LockError> {
        let mut held = self.held.lock().await;
        if let Some(current) = held.get(&guard.resource) {
            if current.holder_id == guard.holder_id {
                held.remove(&guard.resource);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_fails_while_held() {
        let lock = MemoryLock::new();
        let ttl = Duration::from_secs(10);

        let guard = lock.try_lock("flush", ttl).await.unwrap();
        assert!(guard.is_some());

        let contender = lock.try_lock("flush", ttl).await.unwrap();
        assert!(contender.is_none());
    }

    #[tokio::test]
    async fn test_release_frees_the_resource() {
        let lock = MemoryLock::new();
        let ttl = Duration::from_secs(10);

        let guard = lock.try_lock("flush", ttl).await.unwrap().unwrap();
        lock.release(guard).await.unwrap();

        assert!(lock.try_lock("flush", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_reacquired() {
        let lock = MemoryLock::new();

        let guard = lock
            .try_lock("flush", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(guard.is_expired());

        let reacquired = lock
            .try_lock("flush", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(reacquired.is_some());
    }

    #[tokio::test]
    async fn test_stale_release_does_not_free_new_holder() {
        let lock = MemoryLock::new();

        let stale = lock
            .try_lock("flush", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let fresh = lock
            .try_lock("flush", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(fresh.is_some());

        // The stale guard must not release the fresh holder's lock.
        lock.release(stale).await.unwrap();
        assert!(lock
            .try_lock("flush", Duration::from_secs(10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_distinct_resources_do_not_contend() {
        let lock = MemoryLock::new();
        let ttl = Duration::from_secs(10);

        assert!(lock.try_lock("a", ttl).await.unwrap().is_some());
        assert!(lock.try_lock("b", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let lock = MemoryLock::new();
        let err = lock.try_lock("flush", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, LockError::InvalidTtl(_)));
    }
}
