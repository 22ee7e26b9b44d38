//! Named, TTL-scoped mutual exclusion shared across service instances.
//!
//! Acquisition is non-blocking with fail-fast semantics: losing an attempt is
//! not an error, only a signal to skip the current cycle. Every lock expires
//! after its TTL so a crashed holder can never wedge the resource.
//!
//! Two implementations:
//! - [`RedisLock`]: backed by shared Redis (`SET NX PX` + compare-and-delete
//!   release), for multi-instance deployments.
//! - [`MemoryLock`]: process-local, for tests and single-instance setups.

mod memory;
mod redis_lock;

pub use memory::MemoryLock;
pub use redis_lock::RedisLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Lock acquisition/release errors
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid lock TTL: {0:?}")]
    InvalidTtl(Duration),
}

/// Proof of a held lock.
///
/// The lock is valid only while unexpired; pass the guard back to
/// [`LockService::release`] to free it early.
#[derive(Debug, Clone)]
pub struct LockGuard {
    pub resource: String,
    pub holder_id: String,
    pub expires_at: DateTime<Utc>,
}

impl LockGuard {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Non-blocking, TTL-based mutual exclusion.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try to acquire the named lock.
    ///
    /// Returns `Ok(None)` when another holder currently owns the resource;
    /// contention is expected, not an error.
    async fn try_lock(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, LockError>;

    /// Release a held lock.
    ///
    /// A guard whose lock already expired (and was possibly re-acquired by
    /// another holder) is ignored: release only frees a lock still owned by
    /// the guard's holder.
    async fn release(&self, guard: LockGuard) -> Result<(), LockError>;
}

pub(crate) fn ttl_millis(ttl: Duration) -> Result<u64, LockError> {
    let millis = ttl.as_millis();
    if millis == 0 {
        return Err(LockError::InvalidTtl(ttl));
    }
    Ok(millis as u64)
}
