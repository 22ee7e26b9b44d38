//! Durable storage for accepted-but-unconfirmed emails.
//!
//! An entry is written before the caller moves on and stays visible to
//! [`OutboxStore::fetch_unsent`] until a transport confirms the send. A
//! crash between transport call and `mark_sent` re-delivers at most once:
//! the outbox path is at-least-once, not exactly-once.

use crate::error::NotifyError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strum::{Display, EnumString};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

/// One email awaiting confirmed delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    pub to: String,
    /// Stored with the tenant prefix already applied.
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    /// Retry attempts made by flush cycles so far.
    pub attempts: u32,
}

impl OutboxEntry {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        body_text: impl Into<String>,
        body_html: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            to: to.into(),
            subject: subject.into(),
            body_text: body_text.into(),
            body_html,
            status: OutboxStatus::Pending,
            created_at: Utc::now(),
            attempts: 0,
        }
    }
}

/// The durability boundary for email delivery.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// All entries still awaiting a confirmed send, oldest first.
    async fn fetch_unsent(&self) -> Result<Vec<OutboxEntry>, NotifyError>;

    async fn save_unsent(&self, entry: &OutboxEntry) -> Result<(), NotifyError>;

    /// Confirm delivery; the entry stops appearing in `fetch_unsent`.
    async fn mark_sent(&self, id: &str) -> Result<(), NotifyError>;

    /// Give up on an entry after a permanent failure. Kept for inspection,
    /// no longer retried.
    async fn mark_failed(&self, id: &str) -> Result<(), NotifyError>;

    /// Count one more failed retry attempt.
    async fn record_attempt(&self, id: &str) -> Result<(), NotifyError>;

    async fn remove(&self, id: &str) -> Result<(), NotifyError>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// In-memory store for tests and single-process setups.
///
/// Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryOutboxStore {
    entries: Arc<RwLock<HashMap<String, OutboxEntry>>>,
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<OutboxEntry> {
        self.entries.read().await.get(id).cloned()
    }

    async fn update<F: FnOnce(&mut OutboxEntry)>(
        &self,
        id: &str,
        apply: F,
    ) -> Result<(), NotifyError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| NotifyError::Storage(format!("no outbox entry {id}")))?;
        apply(entry);
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn fetch_unsent(&self) -> Result<Vec<OutboxEntry>, NotifyError> {
        let entries = self.entries.read().await;
        let mut pending: Vec<_> = entries
            .values()
            .filter(|e| e.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.created_at);
        Ok(pending)
    }

    async fn save_unsent(&self, entry: &OutboxEntry) -> Result<(), NotifyError> {
        self.entries
            .write()
            .await
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn mark_sent(&self, id: &str) -> Result<(), NotifyError> {
        self.update(id, |e| e.status = OutboxStatus::Sent).await
    }

    async fn mark_failed(&self, id: &str) -> Result<(), NotifyError> {
        self.update(id, |e| e.status = OutboxStatus::Failed).await
    }

    async fn record_attempt(&self, id: &str) -> Result<(), NotifyError> {
        self.update(id, |e| e.attempts += 1).await
    }

    async fn remove(&self, id: &str) -> Result<(), NotifyError> {
        self.entries.write().await.remove(id);
        Ok(())
    }
}

// =============================================================================
// Redis implementation
// =============================================================================

/// Outbox on the shared Redis backend.
///
/// Keys:
/// - `notify:outbox:email:{id}` — entry JSON
/// - `notify:outbox:email:pending` — set of pending entry ids
///
/// The pending index is what `fetch_unsent` scans; confirming or failing an
/// entry rewrites its JSON and removes it from the index.
#[derive(Clone)]
pub struct RedisOutboxStore {
    redis: ConnectionManager,
}

impl RedisOutboxStore {
    const PENDING_KEY: &'static str = "notify:outbox:email:pending";

    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn entry_key(id: &str) -> String {
        format!("notify:outbox:email:{id}")
    }

    async fn load(&self, id: &str) -> Result<Option<OutboxEntry>, NotifyError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::entry_key(id))
            .query_async(&mut conn)
            .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, entry: &OutboxEntry) -> Result<(), NotifyError> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(entry)?;
        redis::cmd("SET")
            .arg(Self::entry_key(&entry.id))
            .arg(json)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn settle(&self, id: &str, status: OutboxStatus) -> Result<(), NotifyError> {
        let mut entry = self
            .load(id)
            .await?
            .ok_or_else(|| NotifyError::Storage(format!("no outbox entry {id}")))?;
        entry.status = status;

        let mut conn = self.redis.clone();
        let json = serde_json::to_string(&entry)?;
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(Self::entry_key(id))
            .arg(json)
            .ignore()
            .cmd("SREM")
            .arg(Self::PENDING_KEY)
            .arg(id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for RedisOutboxStore {
    async fn fetch_unsent(&self) -> Result<Vec<OutboxEntry>, NotifyError> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(Self::PENDING_KEY)
            .query_async(&mut conn)
            .await?;

        let mut pending = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load(&id).await? {
                Some(entry) if entry.status == OutboxStatus::Pending => pending.push(entry),
                // Index row without a live pending entry: clean it up
                _ => {
                    redis::cmd("SREM")
                        .arg(Self::PENDING_KEY)
                        .arg(&id)
                        .query_async::<()>(&mut conn)
                        .await?;
                }
            }
        }

        pending.sort_by_key(|e| e.created_at);
        Ok(pending)
    }

    async fn save_unsent(&self, entry: &OutboxEntry) -> Result<(), NotifyError> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(entry)?;
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(Self::entry_key(&entry.id))
            .arg(json)
            .ignore()
            .cmd("SADD")
            .arg(Self::PENDING_KEY)
            .arg(&entry.id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn mark_sent(&self, id: &str) -> Result<(), NotifyError> {
        self.settle(id, OutboxStatus::Sent).await
    }

    async fn mark_failed(&self, id: &str) -> Result<(), NotifyError> {
        self.settle(id, OutboxStatus::Failed).await
    }

    async fn record_attempt(&self, id: &str) -> Result<(), NotifyError> {
        let mut entry = self
            .load(id)
            .await?
            .ok_or_else(|| NotifyError::Storage(format!("no outbox entry {id}")))?;
        entry.attempts += 1;
        self.store(&entry).await
    }

    async fn remove(&self, id: &str) -> Result<(), NotifyError> {
        let mut conn = self.redis.clone();
        redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(Self::entry_key(id))
            .ignore()
            .cmd("SREM")
            .arg(Self::PENDING_KEY)
            .arg(id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
