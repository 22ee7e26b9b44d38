//! The wallet lookup boundary and its storage implementations.

use crate::{Preferences, PushSubscription, TxConfirmationSub, Wallet};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Wallet not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<redis::RedisError> for WalletError {
    fn from(err: redis::RedisError) -> Self {
        WalletError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::Storage(err.to_string())
    }
}

/// Read-only lookup of wallet and co-signer data.
///
/// Preferences and subscriptions are fetched per call, never cached, so a
/// co-signer's latest settings always win at delivery time.
#[async_trait]
pub trait WalletDirectory: Send + Sync {
    async fn get_wallet(&self, wallet_id: &str) -> Result<Wallet, WalletError>;

    /// Missing preferences resolve to the empty default, not an error.
    async fn get_preferences(&self, cosigner_id: &str) -> Result<Preferences, WalletError>;

    async fn push_subscriptions(
        &self,
        cosigner_id: &str,
    ) -> Result<Vec<PushSubscription>, WalletError>;

    /// Co-signer ids holding an active confirmation subscription for a txid.
    async fn tx_confirmation_subscribers(
        &self,
        wallet_id: &str,
        txid: &str,
    ) -> Result<Vec<String>, WalletError>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

#[derive(Default)]
struct MemoryState {
    wallets: HashMap<String, Wallet>,
    preferences: HashMap<String, Preferences>,
    push_subs: Vec<PushSubscription>,
    tx_subs: Vec<TxConfirmationSub>,
}

/// In-memory directory for tests and single-process setups.
///
/// Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_wallet(&self, wallet: Wallet) {
        let mut state = self.state.write().await;
        state.wallets.insert(wallet.id.clone(), wallet);
    }

    pub async fn save_preferences(&self, cosigner_id: impl Into<String>, prefs: Preferences) {
        let mut state = self.state.write().await;
        state.preferences.insert(cosigner_id.into(), prefs);
    }

    /// Append-only, matching the production subscription model.
    pub async fn subscribe_push(&self, sub: PushSubscription) {
        let mut state = self.state.write().await;
        state.push_subs.push(sub);
    }

    pub async fn subscribe_tx_confirmation(&self, sub: TxConfirmationSub) {
        let mut state = self.state.write().await;
        state.tx_subs.push(sub);
    }
}

#[async_trait]
impl WalletDirectory for MemoryDirectory {
    async fn get_wallet(&self, wallet_id: &str) -> Result<Wallet, WalletError> {
        let state = self.state.read().await;
        state
            .wallets
            .get(wallet_id)
            .cloned()
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))
    }

    async fn get_preferences(&self, cosigner_id: &str) -> Result<Preferences, WalletError> {
        let state = self.state.read().await;
        Ok(state
            .preferences
            .get(cosigner_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn push_subscriptions(
        &self,
        cosigner_id: &str,
    ) -> Result<Vec<PushSubscription>, WalletError> {
        let state = self.state.read().await;
        Ok(state
            .push_subs
            .iter()
            .filter(|s| s.cosigner_id == cosigner_id)
            .cloned()
            .collect())
    }

    async fn tx_confirmation_subscribers(
        &self,
        wallet_id: &str,
        txid: &str,
    ) -> Result<Vec<String>, WalletError> {
        let state = self.state.read().await;
        Ok(state
            .tx_subs
            .iter()
            .filter(|s| s.wallet_id == wallet_id && s.txid == txid && s.is_active)
            .map(|s| s.cosigner_id.clone())
            .collect())
    }
}

// =============================================================================
// Redis implementation
// =============================================================================

/// Directory view over the wallet service's shared Redis storage.
///
/// Keys:
/// - `wallet:{id}` — wallet JSON
/// - `wallet:prefs:{cosigner_id}` — preferences JSON
/// - `wallet:pushsubs:{cosigner_id}` — list of subscription JSON (append-only)
/// - `wallet:txsubs:{wallet_id}:{txid}` — set of subscribed co-signer ids
#[derive(Clone)]
pub struct RedisDirectory {
    redis: ConnectionManager,
}

impl RedisDirectory {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn wallet_key(wallet_id: &str) -> String {
        format!("wallet:{wallet_id}")
    }

    fn prefs_key(cosigner_id: &str) -> String {
        format!("wallet:prefs:{cosigner_id}")
    }

    fn push_subs_key(cosigner_id: &str) -> String {
        format!("wallet:pushsubs:{cosigner_id}")
    }

    fn tx_subs_key(wallet_id: &str, txid: &str) -> String {
        format!("wallet:txsubs:{wallet_id}:{txid}")
    }
}

#[async_trait]
impl WalletDirectory for RedisDirectory {
    async fn get_wallet(&self, wallet_id: &str) -> Result<Wallet, WalletError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::wallet_key(wallet_id))
            .query_async(&mut conn)
            .await?;

        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(WalletError::NotFound(wallet_id.to_string())),
        }
    }

    async fn get_preferences(&self, cosigner_id: &str) -> Result<Preferences, WalletError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(Self::prefs_key(cosigner_id))
            .query_async(&mut conn)
            .await?;

        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Preferences::default()),
        }
    }

    async fn push_subscriptions(
        &self,
        cosigner_id: &str,
    ) -> Result<Vec<PushSubscription>, WalletError> {
        let mut conn = self.redis.clone();
        let rows: Vec<String> = redis::cmd("LRANGE")
            .arg(Self::push_subs_key(cosigner_id))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        let mut subs = Vec::with_capacity(rows.len());
        for json in rows {
            subs.push(serde_json::from_str(&json)?);
        }
        Ok(subs)
    }

    async fn tx_confirmation_subscribers(
        &self,
        wallet_id: &str,
        txid: &str,
    ) -> Result<Vec<String>, WalletError> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(Self::tx_subs_key(wallet_id, txid))
            .query_async(&mut conn)
            .await?;
        Ok(ids)
    }
}
