//! Error types for the notification pipeline.

use domain_wallet::WalletError;
use thiserror::Error;

/// Errors raised while fanning out notifications.
///
/// Scope matters more than kind here: a `Template` error skips one
/// recipient, a `Resolution` error skips the whole event, and `Storage`
/// aborts an outbox flush cycle (retried next period). None of them may
/// spill over into other events.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Recipient resolution failed: {0}")]
    Resolution(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<WalletError> for NotifyError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::NotFound(id) => NotifyError::Resolution(format!("wallet not found: {id}")),
            WalletError::Storage(msg) => NotifyError::Storage(msg),
        }
    }
}

impl From<redis::RedisError> for NotifyError {
    fn from(err: redis::RedisError) -> Self {
        NotifyError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for NotifyError {
    fn from(err: serde_json::Error) -> Self {
        NotifyError::Storage(err.to_string())
    }
}

impl From<dist_lock::LockError> for NotifyError {
    fn from(err: dist_lock::LockError) -> Self {
        NotifyError::Lock(err.to_string())
    }
}
