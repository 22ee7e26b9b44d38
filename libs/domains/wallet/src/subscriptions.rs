use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device registration for push delivery.
///
/// Storage is append-only: re-registering the same device adds another row,
/// and duplicates are collapsed at send time by the delivery pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub cosigner_id: String,
    pub token: String,
    pub package_name: String,
    pub platform: String,
    pub created_on: DateTime<Utc>,
}

impl PushSubscription {
    pub fn new(
        cosigner_id: impl Into<String>,
        token: impl Into<String>,
        package_name: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            cosigner_id: cosigner_id.into(),
            token: token.into(),
            package_name: package_name.into(),
            platform: platform.into(),
            created_on: Utc::now(),
        }
    }
}

/// A co-signer's request to be told when a specific transaction confirms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxConfirmationSub {
    pub wallet_id: String,
    pub cosigner_id: String,
    pub txid: String,
    pub is_active: bool,
    pub created_on: DateTime<Utc>,
}

impl TxConfirmationSub {
    pub fn new(
        wallet_id: impl Into<String>,
        cosigner_id: impl Into<String>,
        txid: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            cosigner_id: cosigner_id.into(),
            txid: txid.into(),
            is_active: true,
            created_on: Utc::now(),
        }
    }
}
