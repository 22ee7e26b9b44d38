//! Wallet lifecycle events as published on the shared stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stream_worker::{StreamDef, StreamJob};
use strum::{Display, EnumString};
use uuid::Uuid;

/// The stream wallet events are published on.
pub struct WalletEventStream;

impl StreamDef for WalletEventStream {
    const STREAM_NAME: &'static str = "wallet:events";
    const CONSUMER_GROUP: &'static str = "notify_workers";
}

/// Kinds of wallet lifecycle events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A payment proposal was published.
    NewTxProposal,
    /// A co-signer added their signature to a proposal.
    TxProposalAcceptedBy,
    /// A proposal collected enough rejections to be dead.
    TxProposalFinallyRejected,
    /// A fully signed transaction was broadcast.
    NewOutgoingTx,
    /// Funds arrived at one of the wallet's addresses.
    NewIncomingTx,
    /// A watched transaction reached confirmation.
    TxConfirmation,
    /// A new co-signer joined the wallet.
    NewCoSigner,
}

impl EventType {
    /// Template set used to render this event, if it produces messages at
    /// all. Signature events are recorded on the stream but not messaged.
    pub fn template_name(&self) -> Option<&'static str> {
        match self {
            EventType::NewTxProposal => Some("new_tx_proposal"),
            EventType::TxProposalAcceptedBy => None,
            EventType::TxProposalFinallyRejected => Some("tx_proposal_rejected"),
            EventType::NewOutgoingTx => Some("new_outgoing_tx"),
            EventType::NewIncomingTx => Some("new_incoming_tx"),
            EventType::TxConfirmation => Some("tx_confirmation"),
            EventType::NewCoSigner => Some("new_cosigner"),
        }
    }
}

/// One wallet lifecycle event. Immutable once published.
///
/// `creator_id` is the co-signer whose action produced the event (absent for
/// externally originated events like incoming payments detected on chain).
/// `is_global` widens delivery to every eligible co-signer including the
/// creator; otherwise the creator is excluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub wallet_id: String,
    #[serde(default)]
    pub creator_id: Option<String>,
    /// Event-specific payload: txid, address, amount, rejection reason…
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub is_global: bool,
    pub created_on: DateTime<Utc>,
}

impl WalletEvent {
    pub fn new(event_type: EventType, wallet_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            wallet_id: wallet_id.into(),
            creator_id: None,
            data: serde_json::Value::Null,
            is_global: false,
            created_on: Utc::now(),
        }
    }

    pub fn with_creator(mut self, cosigner_id: impl Into<String>) -> Self {
        self.creator_id = Some(cosigner_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    /// Amount in base units (satoshis), when the payload carries one.
    pub fn amount(&self) -> Option<u64> {
        self.data.get("amount").and_then(|v| v.as_u64())
    }

    pub fn txid(&self) -> Option<&str> {
        self.data.get("txid").and_then(|v| v.as_str())
    }
}

impl StreamJob for WalletEvent {
    fn job_id(&self) -> String {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_serialization() {
        assert_eq!(EventType::NewIncomingTx.to_string(), "new_incoming_tx");
        assert_eq!(
            "tx_proposal_finally_rejected".parse::<EventType>().unwrap(),
            EventType::TxProposalFinallyRejected
        );
    }

    #[test]
    fn test_template_mapping() {
        assert_eq!(
            EventType::NewIncomingTx.template_name(),
            Some("new_incoming_tx")
        );
        assert_eq!(EventType::TxProposalAcceptedBy.template_name(), None);
    }

    #[test]
    fn test_event_round_trip() {
        let event = WalletEvent::new(EventType::NewIncomingTx, "w1")
            .with_data(json!({"txid": "abc", "amount": 12_300_000}))
            .global();

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"new_incoming_tx\""));

        let back: WalletEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, EventType::NewIncomingTx);
        assert_eq!(back.amount(), Some(12_300_000));
        assert_eq!(back.txid(), Some("abc"));
        assert!(back.is_global);
        assert!(back.creator_id.is_none());
    }

    #[test]
    fn test_payload_accessors_absent() {
        let event = WalletEvent::new(EventType::TxConfirmation, "w1");
        assert_eq!(event.amount(), None);
        assert_eq!(event.txid(), None);
    }
}
