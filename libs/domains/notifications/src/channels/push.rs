//! Push delivery: the `PushGateway` capability and the channel built on it.
//!
//! Payloads never carry raw identities. The gateway operator sees only
//! one-way hashes of wallet and co-signer ids, enough for a client holding
//! the real ids to match against, useless for recovering them.

use crate::channels::Delivery;
use crate::config::PushOpts;
use crate::event::WalletEvent;
use crate::templates::RenderedMessage;
use async_trait::async_trait;
use eyre::{eyre, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error};

/// One-way hash used wherever a co-signer or wallet id crosses the gateway
/// boundary.
pub fn hash_identity(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// The visible part of a push message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

/// What gets POSTed to the gateway for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    pub notification: PushNotification,
    pub data: Value,
}

/// Capability to deliver one push message to one device.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, token: &str, package_name: &str, payload: &PushPayload) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Gateway wire format: payload plus device addressing.
#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    to: &'a str,
    restricted_package_name: &'a str,
    notification: &'a PushNotification,
    data: &'a Value,
}

/// HTTP gateway client. POSTs to `{push_server_url}/send` with the
/// configured authorization credential; the per-call timeout lives on the
/// client, so a hung gateway surfaces as a transient error.
pub struct HttpPushGateway {
    client: Client,
    url: String,
    authorization_key: String,
}

impl HttpPushGateway {
    pub fn new(opts: &PushOpts) -> Result<Self> {
        let client = Client::builder()
            .timeout(opts.timeout)
            .build()
            .map_err(|e| eyre!("Failed to build push client: {e}"))?;

        Ok(Self {
            client,
            url: format!("{}/send", opts.push_server_url.trim_end_matches('/')),
            authorization_key: opts.authorization_key.clone(),
        })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send(&self, token: &str, package_name: &str, payload: &PushPayload) -> Result<()> {
        let request = GatewayRequest {
            to: token,
            restricted_package_name: package_name,
            notification: &payload.notification,
            data: &payload.data,
        };

        debug!(package = %package_name, title = %payload.notification.title, "Posting push message");

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", &self.authorization_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| eyre!("Push gateway request failed: {e}"))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error_body = response.text().await.unwrap_or_default();
        error!(status = %status, error = %error_body, "Push gateway error");

        match status.as_u16() {
            400 => Err(eyre!("invalid request: {error_body}")),
            401 | 403 => Err(eyre!("authentication failed")),
            _ => Err(eyre!("push gateway error ({status}): {error_body}")),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Capturing gateway for tests.
pub struct MockPushGateway {
    sent: Arc<tokio::sync::Mutex<Vec<(String, String, PushPayload)>>>,
    failure: Arc<tokio::sync::Mutex<Option<String>>>,
}

impl MockPushGateway {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            failure: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            sent: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            failure: Arc::new(tokio::sync::Mutex::new(Some(message.into()))),
        }
    }

    /// Sent messages as (token, package_name, payload) triples.
    pub async fn sent(&self) -> Vec<(String, String, PushPayload)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

impl Default for MockPushGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushGateway for MockPushGateway {
    async fn send(&self, token: &str, package_name: &str, payload: &PushPayload) -> Result<()> {
        if let Some(message) = self.failure.lock().await.clone() {
            return Err(eyre!(message));
        }

        self.sent
            .lock()
            .await
            .push((token.to_string(), package_name.to_string(), payload.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// The push delivery channel. Best-effort: there is no outbox behind it, a
/// failed send is logged and dropped.
pub struct PushChannel {
    gateway: Arc<dyn PushGateway>,
}

impl PushChannel {
    pub fn new(gateway: Arc<dyn PushGateway>) -> Self {
        Self { gateway }
    }

    /// Build the payload for one recipient device.
    ///
    /// Event payload fields ride along in `data` so clients can deep-link;
    /// wallet, creator and recipient ids are hashed before inclusion.
    pub fn build_payload(
        &self,
        event: &WalletEvent,
        recipient_id: &str,
        rendered: &RenderedMessage,
    ) -> PushPayload {
        let mut data = match &event.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };

        data.insert("event_type".to_string(), json!(event.event_type.to_string()));
        data.insert("wallet_id".to_string(), json!(hash_identity(&event.wallet_id)));
        data.insert("cosigner_id".to_string(), json!(hash_identity(recipient_id)));
        if let Some(creator) = &event.creator_id {
            data.insert("creator_id".to_string(), json!(hash_identity(creator)));
        }

        PushPayload {
            notification: PushNotification {
                title: rendered.subject.clone(),
                body: rendered.body_text.clone(),
            },
            data: Value::Object(data),
        }
    }

    pub async fn send(&self, token: &str, package_name: &str, payload: &PushPayload) -> Delivery {
        match self.gateway.send(token, package_name, payload).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                let msg = format!("{e:#}");
                let lower = msg.to_lowercase();
                if lower.contains("invalid") || lower.contains("authentication") {
                    Delivery::Permanent(msg)
                } else {
                    Delivery::Transient(msg)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;

    fn rendered() -> RenderedMessage {
        RenderedMessage {
            subject: "New payment received".to_string(),
            body_text: "A payment of 0.123 BTC arrived.".to_string(),
            body_html: None,
        }
    }

    #[test]
    fn test_hash_identity_is_stable_hex() {
        let h = hash_identity("cosigner-1");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_identity("cosigner-1"));
        assert_ne!(h, hash_identity("cosigner-2"));
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_payload_hashes_identities() {
        let channel = PushChannel::new(Arc::new(MockPushGateway::new()));
        let event = WalletEvent::new(EventType::NewIncomingTx, "w1")
            .with_creator("c1")
            .with_data(json!({"txid": "abc", "amount": 12_300_000}));

        let payload = channel.build_payload(&event, "c2", &rendered());
        let data = payload.data.as_object().unwrap();

        assert_eq!(data["wallet_id"], json!(hash_identity("w1")));
        assert_eq!(data["cosigner_id"], json!(hash_identity("c2")));
        assert_eq!(data["creator_id"], json!(hash_identity("c1")));
        // Raw ids never appear
        let raw = serde_json::to_string(&payload).unwrap();
        assert!(!raw.contains("\"w1\""));
        assert!(!raw.contains("\"c1\""));
        assert!(!raw.contains("\"c2\""));
        // Event payload fields ride along
        assert_eq!(data["txid"], json!("abc"));
        assert_eq!(data["event_type"], json!("new_incoming_tx"));
    }

    #[tokio::test]
    async fn test_send_success_captures_destination() {
        let gateway = Arc::new(MockPushGateway::new());
        let channel = PushChannel::new(gateway.clone());
        let event = WalletEvent::new(EventType::NewIncomingTx, "w1");

        let payload = channel.build_payload(&event, "c2", &rendered());
        let outcome = channel.send("tok1", "com.wallet", &payload).await;
        assert!(outcome.is_sent());

        let sent = gateway.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "tok1");
        assert_eq!(sent[0].1, "com.wallet");
    }

    #[tokio::test]
    async fn test_failure_classification() {
        let channel = PushChannel::new(Arc::new(MockPushGateway::failing("authentication failed")));
        let event = WalletEvent::new(EventType::NewIncomingTx, "w1");
        let payload = channel.build_payload(&event, "c2", &rendered());

        assert!(matches!(
            channel.send("tok1", "com.wallet", &payload).await,
            Delivery::Permanent(_)
        ));

        let flaky = PushChannel::new(Arc::new(MockPushGateway::failing("request timed out")));
        assert!(matches!(
            flaky.send("tok1", "com.wallet", &payload).await,
            Delivery::Transient(_)
        ));
    }
}
