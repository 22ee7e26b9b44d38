//! The notification engine: resolve, dedup, render, deliver.
//!
//! One explicit service context, constructed at startup and passed the
//! collaborators it needs; no ambient globals. Plugs into the stream worker
//! as a [`StreamProcessor`], so each event is handed to exactly one engine
//! instance by the consumer group.

use crate::channels::email::EmailChannel;
use crate::channels::push::{PushChannel, PushPayload};
use crate::channels::Delivery;
use crate::config::NotifyConfig;
use crate::dedup::{EmailDedup, PushDedup};
use crate::error::NotifyError;
use crate::event::WalletEvent;
use crate::outbox::{OutboxEntry, OutboxStore};
use crate::resolver::RecipientResolver;
use crate::templates::{RenderedMessage, TemplateEngine};
use crate::units::format_amount;
use async_trait::async_trait;
use domain_wallet::{Unit, Wallet, WalletDirectory};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use stream_worker::{StreamError, StreamProcessor};
use tracing::{debug, error, info, warn};

/// Fan-out pipeline for one stream of wallet events.
pub struct NotificationEngine {
    directory: Arc<dyn WalletDirectory>,
    resolver: RecipientResolver,
    templates: TemplateEngine,
    email: Arc<EmailChannel>,
    push: PushChannel,
    outbox: Arc<dyn OutboxStore>,
}

impl NotificationEngine {
    pub fn new(
        directory: Arc<dyn WalletDirectory>,
        templates: TemplateEngine,
        email: Arc<EmailChannel>,
        push: PushChannel,
        outbox: Arc<dyn OutboxStore>,
        config: NotifyConfig,
    ) -> Self {
        let resolver = RecipientResolver::new(directory.clone(), config);
        Self {
            directory,
            resolver,
            templates,
            email,
            push,
            outbox,
        }
    }

    /// Process one event end to end.
    ///
    /// Resolution and rendering complete before any delivery attempt is
    /// issued. A failing recipient never blocks the others; only a
    /// resolution failure skips the whole event.
    pub async fn process_event(&self, event: &WalletEvent) -> Result<(), NotifyError> {
        let Some(template_name) = event.event_type.template_name() else {
            debug!(event = %event.id, event_type = %event.event_type, "Event type is not messaged");
            return Ok(());
        };

        let wallet = self.directory.get_wallet(&event.wallet_id).await?;
        let (email_recipients, push_recipients) = self.resolver.resolve(event, &wallet).await?;

        // One rendering is shared by every recipient with the same
        // language and unit.
        let mut rendered: HashMap<(String, Unit), RenderedMessage> = HashMap::new();

        // Email plan, deduped by physical inbox.
        let mut email_dedup = EmailDedup::new();
        let mut email_plan: Vec<(String, RenderedMessage)> = Vec::new();
        for recipient in &email_recipients {
            if !email_dedup.admit(&recipient.email) {
                debug!(cosigner = %recipient.cosigner_id, "Inbox already notified for this event");
                continue;
            }
            match self.render_cached(&mut rendered, template_name, event, &wallet, &recipient.language, recipient.unit) {
                Ok(message) => email_plan.push((recipient.email.clone(), message)),
                Err(e) => {
                    warn!(event = %event.id, cosigner = %recipient.cosigner_id, error = %e,
                        "Render failed, skipping recipient");
                }
            }
        }

        // Push plan, deduped by device identity.
        let mut push_dedup = PushDedup::new();
        let mut push_plan: Vec<(String, String, PushPayload)> = Vec::new();
        for recipient in &push_recipients {
            let message = match self.render_cached(&mut rendered, template_name, event, &wallet, &recipient.language, recipient.unit) {
                Ok(message) => message,
                Err(e) => {
                    warn!(event = %event.id, cosigner = %recipient.cosigner_id, error = %e,
                        "Render failed, skipping recipient");
                    continue;
                }
            };
            let payload = self
                .push
                .build_payload(event, &recipient.cosigner_id, &message);
            for sub in &recipient.subscriptions {
                if !push_dedup.admit(&sub.token, &sub.package_name) {
                    debug!(cosigner = %recipient.cosigner_id, "Device already notified for this event");
                    continue;
                }
                push_plan.push((sub.token.clone(), sub.package_name.clone(), payload.clone()));
            }
        }

        self.deliver_email(event, email_plan).await;
        self.deliver_push(event, push_plan).await;

        Ok(())
    }

    async fn deliver_email(&self, event: &WalletEvent, plan: Vec<(String, RenderedMessage)>) {
        for (to, rendered) in plan {
            let message = self.email.compose(&to, &rendered);
            match self.email.send(&message).await {
                Delivery::Sent => {
                    info!(event = %event.id, to = %to, "Email delivered");
                }
                Delivery::Transient(reason) => {
                    warn!(event = %event.id, to = %to, reason = %reason,
                        "Email transport failed, parking in outbox");
                    let entry = OutboxEntry::new(
                        &message.to,
                        &message.subject,
                        &message.body_text,
                        message.body_html.clone(),
                    );
                    if let Err(e) = self.outbox.save_unsent(&entry).await {
                        // The one un-retried loss window: transport and
                        // persistence both down.
                        error!(event = %event.id, to = %to, error = %e,
                            "Failed to persist outbox entry, message lost");
                    }
                }
                Delivery::Permanent(reason) => {
                    warn!(event = %event.id, to = %to, reason = %reason,
                        "Email permanently undeliverable, dropping");
                }
            }
        }
    }

    async fn deliver_push(&self, event: &WalletEvent, plan: Vec<(String, String, PushPayload)>) {
        for (token, package_name, payload) in plan {
            match self.push.send(&token, &package_name, &payload).await {
                Delivery::Sent => {
                    debug!(event = %event.id, package = %package_name, "Push delivered");
                }
                // Push is best-effort, there is no outbox behind it.
                Delivery::Transient(reason) | Delivery::Permanent(reason) => {
                    warn!(event = %event.id, package = %package_name, reason = %reason,
                        "Push delivery failed, dropping");
                }
            }
        }
    }

    fn render_cached(
        &self,
        cache: &mut HashMap<(String, Unit), RenderedMessage>,
        template_name: &str,
        event: &WalletEvent,
        wallet: &Wallet,
        language: &str,
        unit: Unit,
    ) -> Result<RenderedMessage, NotifyError> {
        let key = (language.to_string(), unit);
        if let Some(message) = cache.get(&key) {
            return Ok(message.clone());
        }

        let data = self.template_data(event, wallet, unit);
        let message = self.templates.render(template_name, language, &data)?;
        cache.insert(key, message.clone());
        Ok(message)
    }

    /// Interpolation data for one event, shaped for the recipient's unit.
    ///
    /// Event payload fields ride along so templates can reference them
    /// (rejection reason, address…); amounts are replaced with their
    /// formatted form.
    fn template_data(&self, event: &WalletEvent, wallet: &Wallet, unit: Unit) -> Value {
        let mut data = match &event.data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };

        data.insert("wallet_name".to_string(), json!(wallet.name));
        data.insert("creator_name".to_string(), json!(self.creator_name(event, wallet)));

        if let Some(amount) = event.amount() {
            data.insert("amount".to_string(), json!(format_amount(amount, unit)));
        }

        if let Some(txid) = event.txid() {
            if let Some(url) = self.email.tx_url(wallet.network, txid) {
                data.insert("tx_url".to_string(), json!(url));
            }
        }

        Value::Object(data)
    }

    fn creator_name(&self, event: &WalletEvent, wallet: &Wallet) -> String {
        event
            .creator_id
            .as_deref()
            .and_then(|id| wallet.co_signer(id))
            .map(|c| c.name.clone())
            .or_else(|| {
                event
                    .data
                    .get("creator_name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "A co-signer".to_string())
    }
}

#[async_trait]
impl StreamProcessor<WalletEvent> for NotificationEngine {
    async fn process(&self, event: &WalletEvent) -> Result<(), StreamError> {
        self.process_event(event)
            .await
            .map_err(|e| StreamError::processing(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "notification_engine"
    }
}
