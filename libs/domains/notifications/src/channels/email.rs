//! Email delivery: the `Mailer` capability and the channel built on it.

use crate::channels::Delivery;
use crate::config::EmailOpts;
use crate::outbox::OutboxEntry;
use crate::templates::RenderedMessage;
use async_trait::async_trait;
use core_config::{env_or_default, env_parse_or, env_required, ConfigError, FromEnv};
use domain_wallet::Network;
use eyre::{Result, WrapErr};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tracing::{debug, info};

/// One email ready to hand to a transport.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
}

/// Capability to deliver one email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// SMTP transport configuration.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
}

impl FromEnv for SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_required("SMTP_HOST")?,
            port: env_parse_or("SMTP_PORT", 587),
            username: env_or_default("SMTP_USERNAME", ""),
            password: env_or_default("SMTP_PASSWORD", ""),
            use_tls: env_or_default("SMTP_USE_TLS", "true") == "true",
        })
    }
}

/// SMTP mailer on lettre's async transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let transport = if config.use_tls {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .wrap_err("Failed to create SMTP relay")?
                .credentials(creds)
                .port(config.port)
                .build()
        } else if !config.username.is_empty() {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .credentials(creds)
                .port(config.port)
                .build()
        } else {
            // No auth (for Mailpit/Mailhog)
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .build()
        };

        Ok(Self { transport })
    }

    fn build_message(&self, email: &EmailMessage) -> Result<Message> {
        let from: Mailbox = email.from.parse().wrap_err("Invalid from address")?;
        let to: Mailbox = email.to.parse().wrap_err("Invalid to address")?;

        let builder = Message::builder().from(from).to(to).subject(&email.subject);

        let message = match &email.body_html {
            Some(html) => builder
                .multipart(
                    MultiPart::alternative()
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_PLAIN)
                                .body(email.body_text.clone()),
                        )
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_HTML)
                                .body(html.clone()),
                        ),
                )
                .wrap_err("Failed to build multipart message")?,
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(email.body_text.clone())
                .wrap_err("Failed to build text message")?,
        };

        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &EmailMessage) -> Result<()> {
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .wrap_err("Failed to send email via SMTP")?;

        info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// Capturing mailer for tests.
pub struct MockMailer {
    sent: Arc<tokio::sync::Mutex<Vec<EmailMessage>>>,
    failure: Arc<tokio::sync::Mutex<Option<String>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            failure: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Create a mailer whose sends all fail with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            sent: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            failure: Arc::new(tokio::sync::Mutex::new(Some(message.into()))),
        }
    }

    /// Start or stop failing; lets a test flip a transport from broken to
    /// healthy between flush cycles.
    pub async fn set_failure(&self, message: Option<String>) {
        *self.failure.lock().await = message;
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn was_sent_to(&self, address: &str) -> bool {
        self.sent.lock().await.iter().any(|e| e.to == address)
    }
}

impl Default for MockMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: &EmailMessage) -> Result<()> {
        if let Some(message) = self.failure.lock().await.clone() {
            return Err(eyre::eyre!(message));
        }

        self.sent.lock().await.push(email.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// The email delivery channel.
///
/// Assembles the final message (from address, branded subject) and maps
/// transport errors onto [`Delivery`] outcomes.
pub struct EmailChannel {
    mailer: Arc<dyn Mailer>,
    opts: EmailOpts,
}

impl EmailChannel {
    pub fn new(mailer: Arc<dyn Mailer>, opts: EmailOpts) -> Self {
        Self { mailer, opts }
    }

    /// Subject with the tenant prefix applied.
    pub fn subject(&self, raw: &str) -> String {
        if self.opts.subject_prefix.is_empty() {
            raw.to_string()
        } else {
            format!("{} {}", self.opts.subject_prefix, raw)
        }
    }

    /// Public transaction-detail URL for the wallet's network, when a
    /// template is configured.
    pub fn tx_url(&self, network: Network, txid: &str) -> Option<String> {
        self.opts
            .public_tx_url
            .for_network(network)
            .map(|template| template.replace("{{txid}}", txid))
    }

    /// Assemble the outgoing message for a rendered notification.
    pub fn compose(&self, to: &str, rendered: &RenderedMessage) -> EmailMessage {
        EmailMessage {
            from: self.opts.from.clone(),
            to: to.to_string(),
            subject: self.subject(&rendered.subject),
            body_text: rendered.body_text.clone(),
            body_html: rendered.body_html.clone(),
        }
    }

    /// Deliver one message.
    pub async fn send(&self, message: &EmailMessage) -> Delivery {
        match self.mailer.send(message).await {
            Ok(()) => Delivery::Sent,
            Err(e) => classify(e),
        }
    }

    /// Re-deliver a stored outbox entry. The subject was branded when the
    /// entry was created, so it is sent as-is.
    pub async fn resend(&self, entry: &OutboxEntry) -> Delivery {
        let message = EmailMessage {
            from: self.opts.from.clone(),
            to: entry.to.clone(),
            subject: entry.subject.clone(),
            body_text: entry.body_text.clone(),
            body_html: entry.body_html.clone(),
        };

        debug!(outbox_id = %entry.id, to = %entry.to, "Retrying outbox entry");
        self.send(&message).await
    }
}

fn classify(err: eyre::Report) -> Delivery {
    let msg = format!("{err:#}");
    let lower = msg.to_lowercase();

    // Bad destinations and rejected credentials cannot succeed on retry;
    // everything else (timeouts, connection errors, 4xx greylisting) can.
    if lower.contains("invalid")
        || lower.contains("malformed")
        || lower.contains("authentication")
        || lower.contains("rejected")
    {
        Delivery::Permanent(msg)
    } else {
        Delivery::Transient(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TxUrlTemplates;

    fn opts() -> EmailOpts {
        EmailOpts {
            from: "wallet@example.com".to_string(),
            subject_prefix: "[wallet]".to_string(),
            public_tx_url: TxUrlTemplates {
                livenet: Some("https://explorer.example.com/tx/{{txid}}".to_string()),
                testnet: Some("https://test.example.com/tx/{{txid}}".to_string()),
            },
        }
    }

    fn rendered() -> RenderedMessage {
        RenderedMessage {
            subject: "New payment received".to_string(),
            body_text: "A payment arrived.".to_string(),
            body_html: None,
        }
    }

    #[tokio::test]
    async fn test_subject_prefix_applied() {
        let channel = EmailChannel::new(Arc::new(MockMailer::new()), opts());
        assert_eq!(
            channel.subject("New payment received"),
            "[wallet] New payment received"
        );

        let unbranded = EmailChannel::new(
            Arc::new(MockMailer::new()),
            EmailOpts {
                subject_prefix: String::new(),
                ..opts()
            },
        );
        assert_eq!(unbranded.subject("Hello"), "Hello");
    }

    #[test]
    fn test_tx_url_substitution_per_network() {
        let channel = EmailChannel::new(Arc::new(MockMailer::new()), opts());

        assert_eq!(
            channel.tx_url(Network::Livenet, "abc123").as_deref(),
            Some("https://explorer.example.com/tx/abc123")
        );
        assert_eq!(
            channel.tx_url(Network::Testnet, "abc123").as_deref(),
            Some("https://test.example.com/tx/abc123")
        );

        let bare = EmailChannel::new(
            Arc::new(MockMailer::new()),
            EmailOpts {
                public_tx_url: TxUrlTemplates::default(),
                ..opts()
            },
        );
        assert!(bare.tx_url(Network::Livenet, "abc123").is_none());
    }

    #[tokio::test]
    async fn test_send_success() {
        let mailer = Arc::new(MockMailer::new());
        let channel = EmailChannel::new(mailer.clone(), opts());

        let message = channel.compose("member@example.com", &rendered());
        assert!(channel.send(&message).await.is_sent());

        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, "wallet@example.com");
        assert_eq!(sent[0].subject, "[wallet] New payment received");
    }

    #[tokio::test]
    async fn test_transient_classification() {
        let mailer = MockMailer::new();
        mailer.set_failure(Some("connection timed out".to_string())).await;
        let channel = EmailChannel::new(Arc::new(mailer), opts());

        let message = channel.compose("member@example.com", &rendered());
        assert!(matches!(
            channel.send(&message).await,
            Delivery::Transient(_)
        ));
    }

    #[tokio::test]
    async fn test_permanent_classification() {
        let mailer = MockMailer::new();
        mailer
            .set_failure(Some("recipient address rejected".to_string()))
            .await;
        let channel = EmailChannel::new(Arc::new(mailer), opts());

        let message = channel.compose("member@example.com", &rendered());
        assert!(matches!(
            channel.send(&message).await,
            Delivery::Permanent(_)
        ));
    }

    #[tokio::test]
    async fn test_resend_uses_stored_subject_verbatim() {
        let mailer = Arc::new(MockMailer::new());
        let channel = EmailChannel::new(mailer.clone(), opts());

        let entry = OutboxEntry::new(
            "member@example.com",
            "[wallet] Payment sent",
            "body",
            None,
        );
        assert!(channel.resend(&entry).await.is_sent());

        let sent = mailer.sent().await;
        // No double-prefixing on retry
        assert_eq!(sent[0].subject, "[wallet] Payment sent");
    }
}
