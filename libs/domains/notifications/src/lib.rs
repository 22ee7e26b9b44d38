//! Notification fan-out for multi-signature wallet lifecycle events.
//!
//! Wallet events (payment proposed, rejected, sent, confirmed, funds
//! received, co-signer joined) arrive on a shared stream; this crate decides
//! *whether*, *to whom*, *in what form* and *how durably* each one is
//! delivered.
//!
//! ## Components
//!
//! - **Events**: `WalletEvent` / `EventType`, consumable by the stream worker
//! - **Recipient resolution**: `RecipientResolver` applies the exclusion
//!   rules (actors don't notify themselves, joiners notify only earlier
//!   members, confirmation events go to subscribers only)
//! - **Dedup**: `EmailDedup` / `PushDedup` collapse recipients sharing a
//!   physical inbox or device within one event
//! - **Localization**: `TemplateEngine` (Handlebars, per-language catalogs)
//!   and unit-aware amount formatting
//! - **Channels**: `EmailChannel` (SMTP via a `Mailer` capability) and
//!   `PushChannel` (HTTP gateway via a `PushGateway` capability)
//! - **Durability**: `OutboxStore` keeps unconfirmed emails across restarts;
//!   `OutboxFlusher` drains it under a distributed lock
//! - **Engine**: `NotificationEngine` ties the pipeline together and plugs
//!   into `StreamWorker` as a `StreamProcessor<WalletEvent>`
//!
//! Email is durable-eventual (transient failures land in the outbox and are
//! retried by the flusher); push is best-effort (failures are logged and
//! dropped).

pub mod channels;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod event;
pub mod flush;
pub mod outbox;
pub mod resolver;
pub mod templates;
pub mod units;

pub use channels::email::{EmailChannel, EmailMessage, Mailer, MockMailer, SmtpConfig, SmtpMailer};
pub use channels::push::{
    hash_identity, HttpPushGateway, MockPushGateway, PushChannel, PushGateway, PushPayload,
};
pub use channels::Delivery;
pub use config::{EmailOpts, NotifyConfig, PushOpts, TxUrlTemplates};
pub use dedup::{EmailDedup, PushDedup};
pub use engine::NotificationEngine;
pub use error::NotifyError;
pub use event::{EventType, WalletEvent, WalletEventStream};
pub use flush::{FlushConfig, OutboxFlusher, FLUSH_LOCK_RESOURCE};
pub use outbox::{MemoryOutboxStore, OutboxEntry, OutboxStatus, OutboxStore, RedisOutboxStore};
pub use resolver::{EmailRecipient, PushRecipient, RecipientResolver};
pub use templates::{MessageTemplate, RenderedMessage, TemplateEngine};
pub use units::format_amount;
