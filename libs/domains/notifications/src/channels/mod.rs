//! Delivery channels.
//!
//! Each channel wraps a transport behind a small capability trait and maps
//! transport results onto [`Delivery`]. The caller decides what a failure
//! means: email transients go to the outbox, push transients are dropped.

pub mod email;
pub mod push;

/// Outcome of one transport call.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// The transport confirmed the send.
    Sent,
    /// Network-level failure (timeout, connection, rate limit); eligible for
    /// retry.
    Transient(String),
    /// The destination or credentials are bad; retrying cannot help.
    Permanent(String),
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }
}
