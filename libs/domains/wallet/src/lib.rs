//! Read-only wallet domain data consumed by the notification engine.
//!
//! The quorum model itself (key rings, signature validation, address
//! derivation) lives elsewhere; this crate carries only what notification
//! fan-out needs: wallets with their ordered co-signer lists, per-co-signer
//! preferences, and channel subscriptions, behind the [`WalletDirectory`]
//! lookup boundary.

mod directory;
mod preferences;
mod subscriptions;
mod wallet;

pub use directory::{MemoryDirectory, RedisDirectory, WalletDirectory, WalletError};
pub use preferences::{Preferences, Unit};
pub use subscriptions::{PushSubscription, TxConfirmationSub};
pub use wallet::{CoSigner, Network, Wallet};
