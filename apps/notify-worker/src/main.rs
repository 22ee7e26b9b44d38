//! Notification Worker Service - Entry Point
//!
//! Background worker that fans wallet lifecycle events out to email and
//! push notifications.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    notify_worker::run().await
}
