//! Recipient resolution: who gets told about an event, on which channel.
//!
//! Preferences and subscriptions are looked up fresh for every event, so a
//! co-signer who just changed language or registered a device is handled
//! with their latest settings.

use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::event::{EventType, WalletEvent};
use domain_wallet::{CoSigner, PushSubscription, Unit, Wallet, WalletDirectory};
use std::sync::Arc;
use tracing::{debug, warn};

/// A co-signer resolved for email delivery.
#[derive(Debug, Clone)]
pub struct EmailRecipient {
    pub cosigner_id: String,
    pub name: String,
    pub email: String,
    pub language: String,
    pub unit: Unit,
}

/// A co-signer resolved for push delivery, with every registered device.
#[derive(Debug, Clone)]
pub struct PushRecipient {
    pub cosigner_id: String,
    pub name: String,
    pub subscriptions: Vec<PushSubscription>,
    pub language: String,
    pub unit: Unit,
}

/// Applies the exclusion rules and populates per-recipient preferences.
pub struct RecipientResolver {
    directory: Arc<dyn WalletDirectory>,
    defaults: NotifyConfig,
}

impl RecipientResolver {
    pub fn new(directory: Arc<dyn WalletDirectory>, defaults: NotifyConfig) -> Self {
        Self {
            directory,
            defaults,
        }
    }

    /// Resolve the per-channel recipient sets for one event.
    ///
    /// A co-signer without an email address is absent from the email set, one
    /// without device registrations from the push set; neither is an error.
    pub async fn resolve(
        &self,
        event: &WalletEvent,
        wallet: &Wallet,
    ) -> Result<(Vec<EmailRecipient>, Vec<PushRecipient>), NotifyError> {
        let candidates = self.eligible_cosigners(event, wallet).await?;

        let mut email_recipients = Vec::new();
        let mut push_recipients = Vec::new();

        for cosigner in candidates {
            let prefs = self.directory.get_preferences(&cosigner.id).await?;
            let language = prefs
                .language
                .unwrap_or_else(|| self.defaults.default_language.clone());
            let unit = prefs.unit.unwrap_or(self.defaults.default_unit);

            match prefs.email {
                Some(email) => email_recipients.push(EmailRecipient {
                    cosigner_id: cosigner.id.clone(),
                    name: cosigner.name.clone(),
                    email,
                    language: language.clone(),
                    unit,
                }),
                None => {
                    debug!(cosigner = %cosigner.id, "No email address saved, skipping email")
                }
            }

            let subscriptions = self.directory.push_subscriptions(&cosigner.id).await?;
            if subscriptions.is_empty() {
                debug!(cosigner = %cosigner.id, "No device registrations, skipping push");
            } else {
                push_recipients.push(PushRecipient {
                    cosigner_id: cosigner.id,
                    name: cosigner.name,
                    subscriptions,
                    language,
                    unit,
                });
            }
        }

        Ok((email_recipients, push_recipients))
    }

    /// The exclusion rules, applied to the wallet's join-ordered co-signer
    /// list.
    async fn eligible_cosigners(
        &self,
        event: &WalletEvent,
        wallet: &Wallet,
    ) -> Result<Vec<CoSigner>, NotifyError> {
        match event.event_type {
            // The joiner notifies exactly the members already present, never
            // itself or anyone who joins later.
            EventType::NewCoSigner => {
                let Some(joiner) = &event.creator_id else {
                    warn!(event = %event.id, "NewCoSigner event without a joiner id");
                    return Ok(Vec::new());
                };
                Ok(wallet.joined_before(joiner).to_vec())
            }

            // Only co-signers who asked to watch this transaction.
            EventType::TxConfirmation => {
                let Some(txid) = event.txid() else {
                    warn!(event = %event.id, "TxConfirmation event without a txid");
                    return Ok(Vec::new());
                };
                let subscribed = self
                    .directory
                    .tx_confirmation_subscribers(&wallet.id, txid)
                    .await?;
                Ok(wallet
                    .co_signers
                    .iter()
                    .filter(|c| subscribed.contains(&c.id))
                    .cloned()
                    .collect())
            }

            _ => {
                // A 1-of-N proposal needs nobody's co-signature; there is
                // nothing to ask the others for.
                if event.event_type == EventType::NewTxProposal && !wallet.requires_cosigning() {
                    debug!(wallet = %wallet.id, "Proposal in a wallet without co-signing, no recipients");
                    return Ok(Vec::new());
                }

                let excluded_actor = if event.is_global {
                    None
                } else {
                    event.creator_id.as_deref()
                };

                Ok(wallet
                    .co_signers
                    .iter()
                    .filter(|c| Some(c.id.as_str()) != excluded_actor)
                    .cloned()
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_wallet::{MemoryDirectory, Network, Preferences, TxConfirmationSub};

    async fn directory_with_wallet(m: u8, members: &[&str]) -> (Arc<MemoryDirectory>, Wallet) {
        let dir = Arc::new(MemoryDirectory::new());
        let mut wallet = Wallet::new("w1", "family savings", m, members.len() as u8, Network::Livenet);
        for id in members {
            wallet.add_co_signer(CoSigner::new(*id, format!("member {id}")));
        }
        dir.insert_wallet(wallet.clone()).await;
        (dir, wallet)
    }

    fn resolver(dir: Arc<MemoryDirectory>) -> RecipientResolver {
        RecipientResolver::new(dir, NotifyConfig::default())
    }

    #[tokio::test]
    async fn test_actor_excluded_unless_global() {
        let (dir, wallet) = directory_with_wallet(2, &["c1", "c2", "c3"]).await;
        for id in ["c1", "c2", "c3"] {
            dir.save_preferences(id, Preferences::default().with_email(format!("{id}@example.com")))
                .await;
        }
        let resolver = resolver(dir);

        let event = WalletEvent::new(EventType::NewOutgoingTx, "w1").with_creator("c1");
        let (emails, _) = resolver.resolve(&event, &wallet).await.unwrap();
        let ids: Vec<_> = emails.iter().map(|r| r.cosigner_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c3"]);

        let global = WalletEvent::new(EventType::NewIncomingTx, "w1")
            .with_creator("c1")
            .global();
        let (emails, _) = resolver.resolve(&global, &wallet).await.unwrap();
        assert_eq!(emails.len(), 3);
    }

    #[tokio::test]
    async fn test_new_cosigner_notifies_only_earlier_members() {
        let (dir, wallet) = directory_with_wallet(2, &["c1", "c2", "c3"]).await;
        for id in ["c1", "c2", "c3"] {
            dir.save_preferences(id, Preferences::default().with_email(format!("{id}@example.com")))
                .await;
        }
        let resolver = resolver(dir);

        let event = WalletEvent::new(EventType::NewCoSigner, "w1").with_creator("c2");
        let (emails, _) = resolver.resolve(&event, &wallet).await.unwrap();
        let ids: Vec<_> = emails.iter().map(|r| r.cosigner_id.as_str()).collect();
        assert_eq!(ids, vec!["c1"]);
    }

    #[tokio::test]
    async fn test_proposal_in_1_of_n_wallet_has_no_recipients() {
        let (dir, wallet) = directory_with_wallet(1, &["c1", "c2"]).await;
        dir.save_preferences("c2", Preferences::default().with_email("c2@example.com"))
            .await;
        let resolver = resolver(dir);

        let event = WalletEvent::new(EventType::NewTxProposal, "w1").with_creator("c1");
        let (emails, pushes) = resolver.resolve(&event, &wallet).await.unwrap();
        assert!(emails.is_empty());
        assert!(pushes.is_empty());
    }

    #[tokio::test]
    async fn test_tx_confirmation_restricted_to_subscribers() {
        let (dir, wallet) = directory_with_wallet(2, &["c1", "c2", "c3"]).await;
        for id in ["c1", "c2", "c3"] {
            dir.save_preferences(id, Preferences::default().with_email(format!("{id}@example.com")))
                .await;
        }
        dir.subscribe_tx_confirmation(TxConfirmationSub::new("w1", "c2", "tx9"))
            .await;
        let resolver = resolver(dir);

        let event = WalletEvent::new(EventType::TxConfirmation, "w1")
            .with_data(serde_json::json!({"txid": "tx9"}))
            .global();
        let (emails, _) = resolver.resolve(&event, &wallet).await.unwrap();
        let ids: Vec<_> = emails.iter().map(|r| r.cosigner_id.as_str()).collect();
        assert_eq!(ids, vec!["c2"]);
    }

    #[tokio::test]
    async fn test_recipients_without_destination_silently_dropped() {
        let (dir, wallet) = directory_with_wallet(2, &["c1", "c2"]).await;
        // c2 has an email, c1 has nothing
        dir.save_preferences("c2", Preferences::default().with_email("c2@example.com"))
            .await;
        dir.subscribe_push(PushSubscription::new("c2", "tok", "com.wallet", "android"))
            .await;
        let resolver = resolver(dir);

        let event = WalletEvent::new(EventType::NewIncomingTx, "w1").global();
        let (emails, pushes) = resolver.resolve(&event, &wallet).await.unwrap();

        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].email, "c2@example.com");
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].cosigner_id, "c2");
    }

    #[tokio::test]
    async fn test_preference_defaults_fill_in() {
        let (dir, wallet) = directory_with_wallet(2, &["c1", "c2"]).await;
        dir.save_preferences("c2", Preferences::default().with_email("c2@example.com"))
            .await;
        let resolver = RecipientResolver::new(
            dir,
            NotifyConfig {
                default_language: "es".to_string(),
                default_unit: Unit::Bit,
            },
        );

        let event = WalletEvent::new(EventType::NewIncomingTx, "w1").global();
        let (emails, _) = resolver.resolve(&event, &wallet).await.unwrap();
        assert_eq!(emails[0].language, "es");
        assert_eq!(emails[0].unit, Unit::Bit);
    }
}
