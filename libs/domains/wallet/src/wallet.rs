use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Bitcoin network a wallet lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Livenet,
    Testnet,
}

/// One participant in a wallet's m-of-n quorum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoSigner {
    pub id: String,
    pub name: String,
    pub created_on: DateTime<Utc>,
}

impl CoSigner {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_on: Utc::now(),
        }
    }
}

/// A multi-signature wallet as the notification engine sees it.
///
/// `co_signers` is ordered by join sequence: members are appended as they
/// join and never reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub name: String,
    pub m: u8,
    pub n: u8,
    pub network: Network,
    pub co_signers: Vec<CoSigner>,
}

impl Wallet {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        m: u8,
        n: u8,
        network: Network,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            m,
            n,
            network,
            co_signers: Vec::new(),
        }
    }

    pub fn is_shared(&self) -> bool {
        self.n > 1
    }

    pub fn is_complete(&self) -> bool {
        self.co_signers.len() >= self.n as usize
    }

    /// Whether spending requires more than the proposer's own signature.
    pub fn requires_cosigning(&self) -> bool {
        self.m > 1
    }

    pub fn add_co_signer(&mut self, co_signer: CoSigner) {
        self.co_signers.push(co_signer);
    }

    pub fn co_signer(&self, id: &str) -> Option<&CoSigner> {
        self.co_signers.iter().find(|c| c.id == id)
    }

    /// Members positioned strictly before `id` in join order.
    ///
    /// Empty when `id` is the first member or not a member at all.
    pub fn joined_before(&self, id: &str) -> &[CoSigner] {
        match self.co_signers.iter().position(|c| c.id == id) {
            Some(idx) => &self.co_signers[..idx],
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_with(ids: &[&str]) -> Wallet {
        let mut w = Wallet::new("w1", "family savings", 2, 3, Network::Livenet);
        for id in ids {
            w.add_co_signer(CoSigner::new(*id, format!("member {id}")));
        }
        w
    }

    #[test]
    fn test_shared_and_complete() {
        let w = wallet_with(&["a", "b", "c"]);
        assert!(w.is_shared());
        assert!(w.is_complete());
        assert!(w.requires_cosigning());

        let solo = Wallet::new("w2", "solo", 1, 1, Network::Testnet);
        assert!(!solo.is_shared());
        assert!(!solo.is_complete());
        assert!(!solo.requires_cosigning());
    }

    #[test]
    fn test_joined_before_respects_join_order() {
        let w = wallet_with(&["a", "b", "c"]);

        assert!(w.joined_before("a").is_empty());
        let before_c: Vec<_> = w.joined_before("c").iter().map(|c| c.id.as_str()).collect();
        assert_eq!(before_c, vec!["a", "b"]);
    }

    #[test]
    fn test_joined_before_unknown_member_is_empty() {
        let w = wallet_with(&["a", "b"]);
        assert!(w.joined_before("nobody").is_empty());
    }

    #[test]
    fn test_network_serialization() {
        assert_eq!(Network::Livenet.to_string(), "livenet");
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
    }
}
