//! Per-event dedup of delivery destinations.
//!
//! Two co-signers may share an inbox, and one device may be registered
//! several times; within one event's processing pass each physical
//! destination is delivered to at most once. The filters live and die inside
//! a single pass — no state is retained across events.

use std::collections::HashSet;

/// Collapses email recipients by normalized address.
#[derive(Default)]
pub struct EmailDedup {
    seen: HashSet<String>,
}

impl EmailDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time an address is seen; false afterwards.
    /// Addresses are compared trimmed and lowercased.
    pub fn admit(&mut self, address: &str) -> bool {
        self.seen.insert(address.trim().to_lowercase())
    }
}

/// Collapses push deliveries by device identity.
#[derive(Default)]
pub struct PushDedup {
    seen: HashSet<(String, String)>,
}

impl PushDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, token: &str, package_name: &str) -> bool {
        self.seen
            .insert((token.to_string(), package_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_dedup_first_wins() {
        let mut dedup = EmailDedup::new();
        assert!(dedup.admit("a@example.com"));
        assert!(!dedup.admit("a@example.com"));
        assert!(dedup.admit("b@example.com"));
    }

    #[test]
    fn test_email_dedup_normalizes_case_and_whitespace() {
        let mut dedup = EmailDedup::new();
        assert!(dedup.admit("Member@Example.com"));
        assert!(!dedup.admit("  member@example.com "));
    }

    #[test]
    fn test_push_dedup_keys_on_token_and_package() {
        let mut dedup = PushDedup::new();
        assert!(dedup.admit("tok1", "com.wallet"));
        assert!(!dedup.admit("tok1", "com.wallet"));
        // Same token under a different package is a different device identity
        assert!(dedup.admit("tok1", "com.other"));
        assert!(dedup.admit("tok2", "com.wallet"));
    }
}
