//! Notification configuration, loaded from the environment.

use core_config::{env_or_default, env_parse_or, env_required, ConfigError, FromEnv};
use domain_wallet::{Network, Unit};
use std::time::Duration;

/// Engine-wide settings shared by both channels.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Language used when a recipient's preference has no template catalog.
    pub default_language: String,
    /// Display unit used when a recipient saved none.
    pub default_unit: Unit,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            default_unit: Unit::Btc,
        }
    }
}

impl FromEnv for NotifyConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let unit_raw = env_or_default("NOTIFY_DEFAULT_UNIT", "btc");
        let default_unit = unit_raw
            .parse::<Unit>()
            .map_err(|_| ConfigError::ParseError {
                key: "NOTIFY_DEFAULT_UNIT".to_string(),
                details: format!("unknown unit '{unit_raw}'"),
            })?;

        Ok(Self {
            default_language: env_or_default("NOTIFY_DEFAULT_LANGUAGE", "en"),
            default_unit,
        })
    }
}

/// Per-network public transaction URL templates; `{{txid}}` is substituted.
#[derive(Debug, Clone, Default)]
pub struct TxUrlTemplates {
    pub livenet: Option<String>,
    pub testnet: Option<String>,
}

impl TxUrlTemplates {
    pub fn for_network(&self, network: Network) -> Option<&str> {
        match network {
            Network::Livenet => self.livenet.as_deref(),
            Network::Testnet => self.testnet.as_deref(),
        }
    }
}

/// Email channel options.
#[derive(Debug, Clone)]
pub struct EmailOpts {
    /// Sender address placed in the From header.
    pub from: String,
    /// Tenant branding prepended to every subject line (may be empty).
    pub subject_prefix: String,
    pub public_tx_url: TxUrlTemplates,
}

impl FromEnv for EmailOpts {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            from: env_required("EMAIL_FROM_ADDRESS")?,
            subject_prefix: env_or_default("EMAIL_SUBJECT_PREFIX", ""),
            public_tx_url: TxUrlTemplates {
                livenet: std::env::var("PUBLIC_TX_URL_LIVENET").ok(),
                testnet: std::env::var("PUBLIC_TX_URL_TESTNET").ok(),
            },
        })
    }
}

/// Push channel options.
#[derive(Debug, Clone)]
pub struct PushOpts {
    /// Push gateway base URL; payloads are POSTed to `{url}/send`.
    pub push_server_url: String,
    /// Credential placed in the Authorization header.
    pub authorization_key: String,
    /// Per-call timeout; a timed-out send counts as a transient failure.
    pub timeout: Duration,
}

impl FromEnv for PushOpts {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            push_server_url: env_required("PUSH_SERVER_URL")?,
            authorization_key: env_required("PUSH_AUTHORIZATION_KEY")?,
            timeout: Duration::from_secs(env_parse_or("PUSH_TIMEOUT_SECS", 10)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_config_defaults() {
        temp_env::with_vars_unset(["NOTIFY_DEFAULT_LANGUAGE", "NOTIFY_DEFAULT_UNIT"], || {
            let config = NotifyConfig::from_env().unwrap();
            assert_eq!(config.default_language, "en");
            assert_eq!(config.default_unit, Unit::Btc);
        });
    }

    #[test]
    fn test_notify_config_from_env() {
        temp_env::with_vars(
            [
                ("NOTIFY_DEFAULT_LANGUAGE", Some("es")),
                ("NOTIFY_DEFAULT_UNIT", Some("bit")),
            ],
            || {
                let config = NotifyConfig::from_env().unwrap();
                assert_eq!(config.default_language, "es");
                assert_eq!(config.default_unit, Unit::Bit);
            },
        );
    }

    #[test]
    fn test_notify_config_bad_unit() {
        temp_env::with_var("NOTIFY_DEFAULT_UNIT", Some("doge"), || {
            assert!(NotifyConfig::from_env().is_err());
        });
    }

    #[test]
    fn test_email_opts_requires_from() {
        temp_env::with_var_unset("EMAIL_FROM_ADDRESS", || {
            assert!(EmailOpts::from_env().is_err());
        });
    }

    #[test]
    fn test_email_opts_from_env() {
        temp_env::with_vars(
            [
                ("EMAIL_FROM_ADDRESS", Some("wallet@example.com")),
                ("EMAIL_SUBJECT_PREFIX", Some("[wallet]")),
                (
                    "PUBLIC_TX_URL_LIVENET",
                    Some("https://explorer.example.com/tx/{{txid}}"),
                ),
            ],
            || {
                let opts = EmailOpts::from_env().unwrap();
                assert_eq!(opts.from, "wallet@example.com");
                assert_eq!(opts.subject_prefix, "[wallet]");
                assert_eq!(
                    opts.public_tx_url.for_network(Network::Livenet),
                    Some("https://explorer.example.com/tx/{{txid}}")
                );
                assert_eq!(opts.public_tx_url.for_network(Network::Testnet), None);
            },
        );
    }

    #[test]
    fn test_push_opts_from_env() {
        temp_env::with_vars(
            [
                ("PUSH_SERVER_URL", Some("https://push.example.com")),
                ("PUSH_AUTHORIZATION_KEY", Some("secret")),
                ("PUSH_TIMEOUT_SECS", Some("3")),
            ],
            || {
                let opts = PushOpts::from_env().unwrap();
                assert_eq!(opts.push_server_url, "https://push.example.com");
                assert_eq!(opts.authorization_key, "secret");
                assert_eq!(opts.timeout, Duration::from_secs(3));
            },
        );
    }
}
