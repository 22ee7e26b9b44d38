use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Display unit for amounts in rendered notifications.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Btc,
    Bit,
}

/// Per-co-signer notification preferences.
///
/// Owned and mutated by the co-signer; the engine reads them fresh for every
/// event it processes. All fields are optional: a missing email simply drops
/// the co-signer from email delivery, and missing language/unit fall back to
/// the engine defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    pub email: Option<String>,
    pub language: Option<String>,
    pub unit: Option<Unit>,
}

impl Preferences {
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_round_trip() {
        assert_eq!(Unit::Btc.to_string(), "btc");
        assert_eq!(Unit::Bit.to_string(), "bit");
        assert_eq!("bit".parse::<Unit>().unwrap(), Unit::Bit);
    }

    #[test]
    fn test_unit_serde_lowercase() {
        let json = serde_json::to_string(&Unit::Bit).unwrap();
        assert_eq!(json, "\"bit\"");
    }

    #[test]
    fn test_builder() {
        let prefs = Preferences::default()
            .with_email("m@example.com")
            .with_language("es")
            .with_unit(Unit::Btc);

        assert_eq!(prefs.email.as_deref(), Some("m@example.com"));
        assert_eq!(prefs.language.as_deref(), Some("es"));
        assert_eq!(prefs.unit, Some(Unit::Btc));
    }
}
