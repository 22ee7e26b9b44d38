//! Per-language message templates rendered with Handlebars.
//!
//! Templates are selected by (language, template name) with a fallback to
//! the configured default language when the recipient's language has no
//! catalog. Rendering runs in strict mode: a template referencing data the
//! event did not provide is a render failure, which skips that recipient
//! rather than sending a half-filled message.

use crate::error::NotifyError;
use handlebars::Handlebars;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// One template set: subject, plain body, optional rich body.
#[derive(Clone, Debug)]
pub struct MessageTemplate {
    pub name: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
}

/// Rendered output for one (event, language, unit) combination.
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
}

/// Handlebars-based template engine with per-language catalogs.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    catalog: HashMap<(String, String), MessageTemplate>,
    default_language: String,
}

impl TemplateEngine {
    /// Create an engine with the built-in catalogs registered.
    pub fn new(default_language: impl Into<String>) -> Result<Self, NotifyError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);

        let mut engine = Self {
            handlebars,
            catalog: HashMap::new(),
            default_language: default_language.into(),
        };

        engine.register_defaults()?;
        Ok(engine)
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Register a template under a language, replacing any existing one.
    pub fn register(
        &mut self,
        language: &str,
        template: MessageTemplate,
    ) -> Result<(), NotifyError> {
        let prefix = format!("{}/{}", language, template.name);

        self.handlebars
            .register_template_string(&format!("{prefix}/subject"), &template.subject)
            .map_err(|e| NotifyError::Template(format!("bad subject template: {e}")))?;

        self.handlebars
            .register_template_string(&format!("{prefix}/text"), &template.body_text)
            .map_err(|e| NotifyError::Template(format!("bad text template: {e}")))?;

        if let Some(html) = &template.body_html {
            self.handlebars
                .register_template_string(&format!("{prefix}/html"), html)
                .map_err(|e| NotifyError::Template(format!("bad html template: {e}")))?;
        }

        self.catalog
            .insert((language.to_string(), template.name.clone()), template);
        Ok(())
    }

    pub fn has_template(&self, language: &str, name: &str) -> bool {
        self.catalog
            .contains_key(&(language.to_string(), name.to_string()))
    }

    /// Render a template in the recipient's language, falling back to the
    /// default language when that language has no such template.
    ///
    /// Subject or plain-body failures abort the rendering; a rich-body
    /// failure only drops the rich part (plain delivery still proceeds).
    pub fn render(
        &self,
        name: &str,
        language: &str,
        data: &Value,
    ) -> Result<RenderedMessage, NotifyError> {
        let language = if self.has_template(language, name) {
            language
        } else {
            &self.default_language
        };

        let template = self
            .catalog
            .get(&(language.to_string(), name.to_string()))
            .ok_or_else(|| {
                NotifyError::Template(format!("no template '{name}' for language '{language}'"))
            })?;

        let prefix = format!("{language}/{name}");

        let subject = self
            .handlebars
            .render(&format!("{prefix}/subject"), data)
            .map_err(|e| NotifyError::Template(format!("subject render failed: {e}")))?;

        let body_text = self
            .handlebars
            .render(&format!("{prefix}/text"), data)
            .map_err(|e| NotifyError::Template(format!("body render failed: {e}")))?;

        let body_html = if template.body_html.is_some() {
            match self.handlebars.render(&format!("{prefix}/html"), data) {
                Ok(html) => Some(html),
                Err(e) => {
                    debug!(template = %name, language = %language, error = %e,
                        "Rich body render failed, sending plain only");
                    None
                }
            }
        } else {
            None
        };

        Ok(RenderedMessage {
            subject,
            body_text,
            body_html,
        })
    }

    fn register_defaults(&mut self) -> Result<(), NotifyError> {
        // English
        self.register(
            "en",
            MessageTemplate {
                name: "new_tx_proposal".to_string(),
                subject: "New payment proposal".to_string(),
                body_text:
                    "A new payment proposal has been created in your wallet {{wallet_name}} by {{creator_name}}."
                        .to_string(),
                body_html: Some(
                    r#"<html><body><p>A new payment proposal has been created in your wallet <strong>{{wallet_name}}</strong> by {{creator_name}}.</p></body></html>"#
                        .to_string(),
                ),
            },
        )?;

        self.register(
            "en",
            MessageTemplate {
                name: "new_incoming_tx".to_string(),
                subject: "New payment received".to_string(),
                body_text:
                    "A payment of {{amount}} has been received into your wallet {{wallet_name}}."
                        .to_string(),
                body_html: Some(
                    r#"<html><body><p>A payment of <strong>{{amount}}</strong> has been received into your wallet {{wallet_name}}.</p></body></html>"#
                        .to_string(),
                ),
            },
        )?;

        self.register(
            "en",
            MessageTemplate {
                name: "new_outgoing_tx".to_string(),
                subject: "Payment sent".to_string(),
                body_text:
                    "A payment of {{amount}} has been sent from your wallet {{wallet_name}}."
                        .to_string(),
                body_html: Some(
                    r#"<html><body><p>A payment of <strong>{{amount}}</strong> has been sent from your wallet {{wallet_name}}.</p><p><a href="{{tx_url}}">View transaction</a></p></body></html>"#
                        .to_string(),
                ),
            },
        )?;

        self.register(
            "en",
            MessageTemplate {
                name: "tx_proposal_rejected".to_string(),
                subject: "Payment proposal rejected".to_string(),
                body_text:
                    "A payment proposal in your wallet {{wallet_name}} has been rejected."
                        .to_string(),
                body_html: None,
            },
        )?;

        self.register(
            "en",
            MessageTemplate {
                name: "tx_confirmation".to_string(),
                subject: "Transaction confirmed".to_string(),
                body_text:
                    "A transaction in your wallet {{wallet_name}} has been confirmed.".to_string(),
                body_html: None,
            },
        )?;

        self.register(
            "en",
            MessageTemplate {
                name: "new_cosigner".to_string(),
                subject: "New co-signer".to_string(),
                body_text:
                    "{{creator_name}} has joined your wallet {{wallet_name}}.".to_string(),
                body_html: None,
            },
        )?;

        // Spanish
        self.register(
            "es",
            MessageTemplate {
                name: "new_tx_proposal".to_string(),
                subject: "Nueva propuesta de pago".to_string(),
                body_text:
                    "{{creator_name}} ha creado una nueva propuesta de pago en su monedero {{wallet_name}}."
                        .to_string(),
                body_html: None,
            },
        )?;

        self.register(
            "es",
            MessageTemplate {
                name: "new_incoming_tx".to_string(),
                subject: "Nuevo pago recibido".to_string(),
                body_text:
                    "Se ha recibido un pago de {{amount}} en su monedero {{wallet_name}}."
                        .to_string(),
                body_html: Some(
                    r#"<html><body><p>Se ha recibido un pago de <strong>{{amount}}</strong> en su monedero {{wallet_name}}.</p></body></html>"#
                        .to_string(),
                ),
            },
        )?;

        self.register(
            "es",
            MessageTemplate {
                name: "new_outgoing_tx".to_string(),
                subject: "Pago enviado".to_string(),
                body_text:
                    "Se ha enviado un pago de {{amount}} desde su monedero {{wallet_name}}."
                        .to_string(),
                body_html: None,
            },
        )?;

        self.register(
            "es",
            MessageTemplate {
                name: "tx_proposal_rejected".to_string(),
                subject: "Propuesta de pago rechazada".to_string(),
                body_text:
                    "Una propuesta de pago en su monedero {{wallet_name}} ha sido rechazada."
                        .to_string(),
                body_html: None,
            },
        )?;

        self.register(
            "es",
            MessageTemplate {
                name: "tx_confirmation".to_string(),
                subject: "Transacción confirmada".to_string(),
                body_text:
                    "Una transacción en su monedero {{wallet_name}} ha sido confirmada."
                        .to_string(),
                body_html: None,
            },
        )?;

        self.register(
            "es",
            MessageTemplate {
                name: "new_cosigner".to_string(),
                subject: "Nuevo cofirmante".to_string(),
                body_text: "{{creator_name}} se ha unido a su monedero {{wallet_name}}.".to_string(),
                body_html: None,
            },
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_catalogs_registered() {
        let engine = TemplateEngine::new("en").unwrap();
        assert!(engine.has_template("en", "new_incoming_tx"));
        assert!(engine.has_template("es", "new_incoming_tx"));
        assert!(!engine.has_template("fr", "new_incoming_tx"));
    }

    #[test]
    fn test_render_english() {
        let engine = TemplateEngine::new("en").unwrap();
        let data = json!({"wallet_name": "family savings", "amount": "123,000 bits"});

        let rendered = engine.render("new_incoming_tx", "en", &data).unwrap();
        assert_eq!(rendered.subject, "New payment received");
        assert!(rendered.body_text.contains("123,000 bits"));
        assert!(rendered.body_text.contains("family savings"));
        assert!(rendered.body_html.unwrap().contains("123,000 bits"));
    }

    #[test]
    fn test_render_spanish() {
        let engine = TemplateEngine::new("en").unwrap();
        let data = json!({"wallet_name": "ahorros", "amount": "0.123 BTC"});

        let rendered = engine.render("new_incoming_tx", "es", &data).unwrap();
        assert_eq!(rendered.subject, "Nuevo pago recibido");
        assert!(rendered.body_text.contains("0.123 BTC"));
    }

    #[test]
    fn test_unknown_language_falls_back_to_default() {
        let engine = TemplateEngine::new("en").unwrap();
        let data = json!({"wallet_name": "w", "amount": "1.00 BTC"});

        let rendered = engine.render("new_incoming_tx", "de", &data).unwrap();
        assert_eq!(rendered.subject, "New payment received");
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let engine = TemplateEngine::new("en").unwrap();
        let err = engine.render("no_such_template", "en", &json!({})).unwrap_err();
        assert!(matches!(err, NotifyError::Template(_)));
    }

    #[test]
    fn test_missing_data_aborts_rendering() {
        let engine = TemplateEngine::new("en").unwrap();
        // new_incoming_tx requires amount and wallet_name
        let err = engine
            .render("new_incoming_tx", "en", &json!({"wallet_name": "w"}))
            .unwrap_err();
        assert!(matches!(err, NotifyError::Template(_)));
    }

    #[test]
    fn test_rich_body_failure_degrades_to_plain() {
        let engine = TemplateEngine::new("en").unwrap();
        // new_outgoing_tx html references tx_url; leave it out
        let data = json!({"wallet_name": "w", "amount": "0.80 BTC"});

        let rendered = engine.render("new_outgoing_tx", "en", &data).unwrap();
        assert!(rendered.body_text.contains("0.80 BTC"));
        assert!(rendered.body_html.is_none());
    }

    #[test]
    fn test_custom_template_registration() {
        let mut engine = TemplateEngine::new("en").unwrap();
        engine
            .register(
                "fr",
                MessageTemplate {
                    name: "new_incoming_tx".to_string(),
                    subject: "Nouveau paiement reçu".to_string(),
                    body_text: "Un paiement de {{amount}} est arrivé.".to_string(),
                    body_html: None,
                },
            )
            .unwrap();

        let rendered = engine
            .render("new_incoming_tx", "fr", &json!({"amount": "1.00 BTC"}))
            .unwrap();
        assert_eq!(rendered.subject, "Nouveau paiement reçu");
    }
}
