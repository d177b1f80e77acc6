//! services/message_builder.rs
//! Construye el mensaje personalizado de cada destinatario.

use lettre::message::{header::ContentType, Mailbox};
use lettre::{Address, Message};

use crate::config::sender_config::{PlaceholderPolicy, SenderConfig};
use crate::error::{SenderError, SenderResult};
use crate::models::recipient_model::Recipient;

const NAME_FALLBACK: &str = "there";

#[derive(Debug, Clone)]
pub struct MessageBuilder {
    from: Mailbox,
    company_name: String,
    unsubscribe_link: String,
    policy: PlaceholderPolicy,
}

impl MessageBuilder {
    pub fn new(config: &SenderConfig) -> SenderResult<Self> {
        let address: Address = config.from_email.parse().map_err(|e| {
            SenderError::Configuration(format!("invalid FROM_EMAIL '{}': {e}", config.from_email))
        })?;

        Ok(MessageBuilder {
            from: Mailbox::new(Some(config.from_name.clone()), address),
            company_name: config.company_name.clone(),
            unsubscribe_link: config.unsubscribe_link.clone(),
            policy: config.placeholder_policy,
        })
    }

    pub fn from_mailbox(&self) -> &Mailbox {
        &self.from
    }

    /// Sustituye {name}, {company_name} y {unsubscribe_link}.
    /// `{{` y `}}` producen llaves literales.
    pub fn render_body(&self, recipient: &Recipient, template: &str) -> SenderResult<String> {
        let name = recipient
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(NAME_FALLBACK);

        let mut out = String::with_capacity(template.len() + 32);
        let mut rest = template;

        while let Some(pos) = rest.find(['{', '}']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") || tail.starts_with("}}") {
                out.push_str(&tail[..1]);
                rest = &tail[2..];
                continue;
            }
            if tail.starts_with('}') {
                out.push('}');
                rest = &tail[1..];
                continue;
            }

            // tail empieza con '{'
            let key = tail[1..].find('}').map(|end| &tail[1..=end]).filter(|k| {
                !k.is_empty() && k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });

            match key {
                Some(key) => {
                    match key {
                        "name" => out.push_str(name),
                        "company_name" => out.push_str(&self.company_name),
                        "unsubscribe_link" => out.push_str(&self.unsubscribe_link),
                        unknown => match self.policy {
                            PlaceholderPolicy::Keep => {
                                out.push('{');
                                out.push_str(unknown);
                                out.push('}');
                            }
                            PlaceholderPolicy::Reject => {
                                return Err(SenderError::Template(format!(
                                    "unknown placeholder {{{unknown}}}"
                                )))
                            }
                        },
                    }
                    rest = &tail[key.len() + 2..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);

        Ok(out)
    }

    /// Mensaje completo: remitente, destinatario, asunto y cuerpo en texto plano.
    pub fn build(
        &self,
        recipient: &Recipient,
        subject: &str,
        body_template: &str,
    ) -> SenderResult<Message> {
        let to_address: Address = recipient.email.parse().map_err(|e| {
            SenderError::Input(format!("invalid recipient address '{}': {e}", recipient.email))
        })?;
        let to = Mailbox::new(recipient.name.clone(), to_address);

        let body = self.render_body(recipient, body_template)?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| SenderError::Template(format!("failed to build message: {e}")))
    }
}
