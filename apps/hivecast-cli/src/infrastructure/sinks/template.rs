//! Webhook Payload Templates
//!
//! Turns a received message into the JSON body posted to a webhook. A
//! template is plain text with `{{placeholder}}` markers; substituted values
//! are JSON-escaped so user payloads cannot break the document, and the
//! rendered result must itself parse as JSON.
//!
//! Without a template the raw payload text is forwarded as-is.

use chrono::SecondsFormat;

use crate::domain::message::InboundMessage;

/// Placeholders a template may reference.
const PLACEHOLDERS: [&str; 5] = ["message", "timestamp", "topic", "client_id", "message_id"];

/// Built-in template for generic JSON consumers.
const GENERIC_TEMPLATE: &str = r#"{"message": "{{message}}", "timestamp": "{{timestamp}}", "topic": "{{topic}}", "client_id": "{{client_id}}", "message_id": "{{message_id}}"}"#;

/// Built-in template for Discord webhooks.
const DISCORD_TEMPLATE: &str = r#"{"content": "[{{topic}}] {{message}}"}"#;

/// Built-in template for Slack incoming webhooks.
const SLACK_TEMPLATE: &str = r#"{"text": "[{{topic}}] {{message}}"}"#;

/// A template failed to compile or render.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// The template references a placeholder that does not exist.
    #[error("unknown template placeholder: {{{{{0}}}}}")]
    UnknownPlaceholder(String),

    /// A `{{` marker was never closed.
    #[error("unterminated placeholder in template")]
    UnterminatedPlaceholder,

    /// The rendered output is not valid JSON.
    #[error("rendered webhook payload is not valid JSON: {0}")]
    InvalidJson(String),
}

/// Compiled webhook payload template.
#[derive(Debug, Clone)]
pub struct PayloadTemplate {
    source: Option<String>,
    client_id: String,
}

impl PayloadTemplate {
    /// Passthrough template: forwards the raw payload text unchanged.
    #[must_use]
    pub const fn passthrough() -> Self {
        Self {
            source: None,
            client_id: String::new(),
        }
    }

    /// Compile an inline template body, rejecting unknown placeholders.
    pub fn compile(source: &str, client_id: &str) -> Result<Self, TemplateError> {
        for name in scan_placeholders(source)? {
            if !PLACEHOLDERS.contains(&name) {
                return Err(TemplateError::UnknownPlaceholder(name.to_string()));
            }
        }
        Ok(Self {
            source: Some(source.to_string()),
            client_id: client_id.to_string(),
        })
    }

    /// Resolve a configured template value: absent means passthrough, a
    /// preset name picks the built-in, anything else is an inline body.
    pub fn from_config(template: Option<&str>, client_id: &str) -> Result<Self, TemplateError> {
        match template {
            None => Ok(Self::passthrough()),
            Some("generic") => Self::compile(GENERIC_TEMPLATE, client_id),
            Some("discord") => Self::compile(DISCORD_TEMPLATE, client_id),
            Some("slack") => Self::compile(SLACK_TEMPLATE, client_id),
            Some(inline) => Self::compile(inline, client_id),
        }
    }

    /// Render the webhook body for one message.
    ///
    /// # Errors
    ///
    /// Fails when the templated output does not parse as JSON; the caller
    /// drops that delivery only.
    pub fn render(&self, message: &InboundMessage) -> Result<String, TemplateError> {
        let Some(source) = &self.source else {
            return Ok(message.payload_text());
        };

        let rendered = substitute(source, |name| match name {
            "message" => json_escape(&message.payload_text()),
            "timestamp" => json_escape(
                &message
                    .received_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            "topic" => json_escape(&message.topic),
            "client_id" => json_escape(&self.client_id),
            "message_id" => json_escape(&message.message_id),
            // compile() already rejected anything else
            _ => String::new(),
        });

        serde_json::from_str::<serde_json::Value>(&rendered)
            .map_err(|e| TemplateError::InvalidJson(e.to_string()))?;
        Ok(rendered)
    }
}

/// List the placeholder names appearing in `source`.
fn scan_placeholders(source: &str) -> Result<Vec<&str>, TemplateError> {
    let mut names = Vec::new();
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or(TemplateError::UnterminatedPlaceholder)?;
        names.push(after[..end].trim());
        rest = &after[end + 2..];
    }
    Ok(names)
}

fn substitute(source: &str, resolve: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        // Unterminated markers were rejected at compile time.
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str(&resolve(after[..end].trim()));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// JSON-escape a string for embedding inside a quoted template slot.
fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

// =============================================================================
// Tests
// =============================================================================
