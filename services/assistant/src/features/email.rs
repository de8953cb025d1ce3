//! Drafts (or "sends") emails into an in-memory outbox.

use super::{Feature, FeatureKind};
use anyhow::bail;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use gemini_live::types::{Schema, ToolDeclaration};
use gemini_live::{ToolHandler, typed_tool};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;
use uuid::Uuid;

pub const TOOL_NAME: &str = "draft_email";
const RECENT_DRAFTS: usize = 10;

#[derive(Debug, Deserialize)]
pub struct DraftEmailArgs {
    pub to: String,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub send: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Draft,
    Sent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub id: Uuid,
    pub to: String,
    pub subject: String,
    pub content: String,
    /// RFC 822 message, base64url encoded without padding.
    pub raw: String,
    pub status: EmailStatus,
}

#[derive(Debug, Default)]
pub struct Outbox {
    messages: Mutex<Vec<EmailMessage>>,
}

impl Outbox {
    pub fn submit(&self, args: DraftEmailArgs) -> anyhow::Result<EmailMessage> {
        let to = args.to.trim();
        if !is_plausible_address(to) {
            bail!("'{to}' is not an email address");
        }
        if args.subject.trim().is_empty() {
            bail!("email subject is empty");
        }

        let status = if args.send {
            EmailStatus::Sent
        } else {
            EmailStatus::Draft
        };
        let message = EmailMessage {
            id: Uuid::new_v4(),
            raw: encode_raw(to, &args.subject, &args.content),
            to: to.to_string(),
            subject: args.subject,
            content: args.content,
            status,
        };
        info!(id = %message.id, to = %message.to, ?status, "Stored email");
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(message)
    }

    /// Most recent drafts first.
    pub fn drafts(&self, limit: usize) -> Vec<EmailMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .filter(|m| m.status == EmailStatus::Draft)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.status == EmailStatus::Sent)
            .count()
    }
}

fn is_plausible_address(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !address.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn encode_raw(to: &str, subject: &str, content: &str) -> String {
    let message = [
        format!("To: {to}"),
        format!("Subject: {subject}"),
        "Content-Type: text/plain; charset=\"UTF-8\"".to_string(),
        "MIME-Version: 1.0".to_string(),
        String::new(),
        content.to_string(),
    ]
    .join("\n");
    URL_SAFE_NO_PAD.encode(message)
}

#[derive(Default)]
pub struct EmailDrafts {
    outbox: Arc<Outbox>,
}

impl EmailDrafts {
    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }
}

impl Feature for EmailDrafts {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Email
    }

    fn instruction(&self) -> &'static str {
        "When I ask you to draft or send an email, use the \"draft_email\" function. \
         Only set send to true when I explicitly ask to send it."
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(TOOL_NAME, "Drafts or sends an email using Gmail").with_parameters(
            Schema::object()
                .required_property(
                    "to",
                    Schema::string().describe("Email address of the recipient"),
                )
                .required_property("subject", Schema::string().describe("Subject of the email"))
                .required_property("content", Schema::string().describe("Content of the email"))
                .property(
                    "send",
                    Schema::boolean()
                        .describe("Whether to send the email immediately or save as draft"),
                ),
        )
    }

    fn handler(&self) -> Arc<dyn ToolHandler> {
        let outbox = self.outbox.clone();
        typed_tool(move |args: DraftEmailArgs| {
            let outbox = outbox.clone();
            async move {
                let message = outbox.submit(args)?;
                Ok::<Value, anyhow::Error>(json!({
                    "success": true,
                    "id": message.id,
                    "status": message.status,
                    "drafts": outbox.drafts(RECENT_DRAFTS).len(),
                }))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(to: &str, send: bool) -> DraftEmailArgs {
        DraftEmailArgs {
            to: to.to_string(),
            subject: "Quarterly report".to_string(),
            content: "Attached.".to_string(),
            send,
        }
    }

    #[test]
    fn drafts_and_sent_mail_are_kept_apart() {
        let outbox = Outbox::default();
        outbox.submit(args("a@example.com", false)).unwrap();
        outbox.submit(args("b@example.com", true)).unwrap();
        outbox.submit(args("c@example.com", false)).unwrap();

        let drafts: Vec<_> = outbox.drafts(10).into_iter().map(|m| m.to).collect();
        assert_eq!(drafts, vec!["c@example.com", "a@example.com"]);
        assert_eq!(outbox.sent_count(), 1);
    }

    #[test]
    fn raw_message_is_base64url_rfc822() {
        let raw = encode_raw("a@example.com", "Hi", "Body");
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(raw).unwrap()).unwrap();
        assert!(decoded.starts_with("To: a@example.com\nSubject: Hi\n"));
        assert!(decoded.ends_with("\n\nBody"));
    }

    #[test]
    fn rejects_malformed_recipients() {
        let outbox = Outbox::default();
        for to in ["", "nobody", "@example.com", "a@localhost", "a b@example.com"] {
            assert!(outbox.submit(args(to, false)).is_err(), "{to} was accepted");
        }
        assert!(outbox.drafts(10).is_empty());
    }

    #[tokio::test]
    async fn handler_reports_status_and_draft_count() {
        let feature = EmailDrafts::default();
        let call = gemini_live::types::FunctionCall {
            id: "1".to_string(),
            name: TOOL_NAME.to_string(),
            args: json!({ "to": "a@example.com", "subject": "Hi", "content": "Hello" })
                .as_object()
                .cloned()
                .unwrap(),
        };

        let response = feature.handler().call(call).await.unwrap();
        assert_eq!(response["status"], "draft");
        assert_eq!(response["drafts"], 1);
        assert_eq!(feature.outbox().drafts(10)[0].subject, "Hi");
    }
}
