//! Mail adapter -- the `mail_list`, `mail_read`, `mail_search` and
//! `mail_send` built-in tools.
//!
//! Talking to a real mail server is the host's job; this module defines the
//! [`Mailbox`] collaborator the tools call, plus an in-memory implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::error::{AdapterError, Result};
use crate::traits::{Adapter, ToolDefinition, not_found, optional_usize, required_str};

pub const MAIL_LIST_TOOL: &str = "mail_list";
pub const MAIL_READ_TOOL: &str = "mail_read";
pub const MAIL_SEARCH_TOOL: &str = "mail_search";
pub const MAIL_SEND_TOOL: &str = "mail_send";

const DEFAULT_LIMIT: usize = 10;

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// Envelope-level view of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSummary {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub unread: bool,
}

/// A full message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    #[serde(flatten)]
    pub summary: MailSummary,
    pub to: Vec<String>,
    pub body: String,
}

/// A message to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Host mailbox collaborator.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Most recent messages first.
    async fn list(&self, limit: usize) -> Result<Vec<MailSummary>>;

    async fn read(&self, id: &str) -> Result<MailMessage>;

    /// Messages whose sender, subject or body contain `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MailSummary>>;

    /// Send a message, returning its id.
    async fn send(&self, mail: OutgoingMail) -> Result<String>;
}

/// [`Mailbox`] used when no mail account is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMailbox;

fn no_mailbox() -> AdapterError {
    AdapterError::Unavailable {
        what: "mailbox".into(),
    }
}

#[async_trait]
impl Mailbox for NoMailbox {
    async fn list(&self, _limit: usize) -> Result<Vec<MailSummary>> {
        Err(no_mailbox())
    }

    async fn read(&self, _id: &str) -> Result<MailMessage> {
        Err(no_mailbox())
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<MailSummary>> {
        Err(no_mailbox())
    }

    async fn send(&self, _mail: OutgoingMail) -> Result<String> {
        Err(no_mailbox())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  In-memory mailbox
// ═══════════════════════════════════════════════════════════════════════

/// [`Mailbox`] held in memory.  Sent mail is stored alongside received mail.
#[derive(Debug, Default)]
pub struct MemoryMailbox {
    messages: DashMap<String, MailMessage>,
    sent: DashMap<String, OutgoingMail>,
    next_id: AtomicU64,
}

impl MemoryMailbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message into the inbox.
    pub fn deliver(&self, message: MailMessage) {
        self.messages.insert(message.summary.id.clone(), message);
    }

    /// Messages handed to [`Mailbox::send`], in no particular order.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.iter().map(|e| e.value().clone()).collect()
    }

    fn newest_first<F>(&self, limit: usize, keep: F) -> Vec<MailSummary>
    where
        F: Fn(&MailMessage) -> bool,
    {
        let mut found: Vec<MailSummary> = self
            .messages
            .iter()
            .filter(|e| keep(e.value()))
            .map(|e| e.value().summary.clone())
            .collect();
        found.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        found.truncate(limit);
        found
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    async fn list(&self, limit: usize) -> Result<Vec<MailSummary>> {
        Ok(self.newest_first(limit, |_| true))
    }

    async fn read(&self, id: &str) -> Result<MailMessage> {
        let mut entry = self
            .messages
            .get_mut(id)
            .ok_or_else(|| AdapterError::invalid(MAIL_READ_TOOL, format!("no message with id `{id}`")))?;
        entry.summary.unread = false;
        Ok(entry.clone())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MailSummary>> {
        let needle = query.to_lowercase();
        Ok(self.newest_first(limit, |m| {
            m.summary.from.to_lowercase().contains(&needle)
                || m.summary.subject.to_lowercase().contains(&needle)
                || m.body.to_lowercase().contains(&needle)
        }))
    }

    async fn send(&self, mail: OutgoingMail) -> Result<String> {
        let id = format!("sent-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.sent.insert(id.clone(), mail);
        Ok(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Adapter
// ═══════════════════════════════════════════════════════════════════════

/// Exposes a [`Mailbox`] as tools.
pub struct MailAdapter {
    mailbox: Arc<dyn Mailbox>,
}

impl MailAdapter {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self { mailbox }
    }
}

/// `to` may be a single address, a comma-separated list, or a JSON array.
fn recipients(params: &Value) -> Result<Vec<String>> {
    let to: Vec<String> = match params.get("to") {
        Some(Value::String(s)) => s.split(',').map(|a| a.trim().to_string()).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|a| a.trim().to_string())
            .collect(),
        _ => Vec::new(),
    };
    let to: Vec<String> = to.into_iter().filter(|a| !a.is_empty()).collect();
    if to.is_empty() {
        return Err(AdapterError::invalid(MAIL_SEND_TOOL, "at least one recipient in `to` is required"));
    }
    Ok(to)
}

#[async_trait]
impl Adapter for MailAdapter {
    fn id(&self) -> &str {
        "mail"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        let limit = json!({ "type": "integer", "description": "Maximum messages (default 10)" });
        vec![
            ToolDefinition {
                name: MAIL_LIST_TOOL.into(),
                description: "List the most recent messages in the inbox.".into(),
                parameters: json!({ "type": "object", "properties": { "limit": limit } }),
            },
            ToolDefinition {
                name: MAIL_READ_TOOL.into(),
                description: "Read a message by id.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": { "id": { "type": "string" } },
                    "required": ["id"]
                }),
            },
            ToolDefinition {
                name: MAIL_SEARCH_TOOL.into(),
                description: "Search messages by sender, subject or body.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": { "query": { "type": "string" }, "limit": limit },
                    "required": ["query"]
                }),
            },
            ToolDefinition {
                name: MAIL_SEND_TOOL.into(),
                description: "Send an email.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "to": { "type": "string", "description": "Recipient address(es), comma-separated" },
                        "subject": { "type": "string" },
                        "body": { "type": "string" }
                    },
                    "required": ["to", "subject", "body"]
                }),
            },
        ]
    }

    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        match name {
            MAIL_LIST_TOOL => {
                let limit = optional_usize(&params, "limit", DEFAULT_LIMIT);
                Ok(serde_json::to_value(self.mailbox.list(limit).await?)?)
            }
            MAIL_READ_TOOL => {
                let id = required_str(&params, name, "id")?;
                Ok(serde_json::to_value(self.mailbox.read(id).await?)?)
            }
            MAIL_SEARCH_TOOL => {
                let query = required_str(&params, name, "query")?;
                let limit = optional_usize(&params, "limit", DEFAULT_LIMIT);
                Ok(serde_json::to_value(self.mailbox.search(query, limit).await?)?)
            }
            MAIL_SEND_TOOL => {
                let mail = OutgoingMail {
                    to: recipients(&params)?,
                    subject: required_str(&params, name, "subject")?.to_string(),
                    body: required_str(&params, name, "body")?.to_string(),
                };
                let recipients = mail.to.len();
                let id = self.mailbox.send(mail).await?;
                info!(id = %id, recipients, "mail sent");
                Ok(json!({ "sent": true, "id": id }))
            }
            _ => Err(not_found(self.id(), name)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
