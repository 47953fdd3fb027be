//! Mailbox seam (inbox fetching)
//!
//! The mailbox protocol client is an external collaborator; this module only
//! defines the seam and a thin Gmail REST adapter. A scan asks for the N most
//! recent messages matching the operator's query; everything downstream is
//! per-message and order-independent.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::EmailMessage;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Trait defining the mailbox interface
#[async_trait]
pub trait MailboxBackend: Send + Sync {
    /// Fetch the most recent matching messages, newest first
    async fn fetch_recent(&self, limit: i64) -> Result<Vec<EmailMessage>>;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete mailbox client enum
#[derive(Clone)]
pub enum MailboxClient {
    /// Gmail REST API
    Gmail(GmailClient),
    /// In-memory mock for testing
    Mock(MockMailbox),
}

impl MailboxClient {
    /// Create a mailbox client from environment variables
    ///
    /// Requires `GMAIL_API_TOKEN`. `GMAIL_QUERY` narrows the search
    /// (default: "money received"). Returns None when not configured.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("GMAIL_API_TOKEN").ok()?;
        let query =
            std::env::var("GMAIL_QUERY").unwrap_or_else(|_| "money received".to_string());
        Some(MailboxClient::Gmail(GmailClient::new(&token, &query)))
    }

    /// Create an in-memory mock for testing
    pub fn mock() -> Self {
        MailboxClient::Mock(MockMailbox::new())
    }
}

#[async_trait]
impl MailboxBackend for MailboxClient {
    async fn fetch_recent(&self, limit: i64) -> Result<Vec<EmailMessage>> {
        match self {
            MailboxClient::Gmail(m) => m.fetch_recent(limit).await,
            MailboxClient::Mock(m) => m.fetch_recent(limit).await,
        }
    }

    fn host(&self) -> &str {
        match self {
            MailboxClient::Gmail(m) => m.host(),
            MailboxClient::Mock(m) => m.host(),
        }
    }
}

/// Thin Gmail REST adapter
#[derive(Clone)]
pub struct GmailClient {
    http_client: Client,
    base_url: String,
    token: String,
    query: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageId>,
}

#[derive(Debug, Deserialize)]
struct MessageId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
    #[serde(default)]
    snippet: String,
    #[serde(rename = "internalDate", default)]
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct MessagePart {
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

impl GmailClient {
    pub fn new(token: &str, query: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
            token: token.to_string(),
            query: query.to_string(),
        }
    }

    /// Point at a non-default API host (for testing against a stub)
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Mailbox(format!(
                "Mailbox API error {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    fn header<'a>(payload: &'a MessagePart, name: &str) -> Option<&'a str> {
        payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// First text/plain body in the part tree, base64url decoded
    fn body_text(part: &MessagePart) -> Option<String> {
        if part.mime_type == "text/plain" {
            if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
                if let Ok(bytes) = base64::engine::general_purpose::URL_SAFE.decode(data) {
                    return Some(String::from_utf8_lossy(&bytes).into_owned());
                }
            }
        }
        part.parts.iter().find_map(Self::body_text)
    }

    fn parse_internal_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
        let millis: i64 = raw?.parse().ok()?;
        DateTime::from_timestamp_millis(millis)
    }
}

#[async_trait]
impl MailboxBackend for GmailClient {
    async fn fetch_recent(&self, limit: i64) -> Result<Vec<EmailMessage>> {
        let list_url = format!(
            "{}/users/me/messages?q={}&maxResults={}",
            self.base_url,
            urlencode(&self.query),
            limit.max(1)
        );
        let list: MessageList = self.get_json(&list_url).await?;

        let mut messages = Vec::with_capacity(list.messages.len());
        for id in list.messages {
            let message_url =
                format!("{}/users/me/messages/{}?format=full", self.base_url, id.id);
            let message: Message = self.get_json(&message_url).await?;

            let (subject, from, body) = match message.payload {
                Some(ref payload) => (
                    Self::header(payload, "Subject").unwrap_or_default().to_string(),
                    Self::header(payload, "From").unwrap_or_default().to_string(),
                    Self::body_text(payload).unwrap_or_else(|| message.snippet.clone()),
                ),
                None => (String::new(), String::new(), message.snippet.clone()),
            };

            messages.push(EmailMessage {
                id: message.id,
                subject,
                from,
                body,
                received_at: Self::parse_internal_date(message.internal_date.as_deref()),
            });
        }

        Ok(messages)
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

/// Minimal percent-encoding for the Gmail search query
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(c),
            ' ' => out.push('+'),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).as_bytes() {
                    out.push_str(&format!("%{:02X}", byte));
                }
            }
        }
    }
    out
}

/// In-memory mock mailbox for testing
#[derive(Clone, Default)]
pub struct MockMailbox {
    messages: Arc<Mutex<Vec<EmailMessage>>>,
    /// Force fetch_recent to fail (inbox unreachable)
    pub fail: bool,
}

impl MockMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            messages: Arc::default(),
            fail: true,
        }
    }

    /// Queue a message for the next fetch
    pub fn push(&self, message: EmailMessage) {
        self.messages.lock().expect("mock mailbox lock").push(message);
    }
}

#[async_trait]
impl MailboxBackend for MockMailbox {
    async fn fetch_recent(&self, limit: i64) -> Result<Vec<EmailMessage>> {
        if self.fail {
            return Err(Error::Mailbox("Mock mailbox unreachable".into()));
        }
        let messages = self.messages.lock().expect("mock mailbox lock");
        // Newest first, like the real inbox
        Ok(messages
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    fn host(&self) -> &str {
        "mock://mailbox"
    }
}
