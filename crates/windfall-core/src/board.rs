//! Approval board seam (outbound mirror)
//!
//! Each pending topup is mirrored to an external board item for human review.
//! The mirror is best-effort: a board outage never blocks ingestion. Column
//! ids are operator-configured because the board schema is tenant-specific.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::PendingTopup;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Reference to a created board item
#[derive(Debug, Clone)]
pub struct BoardItemRef {
    pub board_id: String,
    pub item_id: String,
}

/// Operator-configured mapping from topup fields to board column ids
#[derive(Debug, Clone)]
pub struct BoardColumnMap {
    pub status: String,
    pub amount: String,
    pub sender: String,
    pub risk: String,
    pub reference: String,
    pub email_date: String,
    pub source: String,
    pub confidence: String,
}

impl Default for BoardColumnMap {
    fn default() -> Self {
        Self {
            status: "status".to_string(),
            amount: "amount".to_string(),
            sender: "sender".to_string(),
            risk: "risk".to_string(),
            reference: "reference".to_string(),
            email_date: "email_date".to_string(),
            source: "source".to_string(),
            confidence: "confidence".to_string(),
        }
    }
}

impl BoardColumnMap {
    /// Read column ids from MONDAY_COLUMN_* environment variables
    fn from_env() -> Self {
        let get = |var: &str, default: &str| {
            std::env::var(var).unwrap_or_else(|_| default.to_string())
        };
        Self {
            status: get("MONDAY_COLUMN_STATUS", "status"),
            amount: get("MONDAY_COLUMN_AMOUNT", "amount"),
            sender: get("MONDAY_COLUMN_SENDER", "sender"),
            risk: get("MONDAY_COLUMN_RISK", "risk"),
            reference: get("MONDAY_COLUMN_REFERENCE", "reference"),
            email_date: get("MONDAY_COLUMN_EMAIL_DATE", "email_date"),
            source: get("MONDAY_COLUMN_SOURCE", "source"),
            confidence: get("MONDAY_COLUMN_CONFIDENCE", "confidence"),
        }
    }
}

/// Board item name encoding amount + sender + source
pub fn item_name(topup: &PendingTopup) -> String {
    format!(
        "{:.2} {} from {} [{}]",
        topup.amount,
        topup.currency,
        if topup.sender_name.is_empty() {
            "unknown sender"
        } else {
            topup.sender_name.as_str()
        },
        topup.source
    )
}

/// Trait defining the board interface
#[async_trait]
pub trait BoardBackend: Send + Sync {
    /// Create the board item mirroring a pending topup
    async fn create_item(&self, topup: &PendingTopup) -> Result<BoardItemRef>;

    /// Post a threaded comment under an item (email body, risk breakdown)
    async fn post_comment(&self, item_id: &str, body: &str) -> Result<()>;

    /// Write a status label back to the item's status column
    async fn set_status(&self, item_id: &str, label: &str) -> Result<()>;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete board client enum
#[derive(Clone)]
pub enum BoardClient {
    /// monday.com GraphQL API
    Monday(MondayBoard),
    /// Recording mock for testing
    Mock(MockBoard),
}

impl BoardClient {
    /// Create a board client from environment variables
    ///
    /// Requires `MONDAY_API_TOKEN` and `MONDAY_BOARD_ID`. Column ids come
    /// from `MONDAY_COLUMN_*` variables with sensible defaults.
    /// Returns None when the board is not configured.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("MONDAY_API_TOKEN").ok()?;
        let board_id = std::env::var("MONDAY_BOARD_ID").ok()?;
        Some(BoardClient::Monday(MondayBoard::new(
            &token,
            &board_id,
            BoardColumnMap::from_env(),
        )))
    }

    /// Create a recording mock for testing
    pub fn mock() -> Self {
        BoardClient::Mock(MockBoard::new())
    }
}

#[async_trait]
impl BoardBackend for BoardClient {
    async fn create_item(&self, topup: &PendingTopup) -> Result<BoardItemRef> {
        match self {
            BoardClient::Monday(b) => b.create_item(topup).await,
            BoardClient::Mock(b) => b.create_item(topup).await,
        }
    }

    async fn post_comment(&self, item_id: &str, body: &str) -> Result<()> {
        match self {
            BoardClient::Monday(b) => b.post_comment(item_id, body).await,
            BoardClient::Mock(b) => b.post_comment(item_id, body).await,
        }
    }

    async fn set_status(&self, item_id: &str, label: &str) -> Result<()> {
        match self {
            BoardClient::Monday(b) => b.set_status(item_id, label).await,
            BoardClient::Mock(b) => b.set_status(item_id, label).await,
        }
    }

    fn host(&self) -> &str {
        match self {
            BoardClient::Monday(b) => b.host(),
            BoardClient::Mock(b) => b.host(),
        }
    }
}

/// monday.com GraphQL adapter
#[derive(Clone)]
pub struct MondayBoard {
    http_client: Client,
    api_url: String,
    token: String,
    board_id: String,
    columns: BoardColumnMap,
}

impl MondayBoard {
    pub fn new(token: &str, board_id: &str, columns: BoardColumnMap) -> Self {
        Self {
            http_client: Client::new(),
            api_url: "https://api.monday.com/v2".to_string(),
            token: token.to_string(),
            board_id: board_id.to_string(),
            columns,
        }
    }

    /// Point at a non-default API host (for testing against a stub)
    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn graphql(&self, query: &str) -> Result<serde_json::Value> {
        let response = self
            .http_client
            .post(&self.api_url)
            .timeout(REQUEST_TIMEOUT)
            .header("Authorization", &self.token)
            .json(&json!({ "query": query }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Board(format!(
                "Board API error {}: {}",
                status, body
            )));
        }

        let body: serde_json::Value = response.json().await?;
        if let Some(errors) = body.get("errors") {
            return Err(Error::Board(format!("Board API errors: {}", errors)));
        }
        Ok(body)
    }

    /// Column values JSON for a topup, keyed by configured column ids
    fn column_values(&self, topup: &PendingTopup) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(self.columns.status.clone(), json!({"label": "Pending"}));
        map.insert(
            self.columns.amount.clone(),
            json!(format!("{:.2}", topup.amount)),
        );
        map.insert(self.columns.sender.clone(), json!(topup.sender_name));
        map.insert(
            self.columns.risk.clone(),
            json!({"label": topup.risk_level.label()}),
        );
        map.insert(self.columns.reference.clone(), json!(topup.bank_reference));
        map.insert(
            self.columns.email_date.clone(),
            json!(topup.created_at.format("%Y-%m-%d").to_string()),
        );
        map.insert(self.columns.source.clone(), json!(topup.source.as_str()));
        map.insert(
            self.columns.confidence.clone(),
            json!(topup.confidence.map(|c| c.to_string()).unwrap_or_default()),
        );
        serde_json::Value::Object(map)
    }
}

#[async_trait]
impl BoardBackend for MondayBoard {
    async fn create_item(&self, topup: &PendingTopup) -> Result<BoardItemRef> {
        let name = item_name(topup);
        let column_values = serde_json::to_string(&self.column_values(topup))?;
        let query = format!(
            r#"mutation {{ create_item (board_id: {}, item_name: {}, column_values: {}) {{ id }} }}"#,
            self.board_id,
            serde_json::to_string(&name)?,
            serde_json::to_string(&column_values)?,
        );

        let body = self.graphql(&query).await?;
        let item_id = body["data"]["create_item"]["id"]
            .as_str()
            .map(|s| s.to_string())
            .or_else(|| body["data"]["create_item"]["id"].as_i64().map(|i| i.to_string()))
            .ok_or_else(|| Error::Board("Board create_item returned no id".into()))?;

        info!(item_id = %item_id, name = %name, "Board item created");
        Ok(BoardItemRef {
            board_id: self.board_id.clone(),
            item_id,
        })
    }

    async fn post_comment(&self, item_id: &str, body: &str) -> Result<()> {
        let query = format!(
            r#"mutation {{ create_update (item_id: {}, body: {}) {{ id }} }}"#,
            item_id,
            serde_json::to_string(&body)?,
        );
        self.graphql(&query).await?;
        Ok(())
    }

    async fn set_status(&self, item_id: &str, label: &str) -> Result<()> {
        let query = format!(
            r#"mutation {{ change_simple_column_value (board_id: {}, item_id: {}, column_id: {}, value: {}) {{ id }} }}"#,
            self.board_id,
            item_id,
            serde_json::to_string(&self.columns.status)?,
            serde_json::to_string(&label)?,
        );
        self.graphql(&query).await?;
        Ok(())
    }

    fn host(&self) -> &str {
        &self.api_url
    }
}

/// Recording mock board for testing
#[derive(Clone, Default)]
pub struct MockBoard {
    inner: Arc<Mutex<MockBoardState>>,
    /// Force create_item to fail (board unreachable)
    pub fail: bool,
}

#[derive(Default)]
struct MockBoardState {
    next_id: i64,
    items: Vec<(String, String)>,
    comments: Vec<(String, String)>,
    statuses: Vec<(String, String)>,
}

impl MockBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            inner: Arc::default(),
            fail: true,
        }
    }

    /// (item_id, name) pairs created so far
    pub fn items(&self) -> Vec<(String, String)> {
        self.inner.lock().expect("mock board lock").items.clone()
    }

    /// (item_id, body) comment pairs posted so far
    pub fn comments(&self) -> Vec<(String, String)> {
        self.inner.lock().expect("mock board lock").comments.clone()
    }

    /// (item_id, label) status writes so far
    pub fn statuses(&self) -> Vec<(String, String)> {
        self.inner.lock().expect("mock board lock").statuses.clone()
    }
}

#[async_trait]
impl BoardBackend for MockBoard {
    async fn create_item(&self, topup: &PendingTopup) -> Result<BoardItemRef> {
        if self.fail {
            return Err(Error::Board("Mock board unreachable".into()));
        }
        let mut state = self.inner.lock().expect("mock board lock");
        state.next_id += 1;
        let item_id = format!("{}", 9000 + state.next_id);
        state.items.push((item_id.clone(), item_name(topup)));
        Ok(BoardItemRef {
            board_id: "board-1".to_string(),
            item_id,
        })
    }

    async fn post_comment(&self, item_id: &str, body: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Board("Mock board unreachable".into()));
        }
        self.inner
            .lock()
            .expect("mock board lock")
            .comments
            .push((item_id.to_string(), body.to_string()));
        Ok(())
    }

    async fn set_status(&self, item_id: &str, label: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Board("Mock board unreachable".into()));
        }
        self.inner
            .lock()
            .expect("mock board lock")
            .statuses
            .push((item_id.to_string(), label.to_string()));
        Ok(())
    }

    fn host(&self) -> &str {
        "mock://board"
    }
}
