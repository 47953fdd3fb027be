//! Wallet ledger seam
//!
//! The wallet is an external collaborator with idempotency-by-reference: the
//! same reference can be submitted any number of times but credits a balance
//! at most once. Windfall derives the reference deterministically from the
//! PendingTopup id, so a replayed approval can never double-credit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One ledger credit request
#[derive(Debug, Clone, Serialize)]
pub struct DepositRequest {
    pub amount: f64,
    pub currency: String,
    /// Idempotency key, e.g. "topup_42"
    pub reference: String,
    pub description: String,
}

/// Trait defining the wallet ledger interface
#[async_trait]
pub trait WalletLedger: Send + Sync {
    /// Apply a credit; idempotent by `request.reference`
    async fn deposit(&self, request: &DepositRequest) -> Result<()>;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete wallet client enum
#[derive(Clone)]
pub enum WalletClient {
    /// HTTP wallet API
    Http(HttpWallet),
    /// Recording mock for testing
    Mock(MockWallet),
}

impl WalletClient {
    /// Create a wallet client from environment variables
    ///
    /// Requires `WALLET_API_URL`; `WALLET_API_KEY` is optional.
    /// Returns None when the wallet is not configured.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("WALLET_API_URL").ok()?;
        let api_key = std::env::var("WALLET_API_KEY").ok();
        Some(WalletClient::Http(HttpWallet::new(&url, api_key)))
    }

    /// Create a recording mock for testing
    pub fn mock() -> Self {
        WalletClient::Mock(MockWallet::new())
    }
}

#[async_trait]
impl WalletLedger for WalletClient {
    async fn deposit(&self, request: &DepositRequest) -> Result<()> {
        match self {
            WalletClient::Http(w) => w.deposit(request).await,
            WalletClient::Mock(w) => w.deposit(request).await,
        }
    }

    fn host(&self) -> &str {
        match self {
            WalletClient::Http(w) => w.host(),
            WalletClient::Mock(w) => w.host(),
        }
    }
}

/// HTTP wallet API adapter
#[derive(Clone)]
pub struct HttpWallet {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpWallet {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl WalletLedger for HttpWallet {
    async fn deposit(&self, request: &DepositRequest) -> Result<()> {
        let mut req_builder = self
            .http_client
            .post(format!("{}/api/deposits", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;
        let status = response.status();

        // 409 means the reference was already applied - the credit exists,
        // which is the outcome we wanted
        if status == reqwest::StatusCode::CONFLICT {
            info!(reference = %request.reference, "Deposit already applied");
            return Ok(());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Wallet(format!(
                "Deposit failed with {}: {}",
                status, body
            )));
        }

        info!(
            reference = %request.reference,
            amount = request.amount,
            "Wallet deposit applied"
        );
        Ok(())
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

/// Recording mock wallet for testing
#[derive(Clone, Default)]
pub struct MockWallet {
    deposits: Arc<Mutex<Vec<DepositRequest>>>,
    fail: Arc<AtomicBool>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All deposits applied so far
    pub fn deposits(&self) -> Vec<DepositRequest> {
        self.deposits.lock().expect("mock wallet lock").clone()
    }

    /// Make subsequent deposit calls fail (or succeed again)
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletLedger for MockWallet {
    async fn deposit(&self, request: &DepositRequest) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Wallet("Mock wallet failure".into()));
        }

        let mut deposits = self.deposits.lock().expect("mock wallet lock");
        // Idempotency by reference, like the real ledger
        if !deposits.iter().any(|d| d.reference == request.reference) {
            deposits.push(request.clone());
        }
        Ok(())
    }

    fn host(&self) -> &str {
        "mock://wallet"
    }
}
