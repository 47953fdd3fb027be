//! Mock backend for testing
//!
//! Provides configurable mock responses for transaction extraction.
//! Useful for unit tests and development without a running LLM server.

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::ExtractedTransaction;
use super::ExtractorBackend;

/// Mock extractor backend for testing
///
/// By default it runs a small heuristic parse over the email body ("$X from
/// Name, ref REF") so end-to-end tests can exercise realistic flows. A fixed
/// response or a forced failure can be configured per test.
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    /// Fixed response returned instead of the heuristic parse
    pub response: Option<ExtractedTransaction>,
    /// Force every extraction call to fail
    pub fail: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            response: None,
            fail: false,
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            response: None,
            fail: false,
        }
    }

    /// Create a mock that always returns the given candidate
    pub fn with_response(response: ExtractedTransaction) -> Self {
        Self {
            healthy: true,
            response: Some(response),
            fail: false,
        }
    }

    /// Create a mock whose extraction calls always fail
    pub fn failing() -> Self {
        Self {
            healthy: true,
            response: None,
            fail: true,
        }
    }

    /// Heuristic extraction from a "$X from Name, ref REF" shaped body
    fn heuristic_extract(&self, body: &str) -> ExtractedTransaction {
        let amount = find_dollar_amount(body).unwrap_or(0.0);
        let sender_name = find_after_keyword(body, "from ")
            .map(|s| s.trim_end_matches([',', '.']).to_string())
            .unwrap_or_default();
        let bank_reference = find_after_keyword(body, "ref ")
            .or_else(|| find_after_keyword(body, "reference "))
            .map(|s| {
                s.split_whitespace()
                    .next()
                    .unwrap_or("")
                    .trim_end_matches([',', '.'])
                    .to_string()
            })
            .unwrap_or_default();

        let confidence = if amount > 0.0 { 85 } else { 0 };

        ExtractedTransaction {
            amount,
            currency: Some("USD".to_string()),
            sender_name,
            bank_reference,
            transaction_type: Some("transfer".to_string()),
            date: None,
            confidence,
            summary: None,
        }
    }
}

/// First "$123.45" style amount in the text
fn find_dollar_amount(text: &str) -> Option<f64> {
    let idx = text.find('$')?;
    let tail = &text[idx + 1..];
    let end = tail
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != ',')
        .unwrap_or(tail.len());
    tail[..end].replace(',', "").parse().ok()
}

/// Words following a keyword, up to a comma, period, or newline
fn find_after_keyword(text: &str, keyword: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let idx = lower.find(keyword)?;
    let tail = &text[idx + keyword.len()..];
    let end = tail.find(['\n', ',']).unwrap_or(tail.len());
    let result = tail[..end].trim();
    if result.is_empty() {
        None
    } else {
        Some(result.to_string())
    }
}

#[async_trait]
impl ExtractorBackend for MockBackend {
    async fn extract_transaction(
        &self,
        _subject: &str,
        _from: &str,
        body: &str,
    ) -> Result<ExtractedTransaction> {
        if self.fail {
            return Err(Error::Extraction("Mock extraction failure".into()));
        }
        if let Some(ref response) = self.response {
            return Ok(response.clone());
        }
        Ok(self.heuristic_extract(body))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
