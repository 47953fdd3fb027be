//! Ollama backend implementation
//!
//! HTTP client for the Ollama generate API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::parsing::parse_extraction;
use super::types::ExtractedTransaction;
use super::{extraction_prompt, ExtractorBackend};

/// Per-call timeout for completion requests
///
/// Local models can be slow on first load; a bounded wait keeps a wedged
/// server from stalling a whole scan cycle.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Extraction(format!(
                "Ollama API error {}: {}",
                status, body
            )));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        Ok(ollama_response.response)
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl ExtractorBackend for OllamaBackend {
    async fn extract_transaction(
        &self,
        subject: &str,
        from: &str,
        body: &str,
    ) -> Result<ExtractedTransaction> {
        let prompt = extraction_prompt(subject, from, body);
        debug!(model = %self.model, subject = %subject, "Requesting transaction extraction");

        let response = self.generate(&prompt).await?;
        parse_extraction(&response)
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
