//! Pluggable completion-service backend abstraction
//!
//! This module provides a backend-agnostic interface for turning free-form
//! bank-notification emails into structured transaction candidates.
//!
//! # Architecture
//!
//! - `ExtractorBackend` trait: defines the extraction interface
//! - `ExtractorClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaBackend`, `OpenAICompatibleBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (ollama, openai_compatible, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Default model name (default: llama3.2)
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required for openai_compatible backend)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::ExtractedTransaction;

use async_trait::async_trait;

use crate::error::Result;

/// Prompt template for transaction extraction
///
/// Both HTTP backends render the same prompt so extraction behavior does not
/// depend on which completion server is configured.
pub(crate) fn extraction_prompt(subject: &str, from: &str, body: &str) -> String {
    format!(
        r#"You are given a bank notification email. Decide whether it announces money
received into an account, and if so extract the transaction facts.

Respond with ONLY a JSON object, no other text:
{{"amount": <number>, "currency": "<ISO code or null>", "sender_name": "<who sent the money>",
"bank_reference": "<bank reference or empty string>", "transaction_type": "<transfer/deposit/payment>",
"date": "<date stated in the email or null>", "confidence": <0-100>,
"summary": "<one line description>"}}

If the email is not a money-received alert, respond with {{"amount": 0, "confidence": 0}}.

Email subject: {}
Email from: {}
Email body:
{}"#,
        subject, from, body
    )
}

/// Trait defining the interface for all extractor backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait ExtractorBackend: Send + Sync {
    /// Extract a structured transaction candidate from email content
    ///
    /// The caller is responsible for truncating `body` to the service's
    /// input limit before calling.
    async fn extract_transaction(
        &self,
        subject: &str,
        from: &str,
        body: &str,
    ) -> Result<ExtractedTransaction>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete extractor client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum ExtractorClient {
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// OpenAI-compatible backend (vLLM, LocalAI, llama-server, etc.)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl ExtractorClient {
    /// Create an extractor client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `ollama` (default): Uses OLLAMA_HOST and OLLAMA_MODEL
    /// - `openai_compatible`: Uses OPENAI_COMPATIBLE_HOST and OPENAI_COMPATIBLE_MODEL
    /// - `mock`: Creates a mock backend for testing
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(ExtractorClient::Ollama),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(ExtractorClient::OpenAICompatible)
            }
            "mock" => Some(ExtractorClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to ollama");
                OllamaBackend::from_env().map(ExtractorClient::Ollama)
            }
        }
    }

    /// Create an Ollama backend directly
    pub fn ollama(host: &str, model: &str) -> Self {
        ExtractorClient::Ollama(OllamaBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        ExtractorClient::Mock(MockBackend::new())
    }
}

// Implement ExtractorBackend for ExtractorClient by delegating to the inner backend
#[async_trait]
impl ExtractorBackend for ExtractorClient {
    async fn extract_transaction(
        &self,
        subject: &str,
        from: &str,
        body: &str,
    ) -> Result<ExtractedTransaction> {
        match self {
            ExtractorClient::Ollama(b) => b.extract_transaction(subject, from, body).await,
            ExtractorClient::OpenAICompatible(b) => {
                b.extract_transaction(subject, from, body).await
            }
            ExtractorClient::Mock(b) => b.extract_transaction(subject, from, body).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            ExtractorClient::Ollama(b) => b.health_check().await,
            ExtractorClient::OpenAICompatible(b) => b.health_check().await,
            ExtractorClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            ExtractorClient::Ollama(b) => b.model(),
            ExtractorClient::OpenAICompatible(b) => b.model(),
            ExtractorClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            ExtractorClient::Ollama(b) => b.host(),
            ExtractorClient::OpenAICompatible(b) => b.host(),
            ExtractorClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_client_mock() {
        let client = ExtractorClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let client = ExtractorClient::mock();
        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_mock_extraction() {
        let client = ExtractorClient::mock();
        let result = client
            .extract_transaction(
                "You received money",
                "alerts@bank.example",
                "You received $75.00 from Jane Doe, reference TX998",
            )
            .await
            .unwrap();
        assert!(result.amount > 0.0);
        assert!(result.confidence > 0);
    }
}
