//! Extraction policy layer
//!
//! Wraps the raw extractor backend with the ingestion policy: bounded input,
//! a confidence floor, and the non-positive-amount gate. A malformed model
//! reply is an extraction failure, not a crash - the email is classified as
//! "not a transaction" and marked processed-but-skipped by the pipeline.

use tracing::debug;

use crate::ai::{ExtractedTransaction, ExtractorBackend, ExtractorClient};
use crate::error::Result;
use crate::models::EmailMessage;

/// Default minimum extractor confidence for a candidate to survive
pub const DEFAULT_MIN_CONFIDENCE: i64 = 30;

/// Default cap on email body characters sent to the completion service
pub const DEFAULT_MAX_BODY_CHARS: usize = 4000;

/// Why an email did not yield a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The completion service reply was malformed or the call failed
    ExtractionFailed(String),
    /// Confidence below the operator threshold
    LowConfidence(i64),
    /// Extracted amount was zero or negative
    NonPositiveAmount,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtractionFailed(detail) => write!(f, "extraction failed: {}", detail),
            Self::LowConfidence(confidence) => {
                write!(f, "confidence {} below threshold", confidence)
            }
            Self::NonPositiveAmount => write!(f, "non-positive amount"),
        }
    }
}

/// Outcome of running the extraction policy over one email
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    /// A usable transaction candidate
    Candidate(ExtractedTransaction),
    /// The email is not a transaction; marked processed-but-skipped upstream
    NotATransaction(SkipReason),
}

/// Extraction policy configuration
#[derive(Debug, Clone)]
pub struct ExtractPolicy {
    pub min_confidence: i64,
    pub max_body_chars: usize,
}

impl Default for ExtractPolicy {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
        }
    }
}

impl ExtractPolicy {
    /// Truncate a body to the completion service's input limit
    ///
    /// Cuts on a char boundary so multi-byte content never panics.
    pub fn truncate_body<'a>(&self, body: &'a str) -> &'a str {
        if body.len() <= self.max_body_chars {
            return body;
        }
        let mut end = self.max_body_chars;
        while end > 0 && !body.is_char_boundary(end) {
            end -= 1;
        }
        &body[..end]
    }

    /// Run extraction over one email and apply the policy gates
    pub async fn extract(
        &self,
        extractor: &ExtractorClient,
        email: &EmailMessage,
    ) -> Result<ExtractionOutcome> {
        let body = self.truncate_body(&email.body);

        let candidate = match extractor
            .extract_transaction(&email.subject, &email.from, body)
            .await
        {
            Ok(candidate) => candidate,
            Err(e) => {
                debug!(email_id = %email.id, error = %e, "Extractor call failed");
                return Ok(ExtractionOutcome::NotATransaction(
                    SkipReason::ExtractionFailed(e.to_string()),
                ));
            }
        };

        if candidate.confidence < self.min_confidence {
            return Ok(ExtractionOutcome::NotATransaction(
                SkipReason::LowConfidence(candidate.confidence),
            ));
        }

        if candidate.amount <= 0.0 {
            return Ok(ExtractionOutcome::NotATransaction(
                SkipReason::NonPositiveAmount,
            ));
        }

        Ok(ExtractionOutcome::Candidate(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;

    fn email(body: &str) -> EmailMessage {
        EmailMessage {
            id: "msg-1".to_string(),
            subject: "You received money".to_string(),
            from: "alerts@bank.example".to_string(),
            body: body.to_string(),
            received_at: None,
        }
    }

    #[tokio::test]
    async fn test_low_confidence_is_suppressed() {
        let extractor = ExtractorClient::Mock(MockBackend::with_response(ExtractedTransaction {
            amount: 50.0,
            confidence: 20,
            ..Default::default()
        }));
        let policy = ExtractPolicy::default();

        let outcome = policy
            .extract(&extractor, &email("irrelevant"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ExtractionOutcome::NotATransaction(SkipReason::LowConfidence(20))
        ));
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_suppressed() {
        let extractor = ExtractorClient::Mock(MockBackend::with_response(ExtractedTransaction {
            amount: 0.0,
            confidence: 90,
            ..Default::default()
        }));
        let policy = ExtractPolicy::default();

        let outcome = policy
            .extract(&extractor, &email("irrelevant"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ExtractionOutcome::NotATransaction(SkipReason::NonPositiveAmount)
        ));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_not_a_crash() {
        let extractor = ExtractorClient::Mock(MockBackend::failing());
        let policy = ExtractPolicy::default();

        let outcome = policy
            .extract(&extractor, &email("irrelevant"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ExtractionOutcome::NotATransaction(SkipReason::ExtractionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_confident_candidate_passes() {
        let extractor = ExtractorClient::mock();
        let policy = ExtractPolicy::default();

        let outcome = policy
            .extract(
                &extractor,
                &email("You received $75.00 from Jane Doe, ref TX998."),
            )
            .await
            .unwrap();
        match outcome {
            ExtractionOutcome::Candidate(candidate) => {
                assert_eq!(candidate.amount, 75.0);
                assert_eq!(candidate.bank_reference, "TX998");
            }
            other => panic!("Expected candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let policy = ExtractPolicy {
            max_body_chars: 5,
            ..Default::default()
        };
        // 'é' is 2 bytes; cutting at byte 5 would split it
        let body = "abcdéf";
        let truncated = policy.truncate_body(body);
        assert!(truncated.len() <= 5);
        assert!(body.starts_with(truncated));
    }
}
