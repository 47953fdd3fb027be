//! JSON parsing helpers for extractor backend responses
//!
//! These functions extract JSON from completion-service replies, which often
//! include extra text before/after the JSON payload.

use crate::error::{Error, Result};

use super::types::ExtractedTransaction;

/// Parse an extracted transaction from a model response
pub fn parse_extraction(response: &str) -> Result<ExtractedTransaction> {
    // Try to find JSON in the response
    let response = response.trim();

    // Look for JSON object
    let start = response.find('{');
    let end = response.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            serde_json::from_str(json_str).map_err(|e| {
                // Truncate long responses for the error message
                let truncated = if json_str.len() > 200 {
                    format!("{}...", &json_str[..200])
                } else {
                    json_str.to_string()
                };
                Error::Extraction(format!("Invalid JSON from model: {} | Raw: {}", e, truncated))
            })
        }
        _ => Err(Error::Extraction(format!(
            "No JSON found in model response | Raw: {}",
            if response.len() > 200 {
                format!("{}...", &response[..200])
            } else {
                response.to_string()
            }
        ))),
    }
}
