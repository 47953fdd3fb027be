//! Extractor backend response types
//!
//! These types are backend-agnostic and used across all extractor implementations.

use serde::{Deserialize, Serialize};

/// Structured transaction candidate extracted from a notification email
///
/// Fields the model omits fall back to serde defaults, so a partial but
/// well-formed reply still yields a candidate (the policy layer decides
/// whether it survives).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedTransaction {
    /// Credit amount; non-positive means the email is not a usable transaction
    #[serde(default)]
    pub amount: f64,
    /// ISO currency code, if the email stated one
    #[serde(default)]
    pub currency: Option<String>,
    /// Display name of the money sender
    #[serde(default)]
    pub sender_name: String,
    /// Bank reference/transfer id; empty when the email carried none
    #[serde(default)]
    pub bank_reference: String,
    /// e.g. "transfer", "deposit", "payment"
    #[serde(default)]
    pub transaction_type: Option<String>,
    /// Transaction date as stated in the email, if any
    #[serde(default)]
    pub date: Option<String>,
    /// Model's own confidence that this is a money-received alert, 0-100
    #[serde(default)]
    pub confidence: i64,
    /// One-line description of the transaction
    #[serde(default)]
    pub summary: Option<String>,
}
