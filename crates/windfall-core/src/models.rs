//! Domain models for Windfall

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a pending topup
///
/// Transitions: `pending -> approved`, `pending -> rejected`. Both targets
/// are terminal; a credited item stays `approved` with `credited = true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopupStatus {
    Pending,
    Approved,
    Rejected,
}

impl TopupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Whether this status accepts no further approval/rejection events
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether a transition to `next` is legal
    pub fn can_transition_to(&self, next: TopupStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved) | (Self::Pending, Self::Rejected)
        )
    }
}

impl std::str::FromStr for TopupStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown topup status: {}", s)),
        }
    }
}

impl std::fmt::Display for TopupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Duplicate-risk classification assigned by the dedup engine
///
/// Ordered strict to fuzzy; the first matching layer wins. The level never
/// blocks creation - it annotates the item for human/board review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Clear,
    LowRisk,
    PotentialDuplicate,
    Duplicate,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::LowRisk => "low_risk",
            Self::PotentialDuplicate => "potential_duplicate",
            Self::Duplicate => "duplicate",
        }
    }

    /// Human-readable label for board columns and CLI output
    pub fn label(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::LowRisk => "Low risk",
            Self::PotentialDuplicate => "Potential duplicate",
            Self::Duplicate => "Duplicate",
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clear" => Ok(Self::Clear),
            "low_risk" => Ok(Self::LowRisk),
            "potential_duplicate" => Ok(Self::PotentialDuplicate),
            "duplicate" => Ok(Self::Duplicate),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a pending topup entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TopupSource {
    /// Created by the inbox poller
    #[default]
    Inbox,
    /// Manually entered by an operator
    Manual,
}

impl TopupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for TopupSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inbox" => Ok(Self::Inbox),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown topup source: {}", s)),
        }
    }
}

impl std::fmt::Display for TopupSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal outcome recorded for every examined email id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedOutcome {
    CreatedPending,
    RejectedByRules,
    SkippedNotTransaction,
}

impl ProcessedOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedPending => "created_pending",
            Self::RejectedByRules => "rejected_by_rules",
            Self::SkippedNotTransaction => "skipped_not_transaction",
        }
    }
}

impl std::str::FromStr for ProcessedOutcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created_pending" => Ok(Self::CreatedPending),
            "rejected_by_rules" => Ok(Self::RejectedByRules),
            "skipped_not_transaction" => Ok(Self::SkippedNotTransaction),
            _ => Err(format!("Unknown processed outcome: {}", s)),
        }
    }
}

impl std::fmt::Display for ProcessedOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Poller operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PollingMode {
    /// Automated interval scanning
    #[default]
    Realtime,
    /// Scans only when triggered by an operator
    Manual,
}

impl PollingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for PollingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "realtime" => Ok(Self::Realtime),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown polling mode: {}", s)),
        }
    }
}

impl std::fmt::Display for PollingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A staged, not-yet-credited transaction candidate awaiting approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTopup {
    pub id: i64,
    /// Credit amount, always positive
    pub amount: f64,
    /// ISO currency code (e.g. "USD")
    pub currency: String,
    /// Display name of the sender as extracted from the email
    pub sender_name: String,
    /// Bank reference string; may be empty when the email carried none
    pub bank_reference: String,
    pub source: TopupSource,
    /// Source email id, set for inbox-sourced items
    pub source_email_id: Option<String>,
    pub email_subject: Option<String>,
    pub email_from: Option<String>,
    /// Truncated body excerpt kept for audit
    pub email_preview: Option<String>,
    /// Raw extractor output blob (JSON)
    pub extracted_json: Option<String>,
    /// Extractor confidence, 0-100
    pub confidence: Option<i64>,
    pub risk_level: RiskLevel,
    pub warning_text: Option<String>,
    pub warnings: Vec<String>,
    pub matched_items: Vec<MatchedItem>,
    /// Why the rule filter passed this item
    pub rule_reason: Option<String>,
    pub auto_approve: bool,
    pub status: TopupStatus,
    /// Set once the wallet credit has been applied
    pub credited: bool,
    /// Recorded when approval succeeded but the wallet credit failed
    pub credit_error: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Free-form note from the reviewer (e.g. rejection reason)
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingTopup {
    /// Deterministic idempotency reference for the wallet credit
    pub fn credit_reference(&self) -> String {
        format!("topup_{}", self.id)
    }
}

/// Insert payload for a new pending topup
#[derive(Debug, Clone, Default)]
pub struct NewPendingTopup {
    pub amount: f64,
    pub currency: String,
    pub sender_name: String,
    pub bank_reference: String,
    pub source: TopupSource,
    pub source_email_id: Option<String>,
    pub email_subject: Option<String>,
    pub email_from: Option<String>,
    pub email_preview: Option<String>,
    pub extracted_json: Option<String>,
    pub confidence: Option<i64>,
    pub risk_level: RiskLevel,
    pub warning_text: Option<String>,
    pub warnings: Vec<String>,
    pub matched_items: Vec<MatchedItem>,
    pub rule_reason: Option<String>,
    pub auto_approve: bool,
}

/// Summary of an existing item matched by the dedup engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedItem {
    pub id: i64,
    pub amount: f64,
    pub sender: String,
    pub status: TopupStatus,
    pub date: DateTime<Utc>,
}

/// Dedup engine output attached to a new pending topup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupReport {
    pub risk_level: RiskLevel,
    /// Human summary of the strongest match, if any
    pub warning_text: Option<String>,
    pub warnings: Vec<String>,
    pub matched_items: Vec<MatchedItem>,
}

/// Operator-editable rule configuration (singleton)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    /// Sender must match one entry when non-empty (case-insensitive substring)
    pub sender_whitelist: Vec<String>,
    /// At least one must appear in subject+body when non-empty
    pub must_contain_keywords: Vec<String>,
    /// None may appear in subject+body
    pub must_not_contain_keywords: Vec<String>,
    /// Amounts above this are rejected; 0 disables the ceiling
    pub amount_max_threshold: f64,
    /// Amounts at or below this qualify for auto-approval; 0 disables
    pub amount_auto_approve_threshold: f64,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            sender_whitelist: vec![],
            must_contain_keywords: vec![],
            must_not_contain_keywords: vec![],
            amount_max_threshold: 0.0,
            amount_auto_approve_threshold: 0.0,
            enabled: true,
            updated_at: Utc::now(),
        }
    }
}

/// Rule filter verdict for one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDecision {
    pub pass: bool,
    pub reason: String,
    pub auto_approve: bool,
}

/// Operator-editable poller configuration (singleton)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    pub enabled: bool,
    pub polling_mode: PollingMode,
    pub polling_interval_minutes: i64,
    /// How many recent inbox messages each scan fetches
    pub fetch_count: i64,
    pub last_auto_scan: Option<DateTime<Utc>>,
    /// Pending topups created by the most recent scan
    pub last_scan_created: i64,
    pub updated_at: DateTime<Utc>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            polling_mode: PollingMode::Realtime,
            polling_interval_minutes: 5,
            fetch_count: 10,
            last_auto_scan: None,
            last_scan_created: 0,
            updated_at: Utc::now(),
        }
    }
}

impl PollerSettings {
    /// Whether automated interval scanning is currently requested
    pub fn automated(&self) -> bool {
        self.enabled && self.polling_mode == PollingMode::Realtime
    }
}

/// One inbox message as fetched from the mailbox collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Mailbox-assigned stable id, used for idempotent ingestion
    pub id: String,
    pub subject: String,
    pub from: String,
    pub body: String,
    pub received_at: Option<DateTime<Utc>>,
}

/// Link between a pending topup and its external board item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardLinkage {
    pub id: i64,
    pub topup_id: i64,
    pub board_id: String,
    pub board_item_id: String,
    pub created_at: DateTime<Utc>,
}

/// One examined email id and its terminal outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEmail {
    pub id: i64,
    pub email_id: String,
    pub outcome: ProcessedOutcome,
    pub topup_id: Option<i64>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome class recorded for an inbound webhook event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookOutcome {
    Challenge,
    Success,
    Ignored,
    Error,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Challenge => "challenge",
            Self::Success => "success",
            Self::Ignored => "ignored",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for WebhookOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record for one inbound webhook event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// SHA-256 digest of the raw payload, hex encoded
    pub payload_digest: String,
    pub outcome: String,
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(TopupStatus::Pending.can_transition_to(TopupStatus::Approved));
        assert!(TopupStatus::Pending.can_transition_to(TopupStatus::Rejected));
        assert!(!TopupStatus::Approved.can_transition_to(TopupStatus::Rejected));
        assert!(!TopupStatus::Rejected.can_transition_to(TopupStatus::Approved));
        assert!(!TopupStatus::Approved.can_transition_to(TopupStatus::Pending));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TopupStatus::Pending,
            TopupStatus::Approved,
            TopupStatus::Rejected,
        ] {
            let parsed: TopupStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_risk_level_round_trip() {
        for level in [
            RiskLevel::Clear,
            RiskLevel::LowRisk,
            RiskLevel::PotentialDuplicate,
            RiskLevel::Duplicate,
        ] {
            let parsed: RiskLevel = level.as_str().parse().unwrap();
            assert_eq!(parsed, level);
        }
    }

    #[test]
    fn test_automated_polling_requires_realtime_mode() {
        let mut settings = PollerSettings {
            enabled: true,
            ..Default::default()
        };
        assert!(settings.automated());

        settings.polling_mode = PollingMode::Manual;
        assert!(!settings.automated());

        settings.polling_mode = PollingMode::Realtime;
        settings.enabled = false;
        assert!(!settings.automated());
    }
}
