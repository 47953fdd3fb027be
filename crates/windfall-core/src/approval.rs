//! Approval engine and webhook label normalization
//!
//! Every approve/reject path - board webhook, admin API, CLI, rule
//! auto-approval - funnels through this engine, so the compare-and-set
//! discipline and the credit-exactly-once guarantee hold no matter where a
//! decision came from.

use serde_json::Value;
use tracing::{info, warn};

use crate::board::{BoardBackend, BoardClient};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::TopupStatus;
use crate::wallet::{DepositRequest, WalletClient, WalletLedger};

/// Actor recorded for board-originated decisions
pub const BOARD_ACTOR: &str = "monday.com";

/// Actor recorded for rule-driven auto-approvals
pub const RULES_ACTOR: &str = "system:rules";

/// Normalized decision parsed from a webhook status label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLabel {
    Approve,
    Decline,
    Other(String),
}

/// Pull the status label out of a webhook `value` field
///
/// The board delivers the label in several shapes: a plain string, a
/// `{"label": ...}` object, or a JSON-encoded string wrapping either. This
/// is the single place those shapes are normalized; the depth bound keeps a
/// maliciously nested payload from recursing forever.
pub fn parse_status_label(value: &Value) -> Option<String> {
    extract_label(value, 0)
}

fn extract_label(value: &Value, depth: u8) -> Option<String> {
    if depth > 3 {
        return None;
    }
    match value {
        Value::String(s) => {
            // A JSON-encoded string wraps one of the other shapes
            if let Ok(inner) = serde_json::from_str::<Value>(s) {
                if let Some(label) = extract_label(&inner, depth + 1) {
                    return Some(label);
                }
            }
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Object(map) => map
            .get("label")
            .or_else(|| map.get("text"))
            .and_then(|inner| extract_label(inner, depth + 1)),
        _ => None,
    }
}

/// Classify a normalized label into a decision
pub fn classify_label(label: &str) -> StatusLabel {
    match label.trim().to_lowercase().as_str() {
        "approve" | "approved" | "aprobado" => StatusLabel::Approve,
        "decline" | "declined" | "rejected" | "reject" | "rechazado" => StatusLabel::Decline,
        other => StatusLabel::Other(other.to_string()),
    }
}

/// Result of applying an approval or rejection event
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    Approved {
        credited: bool,
        credit_error: Option<String>,
    },
    Rejected,
    /// The item was already terminal; the event is a safe no-op
    Ignored { status: TopupStatus },
}

/// Applies approve/reject decisions and drives the wallet bridge
#[derive(Clone)]
pub struct ApprovalEngine {
    db: Database,
    wallet: Option<WalletClient>,
    board: Option<BoardClient>,
}

impl ApprovalEngine {
    pub fn new(db: Database, wallet: Option<WalletClient>, board: Option<BoardClient>) -> Self {
        Self { db, wallet, board }
    }

    /// Approve a pending topup and apply the wallet credit
    ///
    /// The status write is a compare-and-set, so a duplicate delivery finds
    /// the item already approved and returns `Ignored`. A wallet failure
    /// leaves the item approved with `credit_error` recorded for operator
    /// remediation - it is never retried automatically.
    pub async fn approve(&self, topup_id: i64, actor: &str) -> Result<ApprovalOutcome> {
        let topup = self
            .db
            .get_pending_topup(topup_id)?
            .ok_or_else(|| Error::NotFound(format!("Pending topup {}", topup_id)))?;

        if !self
            .db
            .try_transition(topup_id, TopupStatus::Approved, actor, None)?
        {
            let status = self.current_status(topup_id)?;
            info!(topup_id, status = %status, "Approval ignored - already {}", status);
            return Ok(ApprovalOutcome::Ignored { status });
        }

        info!(topup_id, actor, amount = topup.amount, "Topup approved");

        let (credited, credit_error) = self.apply_credit(topup_id).await?;
        self.sync_board_status(topup_id, actor, "Approved").await;

        Ok(ApprovalOutcome::Approved {
            credited,
            credit_error,
        })
    }

    /// Reject a pending topup, recording the reason
    pub async fn reject(
        &self,
        topup_id: i64,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<ApprovalOutcome> {
        if self.db.get_pending_topup(topup_id)?.is_none() {
            return Err(Error::NotFound(format!("Pending topup {}", topup_id)));
        }

        if !self
            .db
            .try_transition(topup_id, TopupStatus::Rejected, actor, reason)?
        {
            let status = self.current_status(topup_id)?;
            info!(topup_id, status = %status, "Rejection ignored - already {}", status);
            return Ok(ApprovalOutcome::Ignored { status });
        }

        info!(topup_id, actor, reason = reason.unwrap_or(""), "Topup rejected");
        self.sync_board_status(topup_id, actor, "Rejected").await;

        Ok(ApprovalOutcome::Rejected)
    }

    /// Operator-initiated retry of a failed credit on an approved topup
    pub async fn retry_credit(&self, topup_id: i64) -> Result<(bool, Option<String>)> {
        let topup = self
            .db
            .get_pending_topup(topup_id)?
            .ok_or_else(|| Error::NotFound(format!("Pending topup {}", topup_id)))?;

        if topup.status != TopupStatus::Approved {
            return Err(Error::StateConflict(format!(
                "Topup {} is {}, not approved",
                topup_id, topup.status
            )));
        }
        if topup.credited {
            return Ok((true, None));
        }

        self.apply_credit(topup_id).await
    }

    /// Run the wallet bridge for an approved topup
    ///
    /// Returns (credited, credit_error). The deposit reference is derived
    /// from the topup id, so replays cannot double-credit even if this runs
    /// more than once.
    async fn apply_credit(&self, topup_id: i64) -> Result<(bool, Option<String>)> {
        let topup = self
            .db
            .get_pending_topup(topup_id)?
            .ok_or_else(|| Error::NotFound(format!("Pending topup {}", topup_id)))?;

        let wallet = match self.wallet {
            Some(ref wallet) => wallet,
            None => {
                let message = "Wallet ledger not configured".to_string();
                warn!(topup_id, "{}", message);
                self.db.set_credit_error(topup_id, &message)?;
                return Ok((false, Some(message)));
            }
        };

        let request = DepositRequest {
            amount: topup.amount,
            currency: topup.currency.clone(),
            reference: topup.credit_reference(),
            description: format!(
                "Topup from {} ({})",
                topup.sender_name,
                if topup.bank_reference.is_empty() {
                    "no reference"
                } else {
                    topup.bank_reference.as_str()
                }
            ),
        };

        match wallet.deposit(&request).await {
            Ok(()) => {
                self.db.mark_credited(topup_id)?;
                Ok((true, None))
            }
            Err(e) => {
                let message = e.to_string();
                warn!(topup_id, error = %message, "Wallet credit failed");
                self.db.set_credit_error(topup_id, &message)?;
                Ok((false, Some(message)))
            }
        }
    }

    /// Best-effort status write-back for locally made decisions
    ///
    /// Skipped when the decision came from the board itself - its column is
    /// already in the right state and writing back would echo.
    async fn sync_board_status(&self, topup_id: i64, actor: &str, label: &str) {
        if actor == BOARD_ACTOR {
            return;
        }
        let board = match self.board {
            Some(ref board) => board,
            None => return,
        };
        let linkage = match self.db.get_linkage_for_topup(topup_id) {
            Ok(Some(linkage)) => linkage,
            Ok(None) => return,
            Err(e) => {
                warn!(topup_id, error = %e, "Linkage lookup failed during board sync");
                return;
            }
        };
        if let Err(e) = board.set_status(&linkage.board_item_id, label).await {
            warn!(topup_id, error = %e, "Board status write-back failed");
        }
    }

    fn current_status(&self, topup_id: i64) -> Result<TopupStatus> {
        Ok(self
            .db
            .get_pending_topup(topup_id)?
            .map(|t| t.status)
            .unwrap_or(TopupStatus::Pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPendingTopup;
    use crate::wallet::MockWallet;
    use serde_json::json;

    fn staged(db: &Database, amount: f64) -> i64 {
        db.create_pending_topup(&NewPendingTopup {
            amount,
            currency: "USD".to_string(),
            sender_name: "Jane Doe".to_string(),
            bank_reference: "TX998".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn engine_with_wallet(db: &Database) -> (ApprovalEngine, MockWallet) {
        let wallet = MockWallet::new();
        let engine = ApprovalEngine::new(
            db.clone(),
            Some(WalletClient::Mock(wallet.clone())),
            None,
        );
        (engine, wallet)
    }

    #[test]
    fn test_parse_label_plain_string() {
        assert_eq!(
            parse_status_label(&json!("Approved")),
            Some("Approved".to_string())
        );
    }

    #[test]
    fn test_parse_label_object() {
        assert_eq!(
            parse_status_label(&json!({"label": "Approved"})),
            Some("Approved".to_string())
        );
    }

    #[test]
    fn test_parse_label_json_encoded_string() {
        // The board sometimes double-encodes the value column
        assert_eq!(
            parse_status_label(&json!(r#"{"label": "Approved"}"#)),
            Some("Approved".to_string())
        );
        assert_eq!(
            parse_status_label(&json!(r#""Approved""#)),
            Some("Approved".to_string())
        );
    }

    #[test]
    fn test_parse_label_nested_text_field() {
        assert_eq!(
            parse_status_label(&json!({"label": {"text": "Done"}})),
            Some("Done".to_string())
        );
    }

    #[test]
    fn test_parse_label_rejects_non_labels() {
        assert_eq!(parse_status_label(&json!(42)), None);
        assert_eq!(parse_status_label(&json!(null)), None);
        assert_eq!(parse_status_label(&json!({"other": "x"})), None);
        assert_eq!(parse_status_label(&json!("")), None);
    }

    #[test]
    fn test_classify_label_sets() {
        assert_eq!(classify_label("Approved"), StatusLabel::Approve);
        assert_eq!(classify_label("aprobado"), StatusLabel::Approve);
        assert_eq!(classify_label("APPROVE"), StatusLabel::Approve);
        assert_eq!(classify_label("Rejected"), StatusLabel::Decline);
        assert_eq!(classify_label("rechazado"), StatusLabel::Decline);
        assert_eq!(classify_label("decline"), StatusLabel::Decline);
        assert_eq!(
            classify_label("Working on it"),
            StatusLabel::Other("working on it".to_string())
        );
    }

    #[tokio::test]
    async fn test_approve_credits_exactly_once() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 100.0);
        let (engine, wallet) = engine_with_wallet(&db);

        // First approval succeeds and credits
        let outcome = engine.approve(id, BOARD_ACTOR).await.unwrap();
        assert!(matches!(
            outcome,
            ApprovalOutcome::Approved {
                credited: true,
                credit_error: None
            }
        ));

        // Duplicate webhook delivery is ignored, no second deposit
        let outcome = engine.approve(id, BOARD_ACTOR).await.unwrap();
        assert!(matches!(
            outcome,
            ApprovalOutcome::Ignored {
                status: TopupStatus::Approved
            }
        ));

        let deposits = wallet.deposits();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].amount, 100.0);
        assert_eq!(deposits[0].reference, format!("topup_{}", id));
    }

    #[tokio::test]
    async fn test_reject_then_approve_is_ignored() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 50.0);
        let (engine, wallet) = engine_with_wallet(&db);

        let outcome = engine
            .reject(id, "admin@example.com", Some("looks wrong"))
            .await
            .unwrap();
        assert!(matches!(outcome, ApprovalOutcome::Rejected));

        let outcome = engine.approve(id, BOARD_ACTOR).await.unwrap();
        assert!(matches!(
            outcome,
            ApprovalOutcome::Ignored {
                status: TopupStatus::Rejected
            }
        ));
        assert!(wallet.deposits().is_empty());

        let topup = db.get_pending_topup(id).unwrap().unwrap();
        assert_eq!(topup.review_note.as_deref(), Some("looks wrong"));
        assert_eq!(topup.reviewed_by.as_deref(), Some("admin@example.com"));
    }

    #[tokio::test]
    async fn test_wallet_failure_records_credit_error() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 75.0);
        let (engine, wallet) = engine_with_wallet(&db);
        wallet.set_fail(true);

        let outcome = engine.approve(id, BOARD_ACTOR).await.unwrap();
        match outcome {
            ApprovalOutcome::Approved {
                credited,
                credit_error,
            } => {
                assert!(!credited);
                assert!(credit_error.is_some());
            }
            other => panic!("Expected approved, got {:?}", other),
        }

        // Approved but uncredited, with the error persisted
        let topup = db.get_pending_topup(id).unwrap().unwrap();
        assert_eq!(topup.status, TopupStatus::Approved);
        assert!(!topup.credited);
        assert!(topup.credit_error.is_some());
    }

    #[tokio::test]
    async fn test_retry_credit_after_wallet_recovery() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 75.0);
        let (engine, wallet) = engine_with_wallet(&db);

        wallet.set_fail(true);
        engine.approve(id, BOARD_ACTOR).await.unwrap();

        wallet.set_fail(false);
        let (credited, credit_error) = engine.retry_credit(id).await.unwrap();
        assert!(credited);
        assert!(credit_error.is_none());

        let topup = db.get_pending_topup(id).unwrap().unwrap();
        assert!(topup.credited);
        assert!(topup.credit_error.is_none());
        assert_eq!(wallet.deposits().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_credit_on_pending_item_is_a_conflict() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 75.0);
        let (engine, _wallet) = engine_with_wallet(&db);

        assert!(matches!(
            engine.retry_credit(id).await,
            Err(Error::StateConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_without_wallet_records_error() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 75.0);
        let engine = ApprovalEngine::new(db.clone(), None, None);

        let outcome = engine.approve(id, "admin@example.com").await.unwrap();
        match outcome {
            ApprovalOutcome::Approved { credited, .. } => assert!(!credited),
            other => panic!("Expected approved, got {:?}", other),
        }

        let topup = db.get_pending_topup(id).unwrap().unwrap();
        assert!(topup.credit_error.is_some());
    }

    #[tokio::test]
    async fn test_manual_decision_writes_board_status_back() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 75.0);
        let board = crate::board::MockBoard::new();
        db.create_board_linkage(id, "board-1", "9001").unwrap();

        let wallet = MockWallet::new();
        let engine = ApprovalEngine::new(
            db.clone(),
            Some(WalletClient::Mock(wallet)),
            Some(BoardClient::Mock(board.clone())),
        );

        engine.approve(id, "admin@example.com").await.unwrap();
        assert_eq!(
            board.statuses(),
            vec![("9001".to_string(), "Approved".to_string())]
        );
    }

    #[tokio::test]
    async fn test_board_decision_skips_write_back() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 75.0);
        let board = crate::board::MockBoard::new();
        db.create_board_linkage(id, "board-1", "9001").unwrap();

        let wallet = MockWallet::new();
        let engine = ApprovalEngine::new(
            db.clone(),
            Some(WalletClient::Mock(wallet)),
            Some(BoardClient::Mock(board.clone())),
        );

        engine.approve(id, BOARD_ACTOR).await.unwrap();
        assert!(board.statuses().is_empty());
    }
}
