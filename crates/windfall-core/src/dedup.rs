//! Four-layer duplicate detection
//!
//! Layers run strict to fuzzy and the first hit wins:
//! 1. exact non-empty bank reference on a pending/approved item => duplicate
//! 2. same amount within 24h with a sender-name substring match => potential_duplicate
//! 3. same amount within 2 hours, any sender => low_risk
//! 4. nothing => clear
//!
//! The classification never blocks creation - it annotates the new item for
//! downstream human/board review.

use crate::ai::ExtractedTransaction;
use crate::db::Database;
use crate::error::Result;
use crate::models::{DedupReport, MatchedItem, PendingTopup, RiskLevel};

/// Window for the amount+sender fingerprint layer
const FINGERPRINT_WINDOW_HOURS: i64 = 24;

/// Window for the amount-only layer
const AMOUNT_ONLY_WINDOW_HOURS: i64 = 2;

/// Dedup engine over previously staged items
pub struct DedupEngine<'a> {
    db: &'a Database,
}

impl<'a> DedupEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Classify a candidate against recent history
    pub fn classify(&self, candidate: &ExtractedTransaction) -> Result<DedupReport> {
        // Layer 1: exact bank reference
        if !candidate.bank_reference.is_empty() {
            let matches = self.db.find_by_bank_reference(&candidate.bank_reference)?;
            if !matches.is_empty() {
                return Ok(report(
                    RiskLevel::Duplicate,
                    format!(
                        "Bank reference '{}' already present on {} existing item(s)",
                        candidate.bank_reference,
                        matches.len()
                    ),
                    &matches,
                ));
            }
        }

        // Layer 2: amount + sender fingerprint within 24h
        let recent = self
            .db
            .find_recent_amount_matches(candidate.amount, FINGERPRINT_WINDOW_HOURS)?;
        let fingerprint_matches: Vec<PendingTopup> = recent
            .into_iter()
            .filter(|item| senders_overlap(&item.sender_name, &candidate.sender_name))
            .collect();
        if !fingerprint_matches.is_empty() {
            return Ok(report(
                RiskLevel::PotentialDuplicate,
                format!(
                    "Same amount {:.2} from a matching sender within the last {}h",
                    candidate.amount, FINGERPRINT_WINDOW_HOURS
                ),
                &fingerprint_matches,
            ));
        }

        // Layer 3: amount-only within 2 hours
        let very_recent = self
            .db
            .find_recent_amount_matches(candidate.amount, AMOUNT_ONLY_WINDOW_HOURS)?;
        if !very_recent.is_empty() {
            return Ok(report(
                RiskLevel::LowRisk,
                format!(
                    "Same amount {:.2} seen within the last {}h",
                    candidate.amount, AMOUNT_ONLY_WINDOW_HOURS
                ),
                &very_recent,
            ));
        }

        Ok(DedupReport::default())
    }
}

/// Case-insensitive substring match in either direction
///
/// Both names must be non-empty; an empty name is a substring of everything
/// and would flag every same-amount item.
fn senders_overlap(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a.contains(&b) || b.contains(&a)
}

fn report(risk_level: RiskLevel, warning_text: String, matches: &[PendingTopup]) -> DedupReport {
    let matched_items: Vec<MatchedItem> = matches
        .iter()
        .map(|item| MatchedItem {
            id: item.id,
            amount: item.amount,
            sender: item.sender_name.clone(),
            status: item.status,
            date: item.created_at,
        })
        .collect();

    let warnings = matched_items
        .iter()
        .map(|item| {
            format!(
                "Item #{}: {:.2} from '{}' ({}, {})",
                item.id,
                item.amount,
                item.sender,
                item.status,
                item.date.format("%Y-%m-%d %H:%M")
            )
        })
        .collect();

    DedupReport {
        risk_level,
        warning_text: Some(warning_text),
        warnings,
        matched_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPendingTopup, TopupStatus};
    use rusqlite::params;

    fn candidate(amount: f64, sender: &str, reference: &str) -> ExtractedTransaction {
        ExtractedTransaction {
            amount,
            sender_name: sender.to_string(),
            bank_reference: reference.to_string(),
            confidence: 85,
            ..Default::default()
        }
    }

    fn staged(db: &Database, amount: f64, sender: &str, reference: &str) -> i64 {
        db.create_pending_topup(&NewPendingTopup {
            amount,
            currency: "USD".to_string(),
            sender_name: sender.to_string(),
            bank_reference: reference.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    /// Shift an item's created_at into the past
    fn age_item(db: &Database, id: i64, hours: i64) {
        let conn = db.conn().unwrap();
        conn.execute(
            "UPDATE pending_topups SET created_at = datetime('now', ?) WHERE id = ?",
            params![format!("-{} hours", hours), id],
        )
        .unwrap();
    }

    #[test]
    fn test_clear_when_history_empty() {
        let db = Database::in_memory().unwrap();
        let report = DedupEngine::new(&db)
            .classify(&candidate(75.0, "Jane Doe", "TX998"))
            .unwrap();
        assert_eq!(report.risk_level, RiskLevel::Clear);
        assert!(report.warning_text.is_none());
        assert!(report.matched_items.is_empty());
    }

    #[test]
    fn test_exact_reference_is_duplicate() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 75.0, "Jane Doe", "TX998");

        let report = DedupEngine::new(&db)
            .classify(&candidate(75.0, "Jane Doe", "TX998"))
            .unwrap();
        assert_eq!(report.risk_level, RiskLevel::Duplicate);
        assert_eq!(report.matched_items.len(), 1);
        assert_eq!(report.matched_items[0].id, id);
        assert_eq!(report.matched_items[0].status, TopupStatus::Pending);
    }

    #[test]
    fn test_reference_layer_wins_over_fingerprint() {
        // Amount and sender also satisfy layers 2/3, but layer 1 is checked first
        let db = Database::in_memory().unwrap();
        staged(&db, 75.0, "Jane Doe", "TX998");

        let report = DedupEngine::new(&db)
            .classify(&candidate(75.0, "Jane Doe", "TX998"))
            .unwrap();
        assert_eq!(report.risk_level, RiskLevel::Duplicate);
    }

    #[test]
    fn test_empty_reference_never_matches_layer_one() {
        let db = Database::in_memory().unwrap();
        staged(&db, 75.0, "Jane Doe", "");

        let report = DedupEngine::new(&db)
            .classify(&candidate(200.0, "Someone Else", ""))
            .unwrap();
        assert_eq!(report.risk_level, RiskLevel::Clear);
    }

    #[test]
    fn test_rejected_items_do_not_trigger_reference_layer() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 75.0, "Jane Doe", "TX998");
        assert!(db
            .try_transition(id, TopupStatus::Rejected, "tester", None)
            .unwrap());

        let report = DedupEngine::new(&db)
            .classify(&candidate(75.0, "Other Sender", "TX998"))
            .unwrap();
        assert_ne!(report.risk_level, RiskLevel::Duplicate);
    }

    #[test]
    fn test_amount_and_sender_within_24h_is_potential_duplicate() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 120.0, "ACME Corporation", "");
        age_item(&db, id, 10);

        // Sender substring in either direction
        let report = DedupEngine::new(&db)
            .classify(&candidate(120.0, "acme", ""))
            .unwrap();
        assert_eq!(report.risk_level, RiskLevel::PotentialDuplicate);
        assert_eq!(report.matched_items[0].id, id);
    }

    #[test]
    fn test_fingerprint_expires_after_24h() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 120.0, "ACME Corporation", "");
        age_item(&db, id, 30);

        let report = DedupEngine::new(&db)
            .classify(&candidate(120.0, "ACME Corporation", ""))
            .unwrap();
        assert_eq!(report.risk_level, RiskLevel::Clear);
    }

    #[test]
    fn test_amount_only_within_2h_is_low_risk() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 50.0, "Jane Doe", "");
        age_item(&db, id, 1);

        // Different sender, same amount, recent
        let report = DedupEngine::new(&db)
            .classify(&candidate(50.0, "Completely Unrelated", ""))
            .unwrap();
        assert_eq!(report.risk_level, RiskLevel::LowRisk);
    }

    #[test]
    fn test_amount_only_expires_after_2h() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 50.0, "Jane Doe", "");
        age_item(&db, id, 3);

        let report = DedupEngine::new(&db)
            .classify(&candidate(50.0, "Completely Unrelated", ""))
            .unwrap();
        assert_eq!(report.risk_level, RiskLevel::Clear);
    }

    #[test]
    fn test_empty_sender_does_not_fingerprint() {
        let db = Database::in_memory().unwrap();
        let id = staged(&db, 75.0, "", "");
        age_item(&db, id, 10);

        let report = DedupEngine::new(&db)
            .classify(&candidate(75.0, "Jane Doe", ""))
            .unwrap();
        // No sender overlap and older than 2h, so neither layer 2 nor 3 fires
        assert_eq!(report.risk_level, RiskLevel::Clear);
    }
}
