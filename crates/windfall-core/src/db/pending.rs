//! PendingTopup operations and status transitions

use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{MatchedItem, NewPendingTopup, PendingTopup, RiskLevel, TopupStatus};

const TOPUP_COLUMNS: &str = "id, amount, currency, sender_name, bank_reference, source, \
     source_email_id, email_subject, email_from, email_preview, extracted_json, confidence, \
     risk_level, warning_text, warnings, matched_items, rule_reason, auto_approve, \
     status, credited, credit_error, reviewed_by, reviewed_at, review_note, created_at, updated_at";

fn row_to_topup(row: &Row) -> rusqlite::Result<PendingTopup> {
    let source: String = row.get(5)?;
    let risk_level: String = row.get(12)?;
    let warnings_json: Option<String> = row.get(14)?;
    let matched_json: Option<String> = row.get(15)?;
    let status: String = row.get(18)?;
    let reviewed_at: Option<String> = row.get(22)?;
    let created_at: String = row.get(24)?;
    let updated_at: String = row.get(25)?;

    let warnings: Vec<String> = warnings_json
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    let matched_items: Vec<MatchedItem> = matched_json
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    Ok(PendingTopup {
        id: row.get(0)?,
        amount: row.get(1)?,
        currency: row.get(2)?,
        sender_name: row.get(3)?,
        bank_reference: row.get(4)?,
        source: source.parse().unwrap_or_default(),
        source_email_id: row.get(6)?,
        email_subject: row.get(7)?,
        email_from: row.get(8)?,
        email_preview: row.get(9)?,
        extracted_json: row.get(10)?,
        confidence: row.get(11)?,
        risk_level: risk_level.parse().unwrap_or(RiskLevel::Clear),
        warning_text: row.get(13)?,
        warnings,
        matched_items,
        rule_reason: row.get(16)?,
        auto_approve: row.get(17)?,
        status: status.parse().unwrap_or(TopupStatus::Pending),
        credited: row.get(19)?,
        credit_error: row.get(20)?,
        reviewed_by: row.get(21)?,
        reviewed_at: reviewed_at.map(|s| parse_datetime(&s)),
        review_note: row.get(23)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

impl Database {
    /// Insert a new pending topup in status `pending`
    pub fn create_pending_topup(&self, new: &NewPendingTopup) -> Result<i64> {
        if new.amount <= 0.0 {
            return Err(Error::InvalidData(format!(
                "Topup amount must be positive, got {}",
                new.amount
            )));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO pending_topups (
                amount, currency, sender_name, bank_reference, source, source_email_id,
                email_subject, email_from, email_preview, extracted_json, confidence,
                risk_level, warning_text, warnings, matched_items, rule_reason, auto_approve
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                new.amount,
                new.currency,
                new.sender_name,
                new.bank_reference,
                new.source.as_str(),
                new.source_email_id,
                new.email_subject,
                new.email_from,
                new.email_preview,
                new.extracted_json,
                new.confidence,
                new.risk_level.as_str(),
                new.warning_text,
                serde_json::to_string(&new.warnings)?,
                serde_json::to_string(&new.matched_items)?,
                new.rule_reason,
                new.auto_approve,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch one pending topup by id
    pub fn get_pending_topup(&self, id: i64) -> Result<Option<PendingTopup>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_topups WHERE id = ?",
            TOPUP_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], row_to_topup)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// List topups, newest first, optionally filtered by status
    pub fn list_pending_topups(
        &self,
        status: Option<TopupStatus>,
        limit: i64,
    ) -> Result<Vec<PendingTopup>> {
        let conn = self.conn()?;
        let mut results = Vec::new();

        match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM pending_topups WHERE status = ? ORDER BY created_at DESC, id DESC LIMIT ?",
                    TOPUP_COLUMNS
                ))?;
                let rows = stmt.query_map(params![status.as_str(), limit], row_to_topup)?;
                for row in rows {
                    results.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM pending_topups ORDER BY created_at DESC, id DESC LIMIT ?",
                    TOPUP_COLUMNS
                ))?;
                let rows = stmt.query_map(params![limit], row_to_topup)?;
                for row in rows {
                    results.push(row?);
                }
            }
        }

        Ok(results)
    }

    /// Atomically move a topup out of `pending`
    ///
    /// The current-status check and the write are a single guarded UPDATE, so
    /// concurrent duplicate deliveries race safely: exactly one wins. Returns
    /// false when the item was no longer `pending`.
    pub fn try_transition(
        &self,
        id: i64,
        to: TopupStatus,
        actor: &str,
        note: Option<&str>,
    ) -> Result<bool> {
        if !TopupStatus::Pending.can_transition_to(to) {
            return Err(Error::StateConflict(format!(
                "Illegal transition target: {}",
                to
            )));
        }

        let conn = self.conn()?;
        let affected = conn.execute(
            r#"
            UPDATE pending_topups
            SET status = ?, reviewed_by = ?, reviewed_at = CURRENT_TIMESTAMP,
                review_note = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = 'pending'
            "#,
            params![to.as_str(), actor, note, id],
        )?;
        Ok(affected == 1)
    }

    /// Mark an approved topup as credited and clear any recorded credit error
    ///
    /// Guarded on `status = 'approved'` so a stray call can never credit a
    /// pending or rejected item. Returns false if the guard did not match.
    pub fn mark_credited(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            r#"
            UPDATE pending_topups
            SET credited = 1, credit_error = NULL, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = 'approved' AND credited = 0
            "#,
            params![id],
        )?;
        Ok(affected == 1)
    }

    /// Record a wallet credit failure on an approved topup
    pub fn set_credit_error(&self, id: i64, error: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE pending_topups
            SET credit_error = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = 'approved'
            "#,
            params![error, id],
        )?;
        Ok(())
    }

    /// Items whose non-empty bank reference exactly matches, still pending or approved
    ///
    /// Dedup layer 1 query.
    pub fn find_by_bank_reference(&self, reference: &str) -> Result<Vec<PendingTopup>> {
        if reference.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_topups \
             WHERE bank_reference = ? AND status IN ('pending', 'approved') \
             ORDER BY created_at DESC",
            TOPUP_COLUMNS
        ))?;
        let rows = stmt.query_map(params![reference], row_to_topup)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Items with the same amount created within the last `hours` hours
    ///
    /// Dedup layers 2 and 3 query. Amounts match within half a cent to dodge
    /// REAL-column float drift.
    pub fn find_recent_amount_matches(&self, amount: f64, hours: i64) -> Result<Vec<PendingTopup>> {
        let conn = self.conn()?;
        let modifier = format!("-{} hours", hours);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_topups \
             WHERE ABS(amount - ?) < 0.005 AND created_at >= datetime('now', ?) \
             ORDER BY created_at DESC",
            TOPUP_COLUMNS
        ))?;
        let rows = stmt.query_map(params![amount, modifier], row_to_topup)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Topup counts grouped by status
    pub fn count_topups_by_status(&self) -> Result<Vec<(TopupStatus, i64)>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM pending_topups GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (status, count) = row?;
            if let Ok(status) = status.parse::<TopupStatus>() {
                results.push((status, count));
            }
        }
        Ok(results)
    }

    /// Count topups created from a given source email id
    pub fn count_topups_for_email(&self, email_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM pending_topups WHERE source_email_id = ?",
            params![email_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
