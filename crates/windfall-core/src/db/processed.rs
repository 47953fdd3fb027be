//! Processed-email markers for idempotent ingestion

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{ProcessedEmail, ProcessedOutcome};

impl Database {
    /// Whether an email id has already been examined
    pub fn is_email_processed(&self, email_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM processed_emails WHERE email_id = ?",
            params![email_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Record the terminal outcome for an examined email id
    ///
    /// Markers are written once and never mutated. The UNIQUE constraint on
    /// email_id makes a racing second writer a no-op, which keeps re-polling
    /// idempotent even without an up-front existence check.
    pub fn mark_email_processed(
        &self,
        email_id: &str,
        outcome: ProcessedOutcome,
        topup_id: Option<i64>,
        detail: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR IGNORE INTO processed_emails (email_id, outcome, topup_id, detail)
            VALUES (?, ?, ?, ?)
            "#,
            params![email_id, outcome.as_str(), topup_id, detail],
        )?;
        Ok(())
    }

    /// List recent markers, newest first
    pub fn list_processed_emails(&self, limit: i64) -> Result<Vec<ProcessedEmail>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, email_id, outcome, topup_id, detail, created_at \
             FROM processed_emails ORDER BY id DESC LIMIT ?",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            let outcome: String = row.get(2)?;
            let created_at: String = row.get(5)?;
            Ok(ProcessedEmail {
                id: row.get(0)?,
                email_id: row.get(1)?,
                outcome: outcome
                    .parse()
                    .unwrap_or(ProcessedOutcome::SkippedNotTransaction),
                topup_id: row.get(3)?,
                detail: row.get(4)?,
                created_at: parse_datetime(&created_at),
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
