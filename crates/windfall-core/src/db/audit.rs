//! Append-only webhook audit log

use rusqlite::params;
use sha2::{Digest, Sha256};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{WebhookAuditEntry, WebhookOutcome};

/// Hex SHA-256 digest of a raw webhook payload
pub fn payload_digest(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

impl Database {
    /// Append one inbound webhook event to the audit log
    pub fn log_webhook_event(
        &self,
        payload: &[u8],
        outcome: WebhookOutcome,
        detail: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO webhook_audit_log (payload_digest, outcome, detail) VALUES (?, ?, ?)",
            params![payload_digest(payload), outcome.as_str(), detail],
        )?;
        Ok(())
    }

    /// List audit entries, newest first
    pub fn list_webhook_audit(&self, limit: i64) -> Result<Vec<WebhookAuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, payload_digest, outcome, detail \
             FROM webhook_audit_log ORDER BY id DESC LIMIT ?",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            let timestamp: String = row.get(1)?;
            Ok(WebhookAuditEntry {
                id: row.get(0)?,
                timestamp: parse_datetime(&timestamp),
                payload_digest: row.get(2)?,
                outcome: row.get(3)?,
                detail: row.get(4)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
