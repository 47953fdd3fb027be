//! RuleSet singleton operations

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::RuleSet;

impl Database {
    /// Load the operator rule set, falling back to defaults when unset
    pub fn get_rule_set(&self) -> Result<RuleSet> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT sender_whitelist, must_contain_keywords, must_not_contain_keywords, \
             amount_max_threshold, amount_auto_approve_threshold, enabled, updated_at \
             FROM rule_sets WHERE id = 1",
        )?;
        let mut rows = stmt.query_map([], |row| {
            let whitelist: String = row.get(0)?;
            let must_contain: String = row.get(1)?;
            let must_not_contain: String = row.get(2)?;
            let updated_at: String = row.get(6)?;
            Ok(RuleSet {
                sender_whitelist: serde_json::from_str(&whitelist).unwrap_or_default(),
                must_contain_keywords: serde_json::from_str(&must_contain).unwrap_or_default(),
                must_not_contain_keywords: serde_json::from_str(&must_not_contain)
                    .unwrap_or_default(),
                amount_max_threshold: row.get(3)?,
                amount_auto_approve_threshold: row.get(4)?,
                enabled: row.get(5)?,
                updated_at: parse_datetime(&updated_at),
            })
        })?;

        match rows.next() {
            Some(row) => Ok(row?),
            None => Ok(RuleSet::default()),
        }
    }

    /// Replace the operator rule set
    pub fn update_rule_set(&self, rules: &RuleSet) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO rule_sets (
                id, sender_whitelist, must_contain_keywords, must_not_contain_keywords,
                amount_max_threshold, amount_auto_approve_threshold, enabled, updated_at
            ) VALUES (1, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                sender_whitelist = excluded.sender_whitelist,
                must_contain_keywords = excluded.must_contain_keywords,
                must_not_contain_keywords = excluded.must_not_contain_keywords,
                amount_max_threshold = excluded.amount_max_threshold,
                amount_auto_approve_threshold = excluded.amount_auto_approve_threshold,
                enabled = excluded.enabled,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                serde_json::to_string(&rules.sender_whitelist)?,
                serde_json::to_string(&rules.must_contain_keywords)?,
                serde_json::to_string(&rules.must_not_contain_keywords)?,
                rules.amount_max_threshold,
                rules.amount_auto_approve_threshold,
                rules.enabled,
            ],
        )?;
        Ok(())
    }
}
