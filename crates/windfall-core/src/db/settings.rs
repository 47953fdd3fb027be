//! Poller settings singleton operations

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{PollerSettings, PollingMode};

impl Database {
    /// Load poller settings, falling back to defaults when unset
    pub fn get_poller_settings(&self) -> Result<PollerSettings> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT enabled, polling_mode, polling_interval_minutes, fetch_count, \
             last_auto_scan, last_scan_created, updated_at \
             FROM poller_settings WHERE id = 1",
        )?;
        let mut rows = stmt.query_map([], |row| {
            let mode: String = row.get(1)?;
            let last_auto_scan: Option<String> = row.get(4)?;
            let updated_at: String = row.get(6)?;
            Ok(PollerSettings {
                enabled: row.get(0)?,
                polling_mode: mode.parse().unwrap_or(PollingMode::Realtime),
                polling_interval_minutes: row.get(2)?,
                fetch_count: row.get(3)?,
                last_auto_scan: last_auto_scan.map(|s| parse_datetime(&s)),
                last_scan_created: row.get(5)?,
                updated_at: parse_datetime(&updated_at),
            })
        })?;

        match rows.next() {
            Some(row) => Ok(row?),
            None => Ok(PollerSettings::default()),
        }
    }

    /// Replace the operator-editable poller settings
    ///
    /// Scan bookkeeping (`last_auto_scan`, `last_scan_created`) is written by
    /// `record_scan_result`, not here.
    pub fn update_poller_settings(&self, settings: &PollerSettings) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO poller_settings (
                id, enabled, polling_mode, polling_interval_minutes, fetch_count, updated_at
            ) VALUES (1, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                enabled = excluded.enabled,
                polling_mode = excluded.polling_mode,
                polling_interval_minutes = excluded.polling_interval_minutes,
                fetch_count = excluded.fetch_count,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                settings.enabled,
                settings.polling_mode.as_str(),
                settings.polling_interval_minutes.max(1),
                settings.fetch_count.max(1),
            ],
        )?;
        Ok(())
    }

    /// Record the completion of one scan cycle
    pub fn record_scan_result(&self, created: i64) -> Result<()> {
        let conn = self.conn()?;
        // The singleton row may not exist yet when a manual scan runs first
        conn.execute(
            "INSERT OR IGNORE INTO poller_settings (id) VALUES (1)",
            [],
        )?;
        conn.execute(
            r#"
            UPDATE poller_settings
            SET last_auto_scan = CURRENT_TIMESTAMP, last_scan_created = ?
            WHERE id = 1
            "#,
            params![created],
        )?;
        Ok(())
    }
}
