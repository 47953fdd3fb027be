//! Webhook audit log command

use anyhow::Result;

use windfall_core::db::Database;

pub fn cmd_audit(db: &Database, limit: i64) -> Result<()> {
    let entries = db.list_webhook_audit(limit.max(1))?;
    if entries.is_empty() {
        println!("No webhook events recorded.");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {:<10}  {}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.outcome,
            &entry.payload_digest[..12.min(entry.payload_digest.len())],
            entry.detail.as_deref().unwrap_or(""),
        );
    }

    Ok(())
}
