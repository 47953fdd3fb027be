//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Show pipeline status
//! - `operator_actor` - Actor string recorded for CLI decisions

use std::path::Path;

use anyhow::{Context, Result};
use windfall_core::ai::{ExtractorBackend, ExtractorClient};
use windfall_core::db::Database;
use windfall_core::models::TopupStatus;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path.to_str().context("Invalid database path")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Actor recorded for decisions made from this terminal
pub fn operator_actor() -> String {
    match std::env::var("USER") {
        Ok(user) if !user.is_empty() => format!("cli:{}", user),
        _ => "cli".to_string(),
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("Initializing database at {}...", db_path.display());

    let _db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("  Encryption: ENABLED");
    }

    println!("Database initialized.");
    println!();
    println!("Next steps:");
    println!("  1. Configure the extractor: export OLLAMA_HOST=http://localhost:11434");
    println!("  2. Configure the mailbox:  export GMAIL_API_TOKEN=...");
    println!("  3. Enable polling:         windfall poller enable");
    println!("  4. Start the server:       windfall serve");

    Ok(())
}

pub async fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    println!("Topups:");
    let counts = db.count_topups_by_status()?;
    if counts.is_empty() {
        println!("  (none)");
    }
    for (status, count) in &counts {
        println!("  {:<10} {}", format!("{}:", status), count);
    }
    let credited: i64 = db
        .list_pending_topups(Some(TopupStatus::Approved), 1000)?
        .iter()
        .filter(|t| t.credited)
        .count() as i64;
    println!("  credited:  {}", credited);

    let settings = db.get_poller_settings()?;
    println!();
    println!("Poller:");
    println!("  enabled:   {}", settings.enabled);
    println!("  mode:      {}", settings.polling_mode);
    println!("  interval:  {} min", settings.polling_interval_minutes);
    match settings.last_auto_scan {
        Some(ts) => println!(
            "  last scan: {} ({} created)",
            ts.format("%Y-%m-%d %H:%M:%S UTC"),
            settings.last_scan_created
        ),
        None => println!("  last scan: never"),
    }

    let rules = db.get_rule_set()?;
    println!();
    println!("Rules:");
    println!("  enabled:      {}", rules.enabled);
    println!("  max amount:   {}", threshold_display(rules.amount_max_threshold));
    println!(
        "  auto-approve: {}",
        threshold_display(rules.amount_auto_approve_threshold)
    );

    println!();
    match ExtractorClient::from_env() {
        Some(client) => {
            if client.health_check().await {
                println!(
                    "Extractor: {} (model {}) - reachable",
                    client.host(),
                    client.model()
                );
            } else {
                println!(
                    "Extractor: {} (model {}) - NOT RESPONDING",
                    client.host(),
                    client.model()
                );
            }
        }
        None => println!("Extractor: not configured (set OLLAMA_HOST)"),
    }

    Ok(())
}

fn threshold_display(value: f64) -> String {
    if value > 0.0 {
        format!("{:.2}", value)
    } else {
        "off".to_string()
    }
}
