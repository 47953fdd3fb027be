//! Poller settings commands

use anyhow::Result;

use windfall_core::db::Database;
use windfall_core::models::PollingMode;

pub fn cmd_poller_show(db: &Database) -> Result<()> {
    let settings = db.get_poller_settings()?;

    println!("Poller settings:");
    println!("  enabled:     {}", settings.enabled);
    println!("  mode:        {}", settings.polling_mode);
    println!("  interval:    {} min", settings.polling_interval_minutes);
    println!("  fetch count: {}", settings.fetch_count);
    match settings.last_auto_scan {
        Some(ts) => println!(
            "  last scan:   {} ({} created)",
            ts.format("%Y-%m-%d %H:%M:%S UTC"),
            settings.last_scan_created
        ),
        None => println!("  last scan:   never"),
    }

    Ok(())
}

pub fn cmd_poller_enabled(db: &Database, enabled: bool) -> Result<()> {
    let mut settings = db.get_poller_settings()?;
    settings.enabled = enabled;
    db.update_poller_settings(&settings)?;
    println!(
        "Automated polling {}. A running poller picks this up within one cycle.",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub fn cmd_poller_interval(db: &Database, minutes: i64) -> Result<()> {
    anyhow::ensure!(minutes >= 1, "interval must be >= 1 minute");
    let mut settings = db.get_poller_settings()?;
    settings.polling_interval_minutes = minutes;
    db.update_poller_settings(&settings)?;
    println!("Polling interval set to {} min.", minutes);
    Ok(())
}

pub fn cmd_poller_mode(db: &Database, mode: &str) -> Result<()> {
    let mode: PollingMode = mode.parse().map_err(anyhow::Error::msg)?;
    let mut settings = db.get_poller_settings()?;
    settings.polling_mode = mode;
    db.update_poller_settings(&settings)?;
    println!("Polling mode set to {}.", mode);
    Ok(())
}

pub fn cmd_poller_fetch_count(db: &Database, count: i64) -> Result<()> {
    anyhow::ensure!(count >= 1, "fetch count must be >= 1");
    let mut settings = db.get_poller_settings()?;
    settings.fetch_count = count;
    db.update_poller_settings(&settings)?;
    println!("Fetch count set to {}.", count);
    Ok(())
}
