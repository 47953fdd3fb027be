//! Rule set commands

use anyhow::Result;

use windfall_core::db::Database;

pub fn cmd_rules_show(db: &Database) -> Result<()> {
    let rules = db.get_rule_set()?;

    println!("Rule set (enabled: {}):", rules.enabled);
    println!("  sender whitelist: {}", list_display(&rules.sender_whitelist));
    println!(
        "  require keywords: {}",
        list_display(&rules.must_contain_keywords)
    );
    println!(
        "  deny keywords:    {}",
        list_display(&rules.must_not_contain_keywords)
    );
    println!(
        "  max amount:       {}",
        threshold_display(rules.amount_max_threshold)
    );
    println!(
        "  auto-approve:     {}",
        threshold_display(rules.amount_auto_approve_threshold)
    );
    println!(
        "  updated:          {}",
        rules.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    Ok(())
}

pub fn cmd_rules_set(
    db: &Database,
    whitelist: Option<&str>,
    require: Option<&str>,
    deny: Option<&str>,
    max_amount: Option<f64>,
    auto_approve: Option<f64>,
) -> Result<()> {
    let mut rules = db.get_rule_set()?;

    if let Some(raw) = whitelist {
        rules.sender_whitelist = parse_list(raw);
    }
    if let Some(raw) = require {
        rules.must_contain_keywords = parse_list(raw);
    }
    if let Some(raw) = deny {
        rules.must_not_contain_keywords = parse_list(raw);
    }
    if let Some(value) = max_amount {
        anyhow::ensure!(value >= 0.0, "max amount must be >= 0");
        rules.amount_max_threshold = value;
    }
    if let Some(value) = auto_approve {
        anyhow::ensure!(value >= 0.0, "auto-approve ceiling must be >= 0");
        rules.amount_auto_approve_threshold = value;
    }

    db.update_rule_set(&rules)?;
    println!("Rules updated.");
    cmd_rules_show(db)
}

pub fn cmd_rules_enabled(db: &Database, enabled: bool) -> Result<()> {
    let mut rules = db.get_rule_set()?;
    rules.enabled = enabled;
    db.update_rule_set(&rules)?;
    println!(
        "Rule evaluation {}.",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn list_display(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

fn threshold_display(value: f64) -> String {
    if value > 0.0 {
        format!("{:.2}", value)
    } else {
        "off".to_string()
    }
}
