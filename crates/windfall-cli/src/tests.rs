//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use windfall_core::db::Database;
use windfall_core::models::{NewPendingTopup, TopupStatus};

use crate::commands;

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn create_test_topup(db: &Database, amount: f64, sender: &str) -> i64 {
    db.create_pending_topup(&NewPendingTopup {
        amount,
        currency: "USD".to_string(),
        sender_name: sender.to_string(),
        ..Default::default()
    })
    .unwrap()
}

// ========== Pending Command Tests ==========

#[test]
fn test_cmd_pending_list_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_pending_list(&db, None, 20).is_ok());
}

#[test]
fn test_cmd_pending_list_with_filter() {
    let db = setup_test_db();
    create_test_topup(&db, 10.0, "Jane Doe");
    assert!(commands::cmd_pending_list(&db, Some("pending"), 20).is_ok());
    assert!(commands::cmd_pending_list(&db, Some("nonsense"), 20).is_err());
}

#[test]
fn test_cmd_pending_show() {
    let db = setup_test_db();
    let id = create_test_topup(&db, 42.0, "ACME Corp");
    assert!(commands::cmd_pending_show(&db, id).is_ok());
    assert!(commands::cmd_pending_show(&db, 999).is_err());
}

#[tokio::test]
async fn test_cmd_pending_approve_and_reject() {
    let db = setup_test_db();
    let a = create_test_topup(&db, 10.0, "A");
    let b = create_test_topup(&db, 20.0, "B");

    // No wallet configured in tests: approval succeeds, credit error recorded
    assert!(commands::cmd_pending_approve(&db, a).await.is_ok());
    let topup = db.get_pending_topup(a).unwrap().unwrap();
    assert_eq!(topup.status, TopupStatus::Approved);
    assert!(topup.reviewed_by.as_deref().unwrap_or("").starts_with("cli"));

    assert!(commands::cmd_pending_reject(&db, b, Some("bad")).await.is_ok());
    let topup = db.get_pending_topup(b).unwrap().unwrap();
    assert_eq!(topup.status, TopupStatus::Rejected);
    assert_eq!(topup.review_note.as_deref(), Some("bad"));

    // Deciding again is an ignored no-op, not an error
    assert!(commands::cmd_pending_approve(&db, b).await.is_ok());
    let topup = db.get_pending_topup(b).unwrap().unwrap();
    assert_eq!(topup.status, TopupStatus::Rejected);
}

// ========== Rules Command Tests ==========

#[test]
fn test_cmd_rules_set_and_show() {
    let db = setup_test_db();

    assert!(commands::cmd_rules_set(
        &db,
        Some("acme, bank"),
        Some("received"),
        None,
        Some(500.0),
        None,
    )
    .is_ok());

    let rules = db.get_rule_set().unwrap();
    assert_eq!(rules.sender_whitelist, vec!["acme", "bank"]);
    assert_eq!(rules.must_contain_keywords, vec!["received"]);
    assert_eq!(rules.amount_max_threshold, 500.0);
    // Unset fields keep their value
    assert!(rules.must_not_contain_keywords.is_empty());

    assert!(commands::cmd_rules_show(&db).is_ok());
}

#[test]
fn test_cmd_rules_clear_list_with_empty_string() {
    let db = setup_test_db();
    commands::cmd_rules_set(&db, Some("acme"), None, None, None, None).unwrap();
    commands::cmd_rules_set(&db, Some(""), None, None, None, None).unwrap();
    assert!(db.get_rule_set().unwrap().sender_whitelist.is_empty());
}

#[test]
fn test_cmd_rules_enable_disable() {
    let db = setup_test_db();
    commands::cmd_rules_enabled(&db, false).unwrap();
    assert!(!db.get_rule_set().unwrap().enabled);
    commands::cmd_rules_enabled(&db, true).unwrap();
    assert!(db.get_rule_set().unwrap().enabled);
}

// ========== Poller Command Tests ==========

#[test]
fn test_cmd_poller_settings() {
    let db = setup_test_db();

    commands::cmd_poller_enabled(&db, true).unwrap();
    commands::cmd_poller_interval(&db, 15).unwrap();
    commands::cmd_poller_fetch_count(&db, 50).unwrap();
    commands::cmd_poller_mode(&db, "manual").unwrap();

    let settings = db.get_poller_settings().unwrap();
    assert!(settings.enabled);
    assert_eq!(settings.polling_interval_minutes, 15);
    assert_eq!(settings.fetch_count, 50);
    assert!(!settings.automated());

    assert!(commands::cmd_poller_interval(&db, 0).is_err());
    assert!(commands::cmd_poller_mode(&db, "warp-speed").is_err());
    assert!(commands::cmd_poller_show(&db).is_ok());
}

// ========== Audit Command Tests ==========

#[test]
fn test_cmd_audit() {
    let db = setup_test_db();
    assert!(commands::cmd_audit(&db, 20).is_ok());

    db.log_webhook_event(
        b"{\"challenge\":\"x\"}",
        windfall_core::models::WebhookOutcome::Challenge,
        None,
    )
    .unwrap();
    assert!(commands::cmd_audit(&db, 20).is_ok());
}
