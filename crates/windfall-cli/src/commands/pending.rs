//! Pending topup commands

use anyhow::{bail, Result};

use windfall_core::approval::{ApprovalEngine, ApprovalOutcome};
use windfall_core::board::BoardClient;
use windfall_core::db::Database;
use windfall_core::models::{PendingTopup, TopupStatus};
use windfall_core::wallet::WalletClient;

use super::operator_actor;

fn engine(db: &Database) -> ApprovalEngine {
    ApprovalEngine::new(db.clone(), WalletClient::from_env(), BoardClient::from_env())
}

fn credit_state(topup: &PendingTopup) -> &'static str {
    if topup.credited {
        "credited"
    } else if topup.credit_error.is_some() {
        "credit FAILED"
    } else {
        "not credited"
    }
}

pub fn cmd_pending_list(db: &Database, status: Option<&str>, limit: i64) -> Result<()> {
    let status = status
        .map(|s| s.parse::<TopupStatus>().map_err(anyhow::Error::msg))
        .transpose()?;

    let topups = db.list_pending_topups(status, limit.max(1))?;
    if topups.is_empty() {
        println!("No topups.");
        return Ok(());
    }

    println!(
        "{:>5}  {:>10}  {:<20}  {:<12}  {:<20}  {}",
        "ID", "AMOUNT", "SENDER", "STATUS", "RISK", "CREATED"
    );
    for topup in &topups {
        let status = if topup.status == TopupStatus::Approved && topup.credited {
            "credited".to_string()
        } else {
            topup.status.to_string()
        };
        println!(
            "{:>5}  {:>10.2}  {:<20}  {:<12}  {:<20}  {}",
            topup.id,
            topup.amount,
            truncate(&topup.sender_name, 20),
            status,
            topup.risk_level,
            topup.created_at.format("%Y-%m-%d %H:%M"),
        );
    }

    Ok(())
}

pub fn cmd_pending_show(db: &Database, id: i64) -> Result<()> {
    let Some(topup) = db.get_pending_topup(id)? else {
        bail!("Topup {} not found", id);
    };

    println!("Topup #{}", topup.id);
    println!("  amount:       {:.2} {}", topup.amount, topup.currency);
    println!("  sender:       {}", topup.sender_name);
    println!(
        "  reference:    {}",
        if topup.bank_reference.is_empty() {
            "(none)"
        } else {
            &topup.bank_reference
        }
    );
    println!("  source:       {}", topup.source);
    println!("  status:       {} ({})", topup.status, credit_state(&topup));
    if let Some(ref error) = topup.credit_error {
        println!("  credit error: {}", error);
    }
    println!("  risk:         {}", topup.risk_level);
    if let Some(ref warning) = topup.warning_text {
        println!("  warning:      {}", warning);
    }
    for warning in &topup.warnings {
        println!("    - {}", warning);
    }
    if let Some(ref reason) = topup.rule_reason {
        println!("  rules:        {} (auto-approve: {})", reason, topup.auto_approve);
    }
    if let Some(confidence) = topup.confidence {
        println!("  confidence:   {}", confidence);
    }
    if let Some(ref subject) = topup.email_subject {
        println!("  email:        {}", subject);
    }
    if let Some(ref reviewer) = topup.reviewed_by {
        let when = topup
            .reviewed_at
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        println!("  reviewed by:  {} at {}", reviewer, when);
    }
    if let Some(ref note) = topup.review_note {
        println!("  review note:  {}", note);
    }
    if let Some(linkage) = db.get_linkage_for_topup(id)? {
        println!(
            "  board item:   {} (board {})",
            linkage.board_item_id, linkage.board_id
        );
    }
    println!("  created:      {}", topup.created_at.format("%Y-%m-%d %H:%M:%S UTC"));

    Ok(())
}

pub async fn cmd_pending_approve(db: &Database, id: i64) -> Result<()> {
    let outcome = engine(db).approve(id, &operator_actor()).await?;
    match outcome {
        ApprovalOutcome::Approved {
            credited: true, ..
        } => println!("Topup {} approved and credited.", id),
        ApprovalOutcome::Approved {
            credited: false,
            credit_error,
        } => {
            println!("Topup {} approved but the credit FAILED:", id);
            println!("  {}", credit_error.unwrap_or_default());
            println!("Fix the wallet and run: windfall pending retry-credit {}", id);
        }
        ApprovalOutcome::Ignored { status } => {
            println!("Ignored - topup {} is already {}.", id, status)
        }
        ApprovalOutcome::Rejected => unreachable!("approve cannot reject"),
    }
    Ok(())
}

pub async fn cmd_pending_reject(db: &Database, id: i64, reason: Option<&str>) -> Result<()> {
    let outcome = engine(db).reject(id, &operator_actor(), reason).await?;
    match outcome {
        ApprovalOutcome::Rejected => println!("Topup {} rejected.", id),
        ApprovalOutcome::Ignored { status } => {
            println!("Ignored - topup {} is already {}.", id, status)
        }
        ApprovalOutcome::Approved { .. } => unreachable!("reject cannot approve"),
    }
    Ok(())
}

pub async fn cmd_pending_retry_credit(db: &Database, id: i64) -> Result<()> {
    let (credited, credit_error) = engine(db).retry_credit(id).await?;
    if credited {
        println!("Topup {} credited.", id);
    } else {
        println!(
            "Credit still failing for topup {}: {}",
            id,
            credit_error.unwrap_or_default()
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
