//! Inbound board webhook
//!
//! The board retries any non-2xx delivery, so every domain-level outcome -
//! success, ignored, error - returns HTTP 200 once it has been recorded in
//! the audit log. Only a transport failure should look like a failure to the
//! board.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use serde_json::{json, Value};
use tracing::warn;

use windfall_core::approval::{
    classify_label, parse_status_label, ApprovalOutcome, StatusLabel, BOARD_ACTOR,
};
use windfall_core::models::WebhookOutcome;

use crate::AppState;

/// POST /webhook/board - status-change events and verification probes
pub async fn board_webhook(State(state): State<Arc<AppState>>, body: Bytes) -> Json<Value> {
    let (outcome, detail, response) = handle_event(&state, &body).await;

    if let Err(e) = state.db.log_webhook_event(&body, outcome, detail.as_deref()) {
        warn!(error = %e, "Failed to append webhook audit entry");
    }

    Json(response)
}

/// Process one raw webhook payload into (audit outcome, audit detail, response body)
async fn handle_event(state: &AppState, body: &[u8]) -> (WebhookOutcome, Option<String>, Value) {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            return (
                WebhookOutcome::Error,
                Some(format!("invalid JSON: {}", e)),
                json!({"status": "error", "detail": "invalid JSON body"}),
            );
        }
    };

    // Verification probe: echo the token verbatim, process nothing
    if let Some(challenge) = payload.get("challenge") {
        return (
            WebhookOutcome::Challenge,
            None,
            json!({"challenge": challenge}),
        );
    }

    let event = match payload.get("event") {
        Some(event) => event,
        None => {
            return (
                WebhookOutcome::Error,
                Some("missing event object".to_string()),
                json!({"status": "error", "detail": "missing event object"}),
            );
        }
    };

    // The board item id arrives as a number or a string depending on the
    // integration version
    let board_item_id = match event.get("pulseId") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => {
            return (
                WebhookOutcome::Error,
                Some("missing pulseId".to_string()),
                json!({"status": "error", "detail": "missing pulseId"}),
            );
        }
    };

    let label = match event.get("value").and_then(parse_status_label) {
        Some(label) => label,
        None => {
            let detail = format!("no status label in event for item {}", board_item_id);
            return (
                WebhookOutcome::Ignored,
                Some(detail.clone()),
                json!({"status": "ignored", "reason": detail}),
            );
        }
    };

    let linkage = match state.db.get_linkage_by_board_item(&board_item_id) {
        Ok(Some(linkage)) => linkage,
        Ok(None) => {
            let detail = format!("no linkage for board item {}", board_item_id);
            // Not retried internally; the board may retry on its own schedule
            return (
                WebhookOutcome::Error,
                Some(detail.clone()),
                json!({"status": "error", "detail": detail}),
            );
        }
        Err(e) => {
            return (
                WebhookOutcome::Error,
                Some(format!("linkage lookup failed: {}", e)),
                json!({"status": "error", "detail": "linkage lookup failed"}),
            );
        }
    };

    let result = match classify_label(&label) {
        StatusLabel::Approve => state.approval.approve(linkage.topup_id, BOARD_ACTOR).await,
        StatusLabel::Decline => {
            state
                .approval
                .reject(
                    linkage.topup_id,
                    BOARD_ACTOR,
                    Some(&format!("Declined via board ({})", label)),
                )
                .await
        }
        StatusLabel::Other(other) => {
            let detail = format!("unhandled label '{}' for topup {}", other, linkage.topup_id);
            return (
                WebhookOutcome::Ignored,
                Some(detail.clone()),
                json!({"status": "ignored", "reason": detail}),
            );
        }
    };

    match result {
        Ok(ApprovalOutcome::Approved {
            credited,
            credit_error,
        }) => {
            let detail = match credit_error {
                Some(ref e) => format!("topup {} approved, credit failed: {}", linkage.topup_id, e),
                None => format!("topup {} approved and credited", linkage.topup_id),
            };
            (
                WebhookOutcome::Success,
                Some(detail),
                json!({
                    "status": "success",
                    "topup_id": linkage.topup_id,
                    "result": "approved",
                    "credited": credited,
                    "credit_error": credit_error,
                }),
            )
        }
        Ok(ApprovalOutcome::Rejected) => (
            WebhookOutcome::Success,
            Some(format!("topup {} rejected", linkage.topup_id)),
            json!({
                "status": "success",
                "topup_id": linkage.topup_id,
                "result": "rejected",
            }),
        ),
        Ok(ApprovalOutcome::Ignored { status }) => {
            let detail = format!("topup {} already {}", linkage.topup_id, status);
            (
                WebhookOutcome::Ignored,
                Some(detail.clone()),
                json!({"status": "ignored", "reason": detail}),
            )
        }
        Err(e) => {
            let detail = format!("event handling failed for topup {}: {}", linkage.topup_id, e);
            (
                WebhookOutcome::Error,
                Some(detail),
                json!({"status": "error", "detail": "event handling failed"}),
            )
        }
    }
}
