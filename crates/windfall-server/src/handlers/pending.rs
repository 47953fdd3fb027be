//! Pending topup handlers (operator surface)

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use windfall_core::approval::ApprovalOutcome;
use windfall_core::dedup::DedupEngine;
use windfall_core::models::{NewPendingTopup, PendingTopup, TopupSource, TopupStatus};
use windfall_core::ExtractedTransaction;

use crate::{operator_identity, AppError, AppState, MAX_PAGE_LIMIT};

/// Query parameters for listing topups
#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/pending - list topups, newest first
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PendingQuery>,
) -> Result<Json<Vec<PendingTopup>>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(|s| {
            s.parse::<TopupStatus>()
                .map_err(|e| AppError::bad_request(&e))
        })
        .transpose()?;
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);

    let topups = state.db.list_pending_topups(status, limit)?;
    Ok(Json(topups))
}

/// GET /api/pending/:id
pub async fn get_pending(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PendingTopup>, AppError> {
    let topup = state
        .db
        .get_pending_topup(id)?
        .ok_or_else(|| AppError::not_found("Pending topup not found"))?;
    Ok(Json(topup))
}

/// Request body for manual topup creation
#[derive(Debug, Deserialize)]
pub struct CreatePendingRequest {
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    pub sender_name: String,
    #[serde(default)]
    pub bank_reference: String,
}

/// POST /api/pending - manually stage a topup
///
/// Manual items skip the rule filter (the operator is the rule) but still go
/// through the dedup engine so the reviewer sees duplicate risk.
pub async fn create_pending(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreatePendingRequest>,
) -> Result<Json<PendingTopup>, AppError> {
    if request.amount <= 0.0 {
        return Err(AppError::bad_request("Amount must be positive"));
    }

    let candidate = ExtractedTransaction {
        amount: request.amount,
        sender_name: request.sender_name.clone(),
        bank_reference: request.bank_reference.clone(),
        ..Default::default()
    };
    let dedup = DedupEngine::new(&state.db).classify(&candidate)?;

    let id = state.db.create_pending_topup(&NewPendingTopup {
        amount: request.amount,
        currency: request.currency.unwrap_or_else(|| "USD".to_string()),
        sender_name: request.sender_name,
        bank_reference: request.bank_reference,
        source: TopupSource::Manual,
        risk_level: dedup.risk_level,
        warning_text: dedup.warning_text,
        warnings: dedup.warnings,
        matched_items: dedup.matched_items,
        ..Default::default()
    })?;

    let topup = state
        .db
        .get_pending_topup(id)?
        .ok_or_else(|| AppError::not_found("Pending topup not found after creation"))?;
    Ok(Json(topup))
}

/// POST /api/pending/:id/approve - manual approval
pub async fn approve_pending(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let actor = operator_identity(&headers);
    let outcome = state
        .approval
        .approve(id, &actor)
        .await
        .map_err(map_approval_error)?;
    Ok(Json(outcome_response(id, outcome)))
}

/// Request body for rejection
#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/pending/:id/reject - manual rejection
pub async fn reject_pending(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    request: Option<Json<RejectRequest>>,
) -> Result<Json<Value>, AppError> {
    let actor = operator_identity(&headers);
    let reason = request.and_then(|Json(r)| r.reason);
    let outcome = state
        .approval
        .reject(id, &actor, reason.as_deref())
        .await
        .map_err(map_approval_error)?;
    Ok(Json(outcome_response(id, outcome)))
}

/// POST /api/pending/:id/retry-credit - operator remediation of a failed credit
pub async fn retry_credit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let (credited, credit_error) = state
        .approval
        .retry_credit(id)
        .await
        .map_err(map_approval_error)?;
    Ok(Json(json!({
        "topup_id": id,
        "credited": credited,
        "credit_error": credit_error,
    })))
}

fn outcome_response(id: i64, outcome: ApprovalOutcome) -> Value {
    match outcome {
        ApprovalOutcome::Approved {
            credited,
            credit_error,
        } => json!({
            "topup_id": id,
            "result": "approved",
            "credited": credited,
            "credit_error": credit_error,
        }),
        ApprovalOutcome::Rejected => json!({
            "topup_id": id,
            "result": "rejected",
        }),
        ApprovalOutcome::Ignored { status } => json!({
            "topup_id": id,
            "result": "ignored",
            "reason": format!("already {}", status),
        }),
    }
}

fn map_approval_error(e: windfall_core::Error) -> AppError {
    match e {
        windfall_core::Error::NotFound(msg) => AppError::not_found(&msg),
        windfall_core::Error::StateConflict(msg) => AppError::conflict(&msg),
        other => AppError::from(other),
    }
}
