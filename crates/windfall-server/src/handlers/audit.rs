//! Webhook audit log handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use windfall_core::models::WebhookAuditEntry;

use crate::{AppError, AppState, MAX_PAGE_LIMIT};

/// Query parameters for the audit log
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    pub limit: i64,
}

fn default_audit_limit() -> i64 {
    100
}

/// GET /api/audit - list webhook audit entries, newest first
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQuery>,
) -> Result<Json<Vec<WebhookAuditEntry>>, AppError> {
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let entries = state.db.list_webhook_audit(limit)?;
    Ok(Json(entries))
}
