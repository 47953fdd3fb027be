//! Health and status reporting

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use windfall_core::ai::ExtractorBackend;
use windfall_core::mailbox::MailboxBackend;

use crate::{AppError, AppState};

/// GET /api/health - configuration and collaborator reachability
pub async fn get_health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let extractor = match state.extractor {
        Some(ref client) => json!({
            "host": client.host(),
            "model": client.model(),
            "reachable": client.health_check().await,
        }),
        None => Value::Null,
    };

    let settings = state.db.get_poller_settings()?;

    Ok(Json(json!({
        "status": "ok",
        "extractor": extractor,
        "mailbox": state.mailbox.as_ref().map(|m| m.host()),
        "poller": {
            "enabled": settings.enabled,
            "polling_mode": settings.polling_mode,
            "polling_interval_minutes": settings.polling_interval_minutes,
            "last_auto_scan": settings.last_auto_scan,
            "last_scan_created": settings.last_scan_created,
        },
    })))
}
