//! Poller settings and manual scan handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;

use windfall_core::models::{PollerSettings, PollingMode};
use windfall_core::pipeline::ScanSummary;

use crate::{AppError, AppState};

/// GET /api/poller
pub async fn get_poller_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PollerSettings>, AppError> {
    Ok(Json(state.db.get_poller_settings()?))
}

/// Partial update body; omitted fields keep their current value
#[derive(Debug, Deserialize)]
pub struct PollerSettingsUpdate {
    pub enabled: Option<bool>,
    pub polling_mode: Option<String>,
    pub polling_interval_minutes: Option<i64>,
    pub fetch_count: Option<i64>,
}

/// PUT /api/poller - merge an update onto the current settings
///
/// The running poller re-reads settings at the top of every cycle, so a flag
/// flip here takes effect without a restart.
pub async fn update_poller_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<PollerSettingsUpdate>,
) -> Result<Json<PollerSettings>, AppError> {
    let mut settings = state.db.get_poller_settings()?;

    if let Some(enabled) = update.enabled {
        settings.enabled = enabled;
    }
    if let Some(ref mode) = update.polling_mode {
        settings.polling_mode = mode
            .parse::<PollingMode>()
            .map_err(|e| AppError::bad_request(&e))?;
    }
    if let Some(minutes) = update.polling_interval_minutes {
        if minutes < 1 {
            return Err(AppError::bad_request(
                "polling_interval_minutes must be >= 1",
            ));
        }
        settings.polling_interval_minutes = minutes;
    }
    if let Some(count) = update.fetch_count {
        if count < 1 {
            return Err(AppError::bad_request("fetch_count must be >= 1"));
        }
        settings.fetch_count = count;
    }

    state.db.update_poller_settings(&settings)?;
    Ok(Json(state.db.get_poller_settings()?))
}

/// POST /api/poller/scan - run one scan cycle now
pub async fn trigger_scan(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScanSummary>, AppError> {
    let pipeline = state
        .pipeline
        .as_ref()
        .ok_or_else(|| AppError::bad_request("Extractor backend not configured"))?;
    let mailbox = state
        .mailbox
        .as_ref()
        .ok_or_else(|| AppError::bad_request("Mailbox not configured"))?;

    let settings = state.db.get_poller_settings()?;
    let summary = pipeline.run_scan(mailbox, settings.fetch_count).await?;
    Ok(Json(summary))
}
