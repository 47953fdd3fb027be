//! Rule set handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;

use windfall_core::models::RuleSet;

use crate::{AppError, AppState};

/// GET /api/rules
pub async fn get_rules(State(state): State<Arc<AppState>>) -> Result<Json<RuleSet>, AppError> {
    Ok(Json(state.db.get_rule_set()?))
}

/// Partial update body; omitted fields keep their current value
#[derive(Debug, Deserialize)]
pub struct RuleSetUpdate {
    pub sender_whitelist: Option<Vec<String>>,
    pub must_contain_keywords: Option<Vec<String>>,
    pub must_not_contain_keywords: Option<Vec<String>>,
    pub amount_max_threshold: Option<f64>,
    pub amount_auto_approve_threshold: Option<f64>,
    pub enabled: Option<bool>,
}

/// PUT /api/rules - merge an update onto the current rule set
pub async fn update_rules(
    State(state): State<Arc<AppState>>,
    Json(update): Json<RuleSetUpdate>,
) -> Result<Json<RuleSet>, AppError> {
    let mut rules = state.db.get_rule_set()?;

    if let Some(whitelist) = update.sender_whitelist {
        rules.sender_whitelist = whitelist;
    }
    if let Some(keywords) = update.must_contain_keywords {
        rules.must_contain_keywords = keywords;
    }
    if let Some(keywords) = update.must_not_contain_keywords {
        rules.must_not_contain_keywords = keywords;
    }
    if let Some(threshold) = update.amount_max_threshold {
        if threshold < 0.0 {
            return Err(AppError::bad_request("amount_max_threshold must be >= 0"));
        }
        rules.amount_max_threshold = threshold;
    }
    if let Some(threshold) = update.amount_auto_approve_threshold {
        if threshold < 0.0 {
            return Err(AppError::bad_request(
                "amount_auto_approve_threshold must be >= 0",
            ));
        }
        rules.amount_auto_approve_threshold = threshold;
    }
    if let Some(enabled) = update.enabled {
        rules.enabled = enabled;
    }

    state.db.update_rule_set(&rules)?;
    Ok(Json(state.db.get_rule_set()?))
}
