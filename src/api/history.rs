use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::api::error::ApiError;
use crate::app::AppState;
use crate::repo::HistoryEntry;

#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(range(min = 1, max = 365))]
    pub days: Option<u32>,
}

/// GET /api/history/:state/:district?days=N - newest first
pub async fn get_history(
    State(state): State<AppState>,
    Path((state_name, district)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    query.validate()?;

    let entries = state
        .engine
        .history(&state_name, &district, query.days)
        .await?;

    Ok(Json(entries))
}
