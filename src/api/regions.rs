use axum::{extract::Path, Json};
use std::collections::BTreeMap;

use crate::api::error::ApiError;
use crate::domain::{region, StateProfile};

/// GET /api/states - state name to district names
pub async fn list_states() -> Json<BTreeMap<&'static str, Vec<&'static str>>> {
    Json(region::district_map())
}

/// GET /api/states/:state - base load, industrial factor and district coordinates
pub async fn get_state(Path(name): Path<String>) -> Result<Json<&'static StateProfile>, ApiError> {
    region::find_state(&name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("state {}", name)))
}
