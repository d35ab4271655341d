use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::ApiError;
use crate::app::AppState;
use crate::ml::{BundleMetadata, BAGGED_WEIGHT, BOOSTED_WEIGHT, FEATURE_NAMES};

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    #[serde(flatten)]
    pub metadata: BundleMetadata,
    pub feature_names: &'static [&'static str],
    pub weights: BlendWeights,
}

#[derive(Debug, Serialize)]
pub struct BlendWeights {
    pub bagged: f64,
    pub boosted: f64,
}

impl From<BundleMetadata> for ModelInfo {
    fn from(metadata: BundleMetadata) -> Self {
        Self {
            metadata,
            feature_names: &FEATURE_NAMES,
            weights: BlendWeights {
                bagged: BAGGED_WEIGHT,
                boosted: BOOSTED_WEIGHT,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrainRequest {
    /// Corpus seed; the configured seed when absent
    pub seed: Option<u64>,
}

/// GET /api/model - metadata of the loaded bundle
pub async fn model_info(State(state): State<AppState>) -> Result<Json<ModelInfo>, ApiError> {
    Ok(Json(ModelInfo::from(state.engine.model_info()?)))
}

/// POST /api/model/retrain - train on a fresh synthetic corpus and swap it in
pub async fn retrain(
    State(state): State<AppState>,
    request: Option<Json<RetrainRequest>>,
) -> Result<Json<ModelInfo>, ApiError> {
    let Json(request) = request.unwrap_or_default();
    info!(seed = ?request.seed, "retraining requested");

    let pair = state.engine.retrain(request.seed).await?;
    Ok(Json(ModelInfo::from(pair.metadata().clone())))
}
