use axum::{extract::State, Json};
use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::api::error::ApiError;
use crate::app::AppState;
use crate::domain::{ComponentEstimates, PredictionParameters};
use crate::forecast::{DemandForecast, RolloutStep, WeatherReport};

/// Reported as the estimate of a rollout step that failed
const DEGRADED_ESTIMATE: f64 = 0.0;

#[derive(Debug, Deserialize, Validate)]
pub struct PredictRequest {
    #[validate(length(min = 1, max = 64), custom(function = "not_blank"))]
    pub state: String,
    #[validate(length(min = 1, max = 64), custom(function = "not_blank"))]
    pub district: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct HourlyPrediction {
    pub hour_offset: u32,
    pub timestamp: DateTime<FixedOffset>,
    pub hour: u32,
    pub prediction: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub degraded: bool,
}

impl From<&RolloutStep> for HourlyPrediction {
    fn from(step: &RolloutStep) -> Self {
        Self {
            hour_offset: step.hour_offset,
            timestamp: step.timestamp,
            hour: step.timestamp.hour(),
            prediction: step.estimate_or(DEGRADED_ESTIMATE),
            confidence: step.prediction().map(|p| p.confidence),
            degraded: step.is_degraded(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub state: String,
    pub district: String,
    pub current_prediction: f64,
    pub confidence_score: f64,
    pub components: ComponentEstimates,
    pub weather_data: WeatherReport,
    pub parameters: PredictionParameters,
    pub predictions_24h: Vec<HourlyPrediction>,
    pub degraded_offsets: Vec<u32>,
    pub timestamp: DateTime<FixedOffset>,
}

impl From<DemandForecast> for PredictResponse {
    fn from(f: DemandForecast) -> Self {
        Self {
            predictions_24h: f.rollout.steps().iter().map(HourlyPrediction::from).collect(),
            degraded_offsets: f.rollout.degraded_offsets(),
            state: f.state,
            district: f.district,
            current_prediction: f.current.estimate_mw,
            confidence_score: f.current.confidence,
            components: f.current.components,
            weather_data: f.weather,
            parameters: f.current.parameters,
            timestamp: f.generated_at,
        }
    }
}

/// POST /api/predict - current estimate plus the next 24 hours
pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    request.validate()?;

    let forecast = state
        .engine
        .forecast(request.state.trim(), request.district.trim())
        .await?;

    Ok(Json(PredictResponse::from(forecast)))
}
