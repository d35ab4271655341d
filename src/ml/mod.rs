//! Machine Learning Module
//!
//! Demand estimation from weather and calendar signals:
//! - Fixed feature schema shared by training and inference
//! - Synthetic training corpus generation
//! - Categorical encoding and feature scaling
//! - Bagged and boosted tree regressors blended into one estimate
//!
//! # Architecture
//! Everything fitted during training (codebook, scaler, both regressors) is
//! bundled into a [`TrainedModelPair`] that is immutable once built and is
//! shared read-only by every inference call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod encoder;
pub mod ensemble;
pub mod models;
pub mod schema;
pub mod smartcore;
pub mod synthetic;
pub mod training;

pub use encoder::{Codebook, CodeLookup, FeatureEncoder, ScalerState};
pub use ensemble::{
    blend, confidence, BundleMetadata, EnsembleParameters, EnsemblePredictor, ModelSource,
    TrainedModelPair, BAGGED_WEIGHT, BOOSTED_WEIGHT, MIN_CONFIDENCE,
};
pub use models::Regressor;
pub use self::smartcore::{BaggedForest, BoostedTrees, BoostingParameters, ForestParameters};
pub use schema::{CalendarFields, Feature, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use synthetic::{DatasetSummary, SyntheticGenerator, TrainingRow};

/// Errors raised by training, encoding and inference
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model not trained")]
    NotTrained,

    #[error("A training run is already in progress")]
    TrainingInProgress,

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Invalid feature vector: {0}")]
    InvalidFeatures(String),

    #[error("Model bundle error: {0}")]
    Bundle(String),

    #[error("Feature schema mismatch: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// ML Model Type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelType {
    RandomForest,
    GradientBoosting,
}

/// Validation Metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub rmse: f64, // Root Mean Square Error
    pub mape: f64, // Mean Absolute Percentage Error
    pub r2: f64,   // R-squared
}

impl ValidationMetrics {
    pub fn new(mae: f64, rmse: f64, mape: f64, r2: f64) -> Self {
        Self {
            mae,
            rmse,
            mape,
            r2,
        }
    }

    /// Check if metrics meet quality thresholds
    pub fn meets_quality_threshold(&self, max_mape: f64, min_r2: f64) -> bool {
        self.mape <= max_mape && self.r2 >= min_r2
    }
}
