//! Dual-regressor ensemble.
//!
//! A bagged forest and a boosted tree model are trained on the same scaled
//! matrix and blended with fixed weights. The bagged model gets the larger
//! weight because its estimates vary less between training runs.
//!
//! Confidence is derived from how much the two members disagree relative to
//! the blended estimate. It is a heuristic, not a calibrated interval.

use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::encoder::FeatureEncoder;
use super::models::{to_matrix, Regressor};
use super::schema::feature_names;
use super::smartcore::{BaggedForest, BoostedTrees, BoostingParameters, ForestParameters};
use super::synthetic::{DatasetSummary, SyntheticGenerator, TrainingRow};
use super::training::{calculate_metrics, TrainingDataset};
use super::{ModelError, ValidationMetrics};
use crate::domain::{ComponentEstimates, PredictionParameters, PredictionResult, WeatherObservation};

pub const BAGGED_WEIGHT: f64 = 0.6;
pub const BOOSTED_WEIGHT: f64 = 0.4;

/// Floor of the confidence score, also used when the blend is ~0
pub const MIN_CONFIDENCE: f64 = 0.5;

const MAX_HOLDOUT_MAPE: f64 = 25.0;
const MIN_HOLDOUT_R2: f64 = 0.5;

const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Weighted average of the two member estimates
pub fn blend(bagged: f64, boosted: f64) -> f64 {
    BAGGED_WEIGHT * bagged + BOOSTED_WEIGHT * boosted
}

/// `1 - |A - B| / |blend|`, clamped to [0.5, 1.0].
///
/// A blend within machine epsilon of zero gives the floor value instead of
/// dividing by it.
pub fn confidence(bagged: f64, boosted: f64) -> f64 {
    let blended = blend(bagged, boosted);
    if !blended.is_finite() || blended.abs() < f64::EPSILON {
        return MIN_CONFIDENCE;
    }
    let score = 1.0 - (bagged - boosted).abs() / blended.abs();
    // f64::max drops NaN
    score.max(MIN_CONFIDENCE).min(1.0)
}

/// Hyper-parameters for one training run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleParameters {
    pub forest: ForestParameters,
    pub boosting: BoostingParameters,
    /// Share of rows used for fitting; the rest is the reporting hold-out
    pub train_ratio: f64,
    pub split_seed: u64,
}

impl Default for EnsembleParameters {
    fn default() -> Self {
        Self {
            forest: ForestParameters::default(),
            boosting: BoostingParameters::default(),
            train_ratio: 0.8,
            split_seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub bundle_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
    pub holdout_rows: usize,
    pub params: EnsembleParameters,
    pub bagged: ValidationMetrics,
    pub boosted: ValidationMetrics,
    pub blended: ValidationMetrics,
    pub dataset: DatasetSummary,
}

/// Everything a training run produces, kept and persisted as one unit
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedModelPair {
    metadata: BundleMetadata,
    feature_names: Vec<String>,
    encoder: FeatureEncoder,
    bagged: BaggedForest,
    boosted: BoostedTrees,
}

impl TrainedModelPair {
    /// Fit the encoder on the whole corpus, then both regressors on the
    /// training share of a seeded shuffle. Hold-out metrics are reported only.
    pub fn train(rows: &[TrainingRow], params: &EnsembleParameters) -> Result<Self, ModelError> {
        info!(rows = rows.len(), "training demand ensemble");
        let dataset_summary = DatasetSummary::from_rows(rows);

        let encoder = FeatureEncoder::fit(rows)?;
        let features = encoder.transform_rows(rows)?;
        let targets = rows.iter().map(|r| r.power_consumption_mw).collect();
        let (train, holdout) =
            TrainingDataset::new(features, targets)?.shuffled_split(params.train_ratio, params.split_seed)?;

        let x_train = to_matrix(&train.features)?;
        let bagged = BaggedForest::fit(&x_train, &train.targets, params.forest)?;
        debug!(trees = params.forest.n_trees, "bagged forest fitted");
        let boosted = BoostedTrees::fit(&x_train, &train.targets, params.boosting)?;
        debug!(stages = boosted.n_stages(), "boosted trees fitted");

        let x_holdout = to_matrix(&holdout.features)?;
        let bagged_pred = bagged.predict_matrix(&x_holdout)?;
        let boosted_pred = boosted.predict_matrix(&x_holdout)?;
        let blended_pred: Vec<f64> = bagged_pred
            .iter()
            .zip(&boosted_pred)
            .map(|(a, b)| blend(*a, *b))
            .collect();

        let bagged_metrics = calculate_metrics(&bagged_pred, &holdout.targets)?;
        let boosted_metrics = calculate_metrics(&boosted_pred, &holdout.targets)?;
        let blended_metrics = calculate_metrics(&blended_pred, &holdout.targets)?;

        info!(
            bagged_mae = bagged_metrics.mae,
            boosted_mae = boosted_metrics.mae,
            blended_mae = blended_metrics.mae,
            blended_r2 = blended_metrics.r2,
            holdout_rows = holdout.len(),
            "ensemble training complete"
        );
        if !blended_metrics.meets_quality_threshold(MAX_HOLDOUT_MAPE, MIN_HOLDOUT_R2) {
            warn!(
                mape = blended_metrics.mape,
                r2 = blended_metrics.r2,
                "blended hold-out accuracy below expectations"
            );
        }

        let metadata = BundleMetadata {
            bundle_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            training_rows: train.len(),
            holdout_rows: holdout.len(),
            params: *params,
            bagged: bagged_metrics,
            boosted: boosted_metrics,
            blended: blended_metrics,
            dataset: dataset_summary,
        };

        Ok(Self {
            metadata,
            feature_names: feature_names(),
            encoder,
            bagged,
            boosted,
        })
    }

    /// Estimate demand for one location and instant
    pub fn infer(
        &self,
        state: &str,
        district: &str,
        timestamp: &DateTime<FixedOffset>,
        weather: &WeatherObservation,
    ) -> Result<PredictionResult, ModelError> {
        if ![
            weather.temperature,
            weather.humidity,
            weather.wind_speed,
            weather.rainfall,
        ]
        .iter()
        .all(|v| v.is_finite())
        {
            return Err(ModelError::InvalidFeatures(
                "weather observation contains non-finite values".to_string(),
            ));
        }

        let encoded = self.encoder.encode(state, district, timestamp, weather)?;
        if encoded.state.is_fallback() || encoded.district.is_fallback() {
            debug!(state, district, "unseen location label, using fallback code");
        }

        let bagged = self.bagged.predict(&encoded.scaled)?;
        let boosted = self.boosted.predict(&encoded.scaled)?;
        if !bagged.is_finite() || !boosted.is_finite() {
            return Err(ModelError::Prediction(format!(
                "non-finite member estimate (bagged {}, boosted {})",
                bagged, boosted
            )));
        }

        let calendar = encoded.calendar;
        Ok(PredictionResult {
            estimate_mw: blend(bagged, boosted),
            confidence: confidence(bagged, boosted),
            components: ComponentEstimates {
                bagged_mw: bagged,
                boosted_mw: boosted,
            },
            parameters: PredictionParameters {
                temperature: weather.temperature,
                humidity: weather.humidity,
                wind_speed: weather.wind_speed,
                rainfall: weather.rainfall,
                industrial_load: encoded.industrial_load,
                hour: calendar.hour,
                is_peak_hour: calendar.is_peak_hour(),
                is_weekend: calendar.is_weekend(),
                season: calendar.season(),
            },
            timestamp: *timestamp,
        })
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Write the bundle atomically (temp file, then rename)
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let bytes = bincode::serialize(&BundleRef {
            format_version: BUNDLE_FORMAT_VERSION,
            pair: self,
        })
        .map_err(|e| ModelError::Bundle(format!("failed to serialize bundle: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;

        info!(path = %path.display(), bundle_id = %self.metadata.bundle_id, "model bundle saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path)?;
        let bundle: BundleOwned = bincode::deserialize(&bytes)
            .map_err(|e| ModelError::Bundle(format!("failed to deserialize bundle: {}", e)))?;

        if bundle.format_version != BUNDLE_FORMAT_VERSION {
            return Err(ModelError::Bundle(format!(
                "unsupported bundle format {} (expected {})",
                bundle.format_version, BUNDLE_FORMAT_VERSION
            )));
        }
        let expected = feature_names();
        if bundle.pair.feature_names != expected {
            return Err(ModelError::SchemaMismatch {
                expected,
                found: bundle.pair.feature_names,
            });
        }

        info!(
            path = %path.display(),
            bundle_id = %bundle.pair.metadata.bundle_id,
            "model bundle loaded"
        );
        Ok(bundle.pair)
    }
}

#[derive(Serialize)]
struct BundleRef<'a> {
    format_version: u32,
    pair: &'a TrainedModelPair,
}

#[derive(Deserialize)]
struct BundleOwned {
    format_version: u32,
    pair: TrainedModelPair,
}

/// How the predictor obtained its model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    Restored,
    Trained,
}

/// Owner of the current model pair.
///
/// Inference takes a cheap `Arc` clone of the current pair. Training builds a
/// complete replacement before swapping it in, so readers never observe a
/// partially fitted pair and a failed run leaves the previous pair in place.
pub struct EnsemblePredictor {
    params: EnsembleParameters,
    current: RwLock<Option<Arc<TrainedModelPair>>>,
    training: Mutex<()>,
}

impl EnsemblePredictor {
    pub fn new(params: EnsembleParameters) -> Self {
        Self {
            params,
            current: RwLock::new(None),
            training: Mutex::new(()),
        }
    }

    pub fn with_model(params: EnsembleParameters, pair: Arc<TrainedModelPair>) -> Self {
        let predictor = Self::new(params);
        predictor.install(pair);
        predictor
    }

    pub fn params(&self) -> &EnsembleParameters {
        &self.params
    }

    pub fn is_trained(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn current(&self) -> Result<Arc<TrainedModelPair>, ModelError> {
        self.current.read().clone().ok_or(ModelError::NotTrained)
    }

    /// True while a training run (or bundle load) holds the training slot
    pub fn is_training(&self) -> bool {
        self.training.is_locked()
    }

    /// Train and install a new pair. Fails with `TrainingInProgress` instead
    /// of queueing behind a run that is already going.
    pub fn train(&self, rows: &[TrainingRow]) -> Result<Arc<TrainedModelPair>, ModelError> {
        let _guard = self.begin_training()?;
        self.fit_and_install(rows)
    }

    /// Train on a freshly generated synthetic corpus
    pub fn train_synthetic(
        &self,
        rows: usize,
        seed: u64,
    ) -> Result<Arc<TrainedModelPair>, ModelError> {
        let _guard = self.begin_training()?;
        let corpus = SyntheticGenerator::seeded(seed).generate(rows);
        info!(
            summary = ?DatasetSummary::from_rows(&corpus).avg_consumption_by_state,
            "generated synthetic corpus"
        );
        self.fit_and_install(&corpus)
    }

    pub fn infer(
        &self,
        state: &str,
        district: &str,
        timestamp: &DateTime<FixedOffset>,
        weather: &WeatherObservation,
    ) -> Result<PredictionResult, ModelError> {
        self.current()?.infer(state, district, timestamp, weather)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        self.current()?.save(path)
    }

    pub fn load(&self, path: &Path) -> Result<Arc<TrainedModelPair>, ModelError> {
        let _guard = self.begin_training()?;
        let pair = Arc::new(TrainedModelPair::load(path)?);
        self.install(pair.clone());
        Ok(pair)
    }

    /// Restore the bundle at `path`, or train on a synthetic corpus if it is
    /// missing or unreadable. A failed save after training is only logged.
    pub fn load_or_train(
        &self,
        path: &Path,
        rows: usize,
        seed: u64,
    ) -> Result<ModelSource, ModelError> {
        match self.load(path) {
            Ok(_) => return Ok(ModelSource::Restored),
            Err(e) => warn!(error = %e, path = %path.display(), "could not restore model bundle, retraining"),
        }

        let pair = self.train_synthetic(rows, seed)?;
        if let Err(e) = pair.save(path) {
            warn!(error = %e, path = %path.display(), "failed to save model bundle");
        }
        Ok(ModelSource::Trained)
    }

    fn begin_training(&self) -> Result<MutexGuard<'_, ()>, ModelError> {
        self.training.try_lock().ok_or_else(|| {
            debug!("training slot busy");
            ModelError::TrainingInProgress
        })
    }

    fn fit_and_install(&self, rows: &[TrainingRow]) -> Result<Arc<TrainedModelPair>, ModelError> {
        let pair = Arc::new(TrainedModelPair::train(rows, &self.params)?);
        self.install(pair.clone());
        Ok(pair)
    }

    fn install(&self, pair: Arc<TrainedModelPair>) {
        *self.current.write() = Some(pair);
    }

    #[cfg(test)]
    pub(crate) fn hold_training_slot(&self) -> MutexGuard<'_, ()> {
        self.training.lock()
    }
}
