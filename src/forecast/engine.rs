use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::rollout::{ForecastRoller, Rollout, DEFAULT_STEPS};
use super::weather::{WeatherReport, WeatherSource};
use crate::config::Config;
use crate::domain::PredictionResult;
use crate::ml::{BundleMetadata, EnsemblePredictor, ModelError, TrainedModelPair};
use crate::repo::{HistoryEntry, PredictionLog, PredictionRecord};

/// Runtime knobs the engine needs from configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub timezone: Tz,
    pub history_limit: usize,
    pub history_days: u32,
    pub training_rows: usize,
    pub seed: u64,
    /// Where retrained bundles are written; `None` skips saving
    pub bundle_path: Option<PathBuf>,
    pub rollout_seed: Option<u64>,
}

impl EngineSettings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            timezone: cfg.timezone()?,
            history_limit: cfg.storage.history_limit,
            history_days: cfg.storage.history_days,
            training_rows: cfg.model.training_rows,
            seed: cfg.model.seed,
            bundle_path: Some(cfg.model.bundle_path.clone()),
            rollout_seed: cfg.model.rollout_seed,
        })
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Kolkata,
            history_limit: 100,
            history_days: 7,
            training_rows: 10_000,
            seed: 42,
            bundle_path: None,
            rollout_seed: None,
        }
    }
}

/// Immediate estimate plus the next-hours rollout for one location
#[derive(Debug, Clone)]
pub struct DemandForecast {
    pub state: String,
    pub district: String,
    pub current: PredictionResult,
    pub weather: WeatherReport,
    pub rollout: Rollout,
    pub generated_at: DateTime<FixedOffset>,
}

pub struct ForecastEngine {
    predictor: Arc<EnsemblePredictor>,
    roller: Arc<ForecastRoller>,
    weather: Arc<dyn WeatherSource>,
    log: Arc<dyn PredictionLog>,
    settings: EngineSettings,
}

impl ForecastEngine {
    pub fn new(
        predictor: Arc<EnsemblePredictor>,
        weather: Arc<dyn WeatherSource>,
        log: Arc<dyn PredictionLog>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            predictor,
            roller: Arc::new(ForecastRoller::new(settings.rollout_seed)),
            weather,
            log,
            settings,
        }
    }

    pub fn predictor(&self) -> &Arc<EnsemblePredictor> {
        &self.predictor
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Wall-clock now in the configured zone
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.settings.timezone).fixed_offset()
    }

    pub async fn forecast(&self, state: &str, district: &str) -> Result<DemandForecast, ModelError> {
        self.forecast_at(state, district, self.now()).await
    }

    /// Forecast with an explicit base time.
    ///
    /// Fails only when no model is loaded or the immediate estimate fails.
    /// Weather problems degrade to the fallback observation and rollout step
    /// failures are reported in the returned [`Rollout`].
    pub async fn forecast_at(
        &self,
        state: &str,
        district: &str,
        base_time: DateTime<FixedOffset>,
    ) -> Result<DemandForecast, ModelError> {
        let model = self.predictor.current()?;
        let weather = self.weather.current(state, district).await;

        let (current, rollout) = {
            let roller = self.roller.clone();
            let (state, district) = (state.to_string(), district.to_string());
            let observation = weather.observation;
            tokio::task::spawn_blocking(move || {
                let current = model.infer(&state, &district, &base_time, &observation)?;
                let rollout =
                    roller.rollout(&model, &state, &district, &observation, base_time, DEFAULT_STEPS);
                Ok::<_, ModelError>((current, rollout))
            })
            .await
            .map_err(|e| ModelError::Prediction(format!("inference task failed: {}", e)))??
        };

        if !rollout.is_complete() {
            warn!(
                state,
                district,
                degraded = ?rollout.degraded_offsets(),
                "rollout completed with degraded steps"
            );
        }

        let record = PredictionRecord::from_result(state, district, &current);
        if let Err(e) = self.log.append(&record).await {
            warn!(error = %format!("{:#}", e), state, district, "failed to record prediction");
        }

        info!(
            state,
            district,
            estimate_mw = current.estimate_mw,
            confidence = current.confidence,
            weather_live = weather.is_live(),
            "forecast served"
        );

        Ok(DemandForecast {
            state: state.to_string(),
            district: district.to_string(),
            current,
            weather,
            rollout,
            generated_at: base_time,
        })
    }

    /// Recent predictions for a location, newest first
    pub async fn history(
        &self,
        state: &str,
        district: &str,
        days: Option<u32>,
    ) -> Result<Vec<HistoryEntry>> {
        let days = days.unwrap_or(self.settings.history_days);
        let since = self.now() - Duration::days(i64::from(days));
        self.log
            .history(state, district, since, self.settings.history_limit)
            .await
    }

    pub fn model_info(&self) -> Result<BundleMetadata, ModelError> {
        Ok(self.predictor.current()?.metadata().clone())
    }

    pub fn is_ready(&self) -> bool {
        self.predictor.is_trained()
    }

    /// Train on a fresh synthetic corpus and swap the result in.
    ///
    /// Inference keeps using the previous model until the new one is ready.
    /// Only one run at a time; a concurrent call gets `TrainingInProgress`.
    pub async fn retrain(&self, seed: Option<u64>) -> Result<Arc<TrainedModelPair>, ModelError> {
        if self.predictor.is_training() {
            return Err(ModelError::TrainingInProgress);
        }
        let predictor = self.predictor.clone();
        let rows = self.settings.training_rows;
        let seed = seed.unwrap_or(self.settings.seed);

        let pair = tokio::task::spawn_blocking(move || predictor.train_synthetic(rows, seed))
            .await
            .map_err(|e| ModelError::Training(format!("training task failed: {}", e)))??;

        if let Some(path) = &self.settings.bundle_path {
            let (pair, path) = (pair.clone(), path.clone());
            let saved = tokio::task::spawn_blocking(move || pair.save(&path)).await;
            match saved {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "failed to save retrained bundle"),
                Err(e) => warn!(error = %e, "bundle save task failed"),
            }
        }

        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WeatherObservation;
    use crate::forecast::weather::{MockWeatherSource, WeatherOrigin};
    use crate::ml::testing::{shared_pair, small_params};
    use crate::repo::InMemoryPredictionLog;
    use chrono::TimeZone;

    fn base_time() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(19800)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 4, 8, 0, 0)
            .unwrap()
    }

    fn mock_weather(observation: WeatherObservation, origin: WeatherOrigin) -> MockWeatherSource {
        let mut weather = MockWeatherSource::new();
        weather
            .expect_current()
            .times(1)
            .returning(move |state, district| {
                WeatherReport::new(state, district, observation, origin.clone())
            });
        weather
    }

    fn engine_with(
        predictor: EnsemblePredictor,
        weather: MockWeatherSource,
        log: Arc<InMemoryPredictionLog>,
    ) -> ForecastEngine {
        ForecastEngine::new(
            Arc::new(predictor),
            Arc::new(weather),
            log,
            EngineSettings {
                training_rows: 300,
                rollout_seed: Some(5),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_forecast_records_current_prediction() {
        let log = Arc::new(InMemoryPredictionLog::new());
        let weather = WeatherObservation::new(36.0, 40.0, 6.0, 0.0);
        let engine = engine_with(
            EnsemblePredictor::with_model(small_params(), shared_pair()),
            mock_weather(weather, WeatherOrigin::Live),
            log.clone(),
        );

        let forecast = engine
            .forecast_at("Delhi", "New Delhi", base_time())
            .await
            .unwrap();

        assert_eq!(forecast.rollout.len(), 24);
        assert!(forecast.rollout.is_complete());
        assert_eq!(forecast.current.parameters.temperature, 36.0);
        assert_eq!(forecast.current.timestamp, base_time());
        assert!(forecast.weather.is_live());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_weather_is_used_uniformly() {
        let log = Arc::new(InMemoryPredictionLog::new());
        let engine = engine_with(
            EnsemblePredictor::with_model(small_params(), shared_pair()),
            mock_weather(
                WeatherObservation::fallback(),
                WeatherOrigin::Fallback {
                    reason: "timeout".to_string(),
                },
            ),
            log,
        );

        let forecast = engine
            .forecast_at("Delhi", "New Delhi", base_time())
            .await
            .unwrap();
        assert_eq!(forecast.current.parameters.temperature, 28.0);
        assert_eq!(forecast.current.parameters.humidity, 65.0);
        assert!(!forecast.weather.is_live());
    }

    #[tokio::test]
    async fn test_untrained_engine_fails_before_fetching_weather() {
        let mut weather = MockWeatherSource::new();
        weather.expect_current().never();
        let log = Arc::new(InMemoryPredictionLog::new());
        let engine = engine_with(EnsemblePredictor::new(small_params()), weather, log.clone());

        let result = engine.forecast_at("Delhi", "New Delhi", base_time()).await;
        assert!(matches!(result, Err(ModelError::NotTrained)));
        assert!(log.is_empty());
        assert!(!engine.is_ready());
        assert!(matches!(engine.model_info(), Err(ModelError::NotTrained)));
    }

    #[tokio::test]
    async fn test_history_reads_back_recent_predictions() {
        let log = Arc::new(InMemoryPredictionLog::new());
        let engine = engine_with(
            EnsemblePredictor::with_model(small_params(), shared_pair()),
            mock_weather(WeatherObservation::fallback(), WeatherOrigin::Static),
            log,
        );

        let now = engine.now();
        let forecast = engine.forecast_at("Delhi", "New Delhi", now).await.unwrap();

        let history = engine.history("Delhi", "New Delhi", None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].prediction, forecast.current.estimate_mw);
        assert!(engine.history("Delhi", "East Delhi", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrain_swaps_model() {
        let log = Arc::new(InMemoryPredictionLog::new());
        let engine = engine_with(
            EnsemblePredictor::new(small_params()),
            MockWeatherSource::new(),
            log,
        );
        assert!(!engine.is_ready());

        let pair = engine.retrain(Some(11)).await.unwrap();
        assert!(engine.is_ready());
        assert_eq!(
            engine.model_info().unwrap().bundle_id,
            pair.metadata().bundle_id
        );
    }

    #[tokio::test]
    async fn test_retrain_rejected_while_another_run_is_active() {
        let engine = engine_with(
            EnsemblePredictor::with_model(small_params(), shared_pair()),
            MockWeatherSource::new(),
            Arc::new(InMemoryPredictionLog::new()),
        );
        let installed = engine.model_info().unwrap().bundle_id;

        let slot = engine.predictor().hold_training_slot();
        let result = engine.retrain(Some(2)).await;
        assert!(matches!(result, Err(ModelError::TrainingInProgress)));
        assert_eq!(engine.model_info().unwrap().bundle_id, installed);
        drop(slot);

        let pair = engine.retrain(Some(2)).await.unwrap();
        assert_ne!(pair.metadata().bundle_id, installed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_retrains_run_at_most_one_training() {
        let engine = Arc::new(ForecastEngine::new(
            Arc::new(EnsemblePredictor::new(small_params())),
            Arc::new(MockWeatherSource::new()),
            Arc::new(InMemoryPredictionLog::new()),
            EngineSettings {
                training_rows: 3_000,
                ..Default::default()
            },
        ));

        let mut tasks = tokio::task::JoinSet::new();
        for seed in 0..8 {
            let engine = engine.clone();
            tasks.spawn(async move { engine.retrain(Some(seed)).await });
        }

        let (mut trained, mut rejected) = (0, 0);
        while let Some(outcome) = tasks.join_next().await {
            match outcome.unwrap() {
                Ok(_) => trained += 1,
                Err(ModelError::TrainingInProgress) => rejected += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert!(trained >= 1);
        assert_eq!(trained + rejected, 8);
        assert!(rejected >= 1, "every retrain ran a full training");
    }
}
