use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::forecast::{weather, EngineSettings, ForecastEngine};
use crate::ml::{EnsembleParameters, EnsemblePredictor, ModelSource};
use crate::repo;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub engine: Arc<ForecastEngine>,
}

impl AppState {
    /// Wire collaborators from configuration and make sure a model is loaded
    pub async fn new(cfg: Config) -> Result<Self> {
        let predictor = Arc::new(EnsemblePredictor::new(EnsembleParameters::default()));
        prepare_model(&predictor, &cfg).await?;

        let engine = ForecastEngine::new(
            predictor,
            weather::from_config(&cfg.weather)?,
            repo::prediction_log(&cfg.storage).await?,
            EngineSettings::from_config(&cfg)?,
        );

        Ok(Self::from_parts(cfg, engine))
    }

    pub fn from_parts(cfg: Config, engine: ForecastEngine) -> Self {
        Self {
            cfg: Arc::new(cfg),
            engine: Arc::new(engine),
        }
    }
}

async fn prepare_model(predictor: &Arc<EnsemblePredictor>, cfg: &Config) -> Result<()> {
    let predictor = predictor.clone();
    let model_cfg = cfg.model.clone();

    let source = tokio::task::spawn_blocking(move || {
        if model_cfg.retrain_on_start {
            let pair = predictor.train_synthetic(model_cfg.training_rows, model_cfg.seed)?;
            if let Err(e) = pair.save(&model_cfg.bundle_path) {
                warn!(error = %e, "failed to save model bundle");
            }
            Ok(ModelSource::Trained)
        } else {
            predictor.load_or_train(
                &model_cfg.bundle_path,
                model_cfg.training_rows,
                model_cfg.seed,
            )
        }
    })
    .await
    .context("model preparation task panicked")?
    .context("failed to prepare demand model")?;

    info!(?source, "demand model ready");
    Ok(())
}
