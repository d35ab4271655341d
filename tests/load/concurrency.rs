//! Concurrent inference while the model is being retrained.
//!
//! Inference must never observe a half-built model pair: every call either
//! reports "not trained" (before the first model exists) or returns a finite
//! estimate from a complete pair.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use chrono::{FixedOffset, TimeZone};
use india_power_forecast::domain::WeatherObservation;
use india_power_forecast::forecast::{EngineSettings, ForecastEngine, StaticWeatherSource};
use india_power_forecast::ml::{
    BoostingParameters, EnsembleParameters, EnsemblePredictor, ForestParameters, ModelError,
};
use india_power_forecast::repo::InMemoryPredictionLog;

fn small_params() -> EnsembleParameters {
    EnsembleParameters {
        forest: ForestParameters {
            n_trees: 8,
            max_depth: 5,
            min_samples_split: 5,
            seed: 42,
        },
        boosting: BoostingParameters {
            n_stages: 15,
            max_depth: 3,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn build_engine(log: Arc<InMemoryPredictionLog>) -> ForecastEngine {
    ForecastEngine::new(
        Arc::new(EnsemblePredictor::new(small_params())),
        Arc::new(StaticWeatherSource::default()),
        log,
        EngineSettings {
            training_rows: 600,
            ..Default::default()
        },
    )
}

#[test]
fn test_inference_during_retraining_sees_complete_models() {
    let predictor = Arc::new(EnsemblePredictor::new(small_params()));
    predictor.train_synthetic(600, 1).unwrap();
    let ts = FixedOffset::east_opt(19800)
        .unwrap()
        .with_ymd_and_hms(2024, 3, 12, 19, 0, 0)
        .unwrap();

    std::thread::scope(|scope| {
        let trainer = {
            let predictor = Arc::clone(&predictor);
            scope.spawn(move || {
                for seed in 2..5 {
                    predictor.train_synthetic(600, seed).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let predictor = Arc::clone(&predictor);
                scope.spawn(move || {
                    for _ in 0..50 {
                        let result = predictor
                            .infer("Tamil Nadu", "Chennai", &ts, &WeatherObservation::fallback())
                            .unwrap();
                        assert!(result.estimate_mw.is_finite());
                        assert!((0.5..=1.0).contains(&result.confidence));
                    }
                })
            })
            .collect();

        trainer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    });
}

#[tokio::test]
async fn test_concurrent_forecasts_before_and_after_training() {
    let log = Arc::new(InMemoryPredictionLog::new());
    let engine = Arc::new(build_engine(log.clone()));

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move {
            match engine.forecast("Haryana", "Gurgaon").await {
                Ok(f) => assert_eq!(f.rollout.len(), 24),
                Err(ModelError::NotTrained) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        });
    }
    {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move {
            engine.retrain(Some(8)).await.unwrap();
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task should complete successfully");
    }

    // once trained, every call succeeds
    let before = log.len();
    engine.forecast("Haryana", "Gurgaon").await.unwrap();
    assert_eq!(log.len(), before + 1);
}

#[tokio::test]
#[ignore] // slow: many full forecasts
async fn test_forecast_latency_under_load() {
    let engine = Arc::new(build_engine(Arc::new(InMemoryPredictionLog::new())));
    engine.retrain(None).await.unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..50 {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move {
            let mut worst = Duration::ZERO;
            for _ in 0..10 {
                let start = Instant::now();
                engine.forecast("Uttar Pradesh", "Lucknow").await.unwrap();
                worst = worst.max(start.elapsed());
                tokio::time::sleep(Duration::from_millis(5 + (i % 10) as u64)).await;
            }
            worst
        });
    }

    let mut max_latency = Duration::ZERO;
    while let Some(result) = tasks.join_next().await {
        max_latency = max_latency.max(result.unwrap());
    }
    println!("Forecast latency under load - Max: {:?}", max_latency);
    assert!(
        max_latency < Duration::from_secs(5),
        "forecast latency exceeded 5s: {:?}",
        max_latency
    );
}
