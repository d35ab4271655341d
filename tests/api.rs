//! HTTP routes against an in-process router.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use india_power_forecast::{
    api,
    app::AppState,
    config::Config,
    domain::WeatherObservation,
    forecast::{EngineSettings, ForecastEngine, StaticWeatherSource},
    ml::{
        BoostingParameters, EnsembleParameters, EnsemblePredictor, ForestParameters,
        SyntheticGenerator, TrainedModelPair,
    },
    repo::InMemoryPredictionLog,
};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;

fn small_params() -> EnsembleParameters {
    EnsembleParameters {
        forest: ForestParameters {
            n_trees: 10,
            max_depth: 6,
            min_samples_split: 5,
            seed: 42,
        },
        boosting: BoostingParameters {
            n_stages: 20,
            max_depth: 3,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn shared_pair() -> Arc<TrainedModelPair> {
    static PAIR: OnceLock<Arc<TrainedModelPair>> = OnceLock::new();
    PAIR.get_or_init(|| {
        let rows = SyntheticGenerator::seeded(42).generate(1_000);
        Arc::new(TrainedModelPair::train(&rows, &small_params()).unwrap())
    })
    .clone()
}

fn app(trained: bool) -> Router {
    let predictor = if trained {
        EnsemblePredictor::with_model(small_params(), shared_pair())
    } else {
        EnsemblePredictor::new(small_params())
    };
    let engine = ForecastEngine::new(
        Arc::new(predictor),
        Arc::new(StaticWeatherSource::new(WeatherObservation::new(
            33.0, 55.0, 6.0, 0.0,
        ))),
        Arc::new(InMemoryPredictionLog::new()),
        EngineSettings {
            training_rows: 400,
            rollout_seed: Some(1),
            ..Default::default()
        },
    );
    api::router(AppState::from_parts(Config::default(), engine))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn states_lists_roster() {
    let app = app(true);
    let (status, body) = send(&app, get("/api/states")).await;

    assert_eq!(status, StatusCode::OK);
    let states = body.as_object().unwrap();
    assert_eq!(states.len(), 10);
    assert_eq!(states["Delhi"].as_array().unwrap().len(), 5);
    assert!(states["Delhi"]
        .as_array()
        .unwrap()
        .contains(&Value::from("New Delhi")));
}

#[tokio::test]
async fn state_detail_and_unknown_state() {
    let app = app(true);
    let (status, body) = send(&app, get("/api/states/Gujarat")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["base_consumption_mw"], 13000.0);

    let (status, body) = send(&app, get("/api/states/Atlantis")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn predict_returns_estimate_and_rollout() {
    let app = app(true);
    let (status, body) = send(
        &app,
        post_json(
            "/api/predict",
            serde_json::json!({ "state": "Delhi", "district": "New Delhi" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["state"], "Delhi");
    assert!(body["current_prediction"].as_f64().unwrap() > 0.0);
    let confidence = body["confidence_score"].as_f64().unwrap();
    assert!((0.5..=1.0).contains(&confidence));
    assert_eq!(body["weather_data"]["observation"]["temperature"], 33.0);
    assert_eq!(body["weather_data"]["origin"]["kind"], "static");

    let hours = body["predictions_24h"].as_array().unwrap();
    assert_eq!(hours.len(), 24);
    assert_eq!(hours[0]["hour_offset"], 1);
    assert_eq!(hours[23]["hour_offset"], 24);
    assert!(body["degraded_offsets"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn predict_is_recorded_in_history() {
    let app = app(true);
    let request = || {
        post_json(
            "/api/predict",
            serde_json::json!({ "state": "Karnataka", "district": "Mysore" }),
        )
    };
    send(&app, request()).await;
    send(&app, request()).await;

    let (status, body) = send(&app, get("/api/history/Karnataka/Mysore?days=7")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["temperature"], 33.0);

    let (_, other) = send(&app, get("/api/history/Karnataka/Hubli")).await;
    assert!(other.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let app = app(true);
    let (status, body) = send(
        &app,
        post_json(
            "/api/predict",
            serde_json::json!({ "state": "", "district": "New Delhi" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");

    let (status, _) = send(&app, get("/api/history/Delhi/New%20Delhi?days=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn untrained_service_reports_unavailable() {
    let app = app(false);

    let (status, body) = send(
        &app,
        post_json(
            "/api/predict",
            serde_json::json!({ "state": "Delhi", "district": "New Delhi" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "ModelUnavailable");

    let (status, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");

    let (status, _) = send(&app, get("/api/model")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn retrain_makes_service_ready() {
    let app = app(false);

    let (status, body) = send(&app, post_json("/api/model/retrain", serde_json::json!({ "seed": 3 }))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let bundle_id = body["bundle_id"].clone();
    assert_eq!(body["feature_names"].as_array().unwrap().len(), 15);
    assert_eq!(body["weights"]["bagged"], 0.6);

    let (status, health) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["checks"]["model"]["bundle_id"], bundle_id);

    let (status, info) = send(&app, get("/api/model")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["bundle_id"], bundle_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_retrains_succeed_or_conflict() {
    let app = app(true);

    let mut tasks = tokio::task::JoinSet::new();
    for seed in 0..6u64 {
        let app = app.clone();
        tasks.spawn(async move {
            send(&app, post_json("/api/model/retrain", serde_json::json!({ "seed": seed }))).await
        });
    }

    let mut trained = 0;
    while let Some(result) = tasks.join_next().await {
        let (status, body) = result.unwrap();
        match status {
            StatusCode::OK => trained += 1,
            StatusCode::CONFLICT => assert_eq!(body["error"], "Conflict"),
            other => panic!("unexpected status {}: {}", other, body),
        }
    }
    assert!(trained >= 1);

    let (status, _) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
}
