pub mod error;
pub mod health;
pub mod history;
pub mod model;
pub mod predict;
pub mod regions;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::{app::AppState, config::ServerConfig};

pub fn router(state: AppState) -> Router {
    let server = state.cfg.server.clone();

    let timed = Router::new()
        .route("/states", get(regions::list_states))
        .route("/states/:state", get(regions::get_state))
        .route("/predict", post(predict::predict))
        .route("/history/:state/:district", get(history::get_history))
        .route("/model", get(model::model_info))
        .route("/health", get(health::health_check))
        .layer(TimeoutLayer::new(Duration::from_secs(server.request_timeout_secs)));

    // training outlives the request timeout
    let untimed = Router::new().route("/model/retrain", post(model::retrain));

    Router::new()
        .nest("/api", timed.merge(untimed))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&server))
                .layer(axum::extract::DefaultBodyLimit::max(64 * 1024)),
        )
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origin = if server.cors_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = server
            .cors_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}
