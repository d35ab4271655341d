//! Short-term electricity demand forecasting for Indian states and districts.
//!
//! A bagged forest and a boosted tree ensemble, trained on a synthetic corpus,
//! are blended into one estimate. The service layer adds live weather, an
//! hourly rollout and a prediction log behind an HTTP API.

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod forecast;
pub mod ml;
pub mod repo;
pub mod telemetry;
