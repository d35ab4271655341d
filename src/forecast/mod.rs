//! Forecasting: current weather, immediate estimate and hourly rollout

pub mod engine;
pub mod rollout;
pub mod weather;

pub use engine::{DemandForecast, EngineSettings, ForecastEngine};
pub use rollout::{ForecastRoller, PerturbationScale, Rollout, RolloutStep, StepOutcome, DEFAULT_STEPS};
pub use weather::{
    LiveWeather, OpenMeteoClient, StaticWeatherSource, WeatherOrigin, WeatherReport, WeatherSource,
};
