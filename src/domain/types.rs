use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Point-in-time weather used as model input.
///
/// The record looks the same whether it came from a live lookup or from the
/// fallback defaults; the model never distinguishes the two.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    /// Air temperature (°C)
    pub temperature: f64,
    /// Relative humidity (%)
    pub humidity: f64,
    /// Wind speed (km/h)
    pub wind_speed: f64,
    /// Precipitation (mm)
    pub rainfall: f64,
}

impl WeatherObservation {
    pub fn new(temperature: f64, humidity: f64, wind_speed: f64, rainfall: f64) -> Self {
        Self {
            temperature,
            humidity,
            wind_speed,
            rainfall,
        }
    }

    /// Record substituted when the weather lookup fails
    pub fn fallback() -> Self {
        Self::new(28.0, 65.0, 12.0, 0.0)
    }
}

impl Default for WeatherObservation {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Coarse Indian calendar season used as a model feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Season {
    Summer,
    Monsoon,
    #[serde(rename = "Post-monsoon")]
    #[strum(serialize = "Post-monsoon")]
    PostMonsoon,
    Winter,
}

impl Season {
    /// March-May summer, June-September monsoon, October-November
    /// post-monsoon, everything else winter.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Summer,
            6..=9 => Season::Monsoon,
            10 | 11 => Season::PostMonsoon,
            _ => Season::Winter,
        }
    }

    /// Numeric feature value (1-4)
    pub fn code(self) -> u8 {
        match self {
            Season::Summer => 1,
            Season::Monsoon => 2,
            Season::PostMonsoon => 3,
            Season::Winter => 4,
        }
    }
}

/// Snapshot of the inputs a prediction was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionParameters {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub rainfall: f64,
    pub industrial_load: f64,
    pub hour: u32,
    pub is_peak_hour: bool,
    pub is_weekend: bool,
    pub season: Season,
}

/// Raw outputs of the two regressors before blending
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentEstimates {
    pub bagged_mw: f64,
    pub boosted_mw: f64,
}

/// One demand estimate. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Blended point estimate (MW)
    pub estimate_mw: f64,
    /// Agreement between the two regressors, in [0.5, 1.0].
    ///
    /// This is a disagreement heuristic, not a calibrated interval.
    pub confidence: f64,
    pub components: ComponentEstimates,
    pub parameters: PredictionParameters,
    /// Wall-clock time the estimate applies to
    pub timestamp: DateTime<FixedOffset>,
}
