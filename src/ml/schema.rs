//! Feature schema shared by training and inference.
//!
//! The vector layout is fixed. Changing it invalidates every persisted
//! bundle, since the scaler statistics and both regressors are indexed by
//! position.

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter};

use super::ModelError;
use crate::domain::{region, Season, WeatherObservation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCount)]
pub enum Feature {
    StateCode,
    DistrictCode,
    Hour,
    DayOfWeek,
    Month,
    Temperature,
    Humidity,
    WindSpeed,
    Rainfall,
    IndustrialLoad,
    TemperatureSquared,
    HumidityTemperature,
    IsPeakHour,
    IsWeekend,
    SeasonCode,
}

pub const FEATURE_COUNT: usize = Feature::COUNT;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "state_encoded",
    "district_encoded",
    "hour",
    "day_of_week",
    "month",
    "temperature",
    "humidity",
    "wind_speed",
    "rainfall",
    "industrial_load",
    "temp_squared",
    "humidity_temp",
    "is_peak_hour",
    "is_weekend",
    "season",
];

impl Feature {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        FEATURE_NAMES[self.index()]
    }
}

pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|n| n.to_string()).collect()
}

/// Ordered feature values in schema order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Result<Self, ModelError> {
        if values.len() != FEATURE_COUNT {
            return Err(ModelError::InvalidFeatures(format!(
                "expected {} features, got {}",
                FEATURE_COUNT,
                values.len()
            )));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub fn is_peak_hour(hour: u32) -> bool {
    (6..=9).contains(&hour) || (18..=22).contains(&hour)
}

/// Night hours for the industrial load estimate
pub fn is_night_hour(hour: u32) -> bool {
    hour >= 22 || hour <= 6
}

/// `day_of_week` counts from Monday = 0
pub fn is_weekend(day_of_week: u32) -> bool {
    day_of_week >= 5
}

/// Calendar fields derived from a local wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    pub hour: u32,
    pub day_of_week: u32,
    pub month: u32,
}

impl CalendarFields {
    pub fn new(hour: u32, day_of_week: u32, month: u32) -> Self {
        Self {
            hour,
            day_of_week,
            month,
        }
    }

    pub fn at(timestamp: &DateTime<FixedOffset>) -> Self {
        Self::new(
            timestamp.hour(),
            timestamp.weekday().num_days_from_monday(),
            timestamp.month(),
        )
    }

    pub fn is_peak_hour(&self) -> bool {
        is_peak_hour(self.hour)
    }

    pub fn is_weekend(&self) -> bool {
        is_weekend(self.day_of_week)
    }

    pub fn season(&self) -> Season {
        Season::from_month(self.month)
    }
}

/// Industrial load factor assumed for a live request.
///
/// Requests carry no industrial signal, so it is derived from the state's
/// industrial base, cut on weekends and at night.
pub fn estimate_industrial_load(state: &str, calendar: &CalendarFields) -> f64 {
    let mut load = region::industrial_base(state);
    if calendar.is_weekend() {
        load *= 0.7;
    }
    if is_night_hour(calendar.hour) {
        load *= 0.6;
    }
    load
}

/// Unscaled inputs for one vector
#[derive(Debug, Clone, Copy)]
pub struct FeatureInputs {
    pub state_code: u32,
    pub district_code: u32,
    pub calendar: CalendarFields,
    pub weather: WeatherObservation,
    pub industrial_load: f64,
}

impl FeatureInputs {
    /// Build the raw vector, deriving the interaction and calendar flags
    pub fn to_vector(&self) -> FeatureVector {
        let w = &self.weather;
        let c = &self.calendar;
        let values = vec![
            self.state_code as f64,
            self.district_code as f64,
            c.hour as f64,
            c.day_of_week as f64,
            c.month as f64,
            w.temperature,
            w.humidity,
            w.wind_speed,
            w.rainfall,
            self.industrial_load,
            w.temperature * w.temperature,
            w.humidity * w.temperature,
            if c.is_peak_hour() { 1.0 } else { 0.0 },
            if c.is_weekend() { 1.0 } else { 0.0 },
            c.season().code() as f64,
        ];
        FeatureVector { values }
    }
}
