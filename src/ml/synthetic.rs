//! Synthetic training corpus.
//!
//! Rows encode assumed Indian demand patterns: a hot pre-monsoon summer with
//! heavy AC load, mild winters, wet monsoon months, morning and evening peaks,
//! and reduced industrial load on weekends. Every row is drawn independently;
//! there is no temporal continuity between rows.

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Exp1, StandardNormal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::region::{self, StateProfile};

use super::schema::is_peak_hour;

/// One labelled observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub state: String,
    pub district: String,
    pub hour: u32,
    /// Monday = 0
    pub day_of_week: u32,
    pub month: u32,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub rainfall: f64,
    pub industrial_load: f64,
    pub power_consumption_mw: f64,
}

/// Generates labelled rows.
///
/// Seeded generators are fully reproducible; unseeded ones draw from OS
/// entropy.
pub struct SyntheticGenerator {
    rng: StdRng,
}

impl SyntheticGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    pub fn generate(&mut self, n: usize) -> Vec<TrainingRow> {
        (0..n).map(|_| self.next_row()).collect()
    }

    fn next_row(&mut self) -> TrainingRow {
        let states = region::states();
        let profile: &StateProfile = &states[self.rng.gen_range(0..states.len())];
        let district = profile.districts[self.rng.gen_range(0..profile.districts.len())];

        let hour: u32 = self.rng.gen_range(0..24);
        let day_of_week: u32 = self.rng.gen_range(0..7);
        let month: u32 = self.rng.gen_range(1..=12);

        let mut temperature = self.normal(28.0, 8.0);
        let mut humidity = self.rng.gen_range(30.0..90.0);
        let wind_speed = self.rng.gen_range(2.0..20.0);
        let mut rainfall = self.exponential(2.0);

        let mut base = profile.base_consumption_mw;
        match month {
            4..=6 => {
                temperature += self.normal(8.0, 2.0);
                base *= self.rng.gen_range(1.3..1.6);
            }
            12 | 1 | 2 => {
                temperature -= self.normal(5.0, 2.0);
                base *= self.rng.gen_range(0.8..1.1);
            }
            7..=9 => {
                rainfall += self.exponential(5.0);
                humidity += self.normal(10.0, 5.0);
                base *= self.rng.gen_range(0.9..1.2);
            }
            _ => {}
        }

        // peak takes precedence where it overlaps the night window (6h, 22h)
        let diurnal = if is_peak_hour(hour) {
            self.rng.gen_range(1.4..1.8)
        } else if hour >= 22 || hour <= 6 {
            self.rng.gen_range(0.6..0.8)
        } else {
            self.rng.gen_range(1.0..1.3)
        };

        let mut industrial_load = self.rng.gen_range(0.7..1.3);
        if day_of_week >= 5 {
            industrial_load *= 0.7;
        }

        let consumption = base
            * diurnal
            * industrial_load
            * climate_factor(temperature)
            * self.rng.gen_range(0.9..1.1);

        TrainingRow {
            state: profile.name.to_string(),
            district: district.name.to_string(),
            hour,
            day_of_week,
            month,
            temperature: round_to(temperature, 2),
            humidity: round_to(humidity, 2),
            wind_speed: round_to(wind_speed, 2),
            rainfall: round_to(rainfall, 2),
            industrial_load: round_to(industrial_load, 3),
            power_consumption_mw: round_to(consumption, 2),
        }
    }

    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        mean + std_dev * z
    }

    fn exponential(&mut self, mean: f64) -> f64 {
        let e: f64 = self.rng.sample(Exp1);
        mean * e
    }
}

/// Cooling above 30°C and heating below 15°C both raise demand
pub fn climate_factor(temperature: f64) -> f64 {
    if temperature > 30.0 {
        1.0 + (temperature - 30.0) * 0.05
    } else if temperature < 15.0 {
        1.0 + (15.0 - temperature) * 0.03
    } else {
        1.0
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRanges {
    pub temperature: Option<ValueRange>,
    pub humidity: Option<ValueRange>,
    pub wind_speed: Option<ValueRange>,
    pub rainfall: Option<ValueRange>,
}

/// Corpus statistics, logged after generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_rows: usize,
    pub avg_consumption_by_state: BTreeMap<String, f64>,
    pub weather_ranges: WeatherRanges,
}

impl DatasetSummary {
    pub fn from_rows(rows: &[TrainingRow]) -> Self {
        let avg_consumption_by_state = rows
            .iter()
            .into_group_map_by(|r| r.state.clone())
            .into_iter()
            .map(|(state, group)| {
                let mean = group.iter().map(|r| r.power_consumption_mw).sum::<f64>()
                    / group.len() as f64;
                (state, round_to(mean, 2))
            })
            .collect();

        let range = |f: fn(&TrainingRow) -> f64| {
            rows.iter()
                .map(f)
                .minmax_by(|a, b| a.total_cmp(b))
                .into_option()
                .map(|(min, max)| ValueRange { min, max })
        };

        Self {
            total_rows: rows.len(),
            avg_consumption_by_state,
            weather_ranges: WeatherRanges {
                temperature: range(|r| r.temperature),
                humidity: range(|r| r.humidity),
                wind_speed: range(|r| r.wind_speed),
                rainfall: range(|r| r.rainfall),
            },
        }
    }
}
