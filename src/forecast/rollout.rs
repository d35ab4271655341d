//! Hour-by-hour demand rollout from a single weather observation.
//!
//! Step `k` runs the ensemble at `base_time + k hours` with the base weather
//! perturbed by Gaussian noise. Every step draws fresh noise around the base
//! observation; steps are not a cumulative random walk.

use chrono::{DateTime, Duration, FixedOffset};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{PredictionResult, WeatherObservation};
use crate::ml::TrainedModelPair;

pub const DEFAULT_STEPS: u32 = 24;

const MIN_HUMIDITY: f64 = 20.0;
const MAX_HUMIDITY: f64 = 100.0;

/// Standard deviation of the per-step noise, per weather field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerturbationScale {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub rainfall: f64,
}

impl Default for PerturbationScale {
    fn default() -> Self {
        Self {
            temperature: 2.0,
            humidity: 5.0,
            wind_speed: 3.0,
            rainfall: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Predicted(PredictionResult),
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RolloutStep {
    pub hour_offset: u32,
    pub timestamp: DateTime<FixedOffset>,
    /// Perturbed weather the step was evaluated with
    pub weather: WeatherObservation,
    pub outcome: StepOutcome,
}

impl RolloutStep {
    pub fn prediction(&self) -> Option<&PredictionResult> {
        match &self.outcome {
            StepOutcome::Predicted(p) => Some(p),
            StepOutcome::Failed { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failed { .. })
    }

    /// Estimate for display, with `sentinel` standing in for a failed step
    pub fn estimate_or(&self, sentinel: f64) -> f64 {
        self.prediction().map_or(sentinel, |p| p.estimate_mw)
    }
}

/// Ordered rollout steps, `hour_offset` 1..=n
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rollout {
    steps: Vec<RolloutStep>,
}

impl Rollout {
    pub fn steps(&self) -> &[RolloutStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Offsets whose prediction failed
    pub fn degraded_offsets(&self) -> Vec<u32> {
        self.steps
            .iter()
            .filter(|s| s.is_degraded())
            .map(|s| s.hour_offset)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| !s.is_degraded())
    }
}

/// Rollout driver with its own random source.
///
/// Unseeded by default so repeated forecasts vary; a seed makes the
/// perturbations reproducible. This source is independent of the one used
/// for synthetic training data.
pub struct ForecastRoller {
    scale: PerturbationScale,
    rng: Mutex<StdRng>,
}

impl ForecastRoller {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            scale: PerturbationScale::default(),
            rng: Mutex::new(rng),
        }
    }

    pub fn with_scale(mut self, scale: PerturbationScale) -> Self {
        self.scale = scale;
        self
    }

    pub fn scale(&self) -> &PerturbationScale {
        &self.scale
    }

    /// One independent draw around `base`, clamped to physical ranges
    pub fn perturb(&self, base: &WeatherObservation) -> WeatherObservation {
        perturb_with(&mut *self.rng.lock(), &self.scale, base)
    }

    /// Predict `steps` consecutive hours after `base_time`.
    ///
    /// Never fails as a whole: a step whose inference errors is recorded as
    /// [`StepOutcome::Failed`] and listed by [`Rollout::degraded_offsets`].
    pub fn rollout(
        &self,
        model: &TrainedModelPair,
        state: &str,
        district: &str,
        base_weather: &WeatherObservation,
        base_time: DateTime<FixedOffset>,
        steps: u32,
    ) -> Rollout {
        let draws: Vec<WeatherObservation> = {
            let mut rng = self.rng.lock();
            (0..steps)
                .map(|_| perturb_with(&mut *rng, &self.scale, base_weather))
                .collect()
        };

        let steps = (1..=steps)
            .zip(draws)
            .map(|(hour_offset, weather)| {
                let timestamp = base_time + Duration::hours(i64::from(hour_offset));
                let outcome = match model.infer(state, district, &timestamp, &weather) {
                    Ok(prediction) => StepOutcome::Predicted(prediction),
                    Err(e) => {
                        warn!(hour_offset, state, district, error = %e, "rollout step failed");
                        StepOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                };
                RolloutStep {
                    hour_offset,
                    timestamp,
                    weather,
                    outcome,
                }
            })
            .collect();

        Rollout { steps }
    }
}

impl Default for ForecastRoller {
    fn default() -> Self {
        Self::new(None)
    }
}

fn perturb_with<R: Rng + ?Sized>(
    rng: &mut R,
    scale: &PerturbationScale,
    base: &WeatherObservation,
) -> WeatherObservation {
    let mut noise = || -> f64 { rng.sample(StandardNormal) };
    WeatherObservation {
        temperature: base.temperature + scale.temperature * noise(),
        humidity: (base.humidity + scale.humidity * noise()).clamp(MIN_HUMIDITY, MAX_HUMIDITY),
        wind_speed: (base.wind_speed + scale.wind_speed * noise()).max(0.0),
        rainfall: (base.rainfall + scale.rainfall * noise()).max(0.0),
    }
}
