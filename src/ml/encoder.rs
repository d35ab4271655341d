//! Feature encoding: categorical codebooks plus z-score scaling.
//!
//! A [`FeatureEncoder`] only exists in fitted form. It is built once from the
//! training corpus and then used unchanged for every inference vector, so
//! training and inference see bit-identical transforms.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::schema::{estimate_industrial_load, CalendarFields, FeatureInputs, FeatureVector};
use super::synthetic::TrainingRow;
use super::ModelError;
use crate::domain::WeatherObservation;

/// Outcome of a codebook lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeLookup {
    Found(u32),
    /// Label was not in the training corpus
    Fallback,
}

impl CodeLookup {
    pub const FALLBACK_CODE: u32 = 0;

    pub fn code(self) -> u32 {
        match self {
            CodeLookup::Found(code) => code,
            CodeLookup::Fallback => Self::FALLBACK_CODE,
        }
    }

    pub fn is_fallback(self) -> bool {
        matches!(self, CodeLookup::Fallback)
    }
}

/// Label to integer mapping, assigned in sorted label order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codebook {
    labels: Vec<String>,
}

impl Codebook {
    pub fn fit<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let unique: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            labels: unique.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn lookup(&self, label: &str) -> CodeLookup {
        match self.labels.binary_search_by(|l| l.as_str().cmp(label)) {
            Ok(idx) => CodeLookup::Found(idx as u32),
            Err(_) => CodeLookup::Fallback,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Per-feature mean and spread fitted on the training matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl ScalerState {
    pub fn fit(rows: &[FeatureVector]) -> Result<Self, ModelError> {
        let first = rows
            .first()
            .ok_or_else(|| ModelError::Training("cannot fit scaler on empty matrix".to_string()))?;
        let n_features = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; n_features];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row.values()) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut variances = vec![0.0; n_features];
        for row in rows {
            for ((var, v), m) in variances.iter_mut().zip(row.values()).zip(&means) {
                *var += (v - m).powi(2);
            }
        }

        let scales = variances
            .into_iter()
            .map(|var| {
                let std = (var / n).sqrt();
                // constant columns pass through centred but unscaled
                if std.is_finite() && std > 1e-12 {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self { means, scales })
    }

    pub fn transform(&self, features: &FeatureVector) -> Result<FeatureVector, ModelError> {
        self.check_len(features)?;
        let values = features
            .values()
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (mean, scale))| (v - mean) / scale)
            .collect();
        FeatureVector::new(values)
    }

    pub fn inverse_transform(&self, scaled: &FeatureVector) -> Result<FeatureVector, ModelError> {
        self.check_len(scaled)?;
        let values = scaled
            .values()
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (mean, scale))| v * scale + mean)
            .collect();
        FeatureVector::new(values)
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    fn check_len(&self, features: &FeatureVector) -> Result<(), ModelError> {
        if features.len() != self.means.len() {
            return Err(ModelError::InvalidFeatures(format!(
                "scaler fitted on {} features, got {}",
                self.means.len(),
                features.len()
            )));
        }
        Ok(())
    }
}

/// An inference input after encoding, with the lookup outcomes kept visible
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedInput {
    /// Unscaled vector (codes, calendar fields and weather as given)
    pub raw: FeatureVector,
    /// Vector fed to the regressors
    pub scaled: FeatureVector,
    pub state: CodeLookup,
    pub district: CodeLookup,
    pub calendar: CalendarFields,
    pub industrial_load: f64,
}

/// Fitted codebooks and scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    states: Codebook,
    districts: Codebook,
    scaler: ScalerState,
}

impl FeatureEncoder {
    pub fn fit(rows: &[TrainingRow]) -> Result<Self, ModelError> {
        if rows.is_empty() {
            return Err(ModelError::Training(
                "cannot fit encoder on empty corpus".to_string(),
            ));
        }

        let states = Codebook::fit(rows.iter().map(|r| r.state.as_str()));
        let districts = Codebook::fit(rows.iter().map(|r| r.district.as_str()));
        let raw: Vec<FeatureVector> = rows
            .iter()
            .map(|r| raw_row(&states, &districts, r))
            .collect();
        let scaler = ScalerState::fit(&raw)?;

        Ok(Self {
            states,
            districts,
            scaler,
        })
    }

    /// Scaled training matrix in row order
    pub fn transform_rows(&self, rows: &[TrainingRow]) -> Result<Vec<FeatureVector>, ModelError> {
        rows.iter()
            .map(|r| self.scaler.transform(&raw_row(&self.states, &self.districts, r)))
            .collect()
    }

    /// Encode a live request. Unknown labels map to the fallback code.
    pub fn encode(
        &self,
        state: &str,
        district: &str,
        timestamp: &DateTime<FixedOffset>,
        weather: &WeatherObservation,
    ) -> Result<EncodedInput, ModelError> {
        let state_lookup = self.states.lookup(state);
        let district_lookup = self.districts.lookup(district);
        let calendar = CalendarFields::at(timestamp);
        let industrial_load = estimate_industrial_load(state, &calendar);

        let raw = FeatureInputs {
            state_code: state_lookup.code(),
            district_code: district_lookup.code(),
            calendar,
            weather: *weather,
            industrial_load,
        }
        .to_vector();
        let scaled = self.scaler.transform(&raw)?;

        Ok(EncodedInput {
            raw,
            scaled,
            state: state_lookup,
            district: district_lookup,
            calendar,
            industrial_load,
        })
    }

    /// Scaled feature vector for a live request
    pub fn transform(
        &self,
        state: &str,
        district: &str,
        timestamp: &DateTime<FixedOffset>,
        weather: &WeatherObservation,
    ) -> Result<FeatureVector, ModelError> {
        Ok(self.encode(state, district, timestamp, weather)?.scaled)
    }

    pub fn states(&self) -> &Codebook {
        &self.states
    }

    pub fn districts(&self) -> &Codebook {
        &self.districts
    }

    pub fn scaler(&self) -> &ScalerState {
        &self.scaler
    }
}

fn raw_row(states: &Codebook, districts: &Codebook, row: &TrainingRow) -> FeatureVector {
    FeatureInputs {
        state_code: states.lookup(&row.state).code(),
        district_code: districts.lookup(&row.district).code(),
        calendar: CalendarFields::new(row.hour, row.day_of_week, row.month),
        weather: WeatherObservation::new(
            row.temperature,
            row.humidity,
            row.wind_speed,
            row.rainfall,
        ),
        industrial_load: row.industrial_load,
    }
    .to_vector()
}
