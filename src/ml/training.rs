//! Training dataset handling and hold-out evaluation.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{FeatureVector, ModelError, ValidationMetrics};

/// Scaled feature matrix with aligned targets
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    pub features: Vec<FeatureVector>,
    pub targets: Vec<f64>,
}

impl TrainingDataset {
    pub fn new(features: Vec<FeatureVector>, targets: Vec<f64>) -> Result<Self, ModelError> {
        if features.len() != targets.len() {
            return Err(ModelError::Training(format!(
                "feature and target count mismatch: {} features, {} targets",
                features.len(),
                targets.len()
            )));
        }
        Ok(Self { features, targets })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Shuffle rows with a fixed seed, then split into (train, hold-out).
    ///
    /// The hold-out share is `1 - train_ratio`; both sides are non-empty.
    pub fn shuffled_split(
        &self,
        train_ratio: f64,
        seed: u64,
    ) -> Result<(TrainingDataset, TrainingDataset), ModelError> {
        if train_ratio <= 0.0 || train_ratio >= 1.0 {
            return Err(ModelError::Training(
                "train ratio must be between 0 and 1".to_string(),
            ));
        }
        if self.len() < 2 {
            return Err(ModelError::Training(format!(
                "need at least 2 rows to split, got {}",
                self.len()
            )));
        }

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        let split_idx = ((self.len() as f64 * train_ratio).floor() as usize).clamp(1, self.len() - 1);
        let (train_idx, test_idx) = order.split_at(split_idx);

        Ok((self.select(train_idx), self.select(test_idx)))
    }

    fn select(&self, idx: &[usize]) -> TrainingDataset {
        TrainingDataset {
            features: idx.iter().map(|&i| self.features[i].clone()).collect(),
            targets: idx.iter().map(|&i| self.targets[i]).collect(),
        }
    }
}

/// Calculate validation metrics
pub fn calculate_metrics(predictions: &[f64], targets: &[f64]) -> Result<ValidationMetrics, ModelError> {
    if predictions.len() != targets.len() {
        return Err(ModelError::Training(
            "prediction and target count mismatch".to_string(),
        ));
    }

    if predictions.is_empty() {
        return Err(ModelError::Training("no predictions to evaluate".to_string()));
    }

    let n = predictions.len() as f64;

    let mae: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>()
        / n;

    let mse: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / n;
    let rmse = mse.sqrt();

    // averaged over rows with a non-zero target only
    let (ape_sum, ape_rows) = predictions
        .iter()
        .zip(targets.iter())
        .filter(|(_, t)| t.abs() > 1e-10)
        .fold((0.0, 0usize), |(sum, rows), (p, t)| {
            (sum + ((p - t) / t).abs() * 100.0, rows + 1)
        });
    let mape = if ape_rows == 0 {
        0.0
    } else {
        ape_sum / ape_rows as f64
    };

    let mean_target: f64 = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
    let ss_res: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (t - p).powi(2))
        .sum();

    let r2 = if ss_tot.abs() < 1e-10 {
        0.0
    } else {
        1.0 - (ss_res / ss_tot)
    };

    Ok(ValidationMetrics::new(mae, rmse, mape, r2))
}
