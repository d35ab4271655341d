//! Regressor seam shared by the two ensemble members.

use smartcore::linalg::basic::matrix::DenseMatrix;

use super::{FeatureVector, ModelError, ModelType};

/// A fitted regressor over scaled feature vectors
pub trait Regressor: Send + Sync {
    /// Predict one value per matrix row
    fn predict_matrix(&self, x: &DenseMatrix<f64>) -> Result<Vec<f64>, ModelError>;

    fn model_type(&self) -> ModelType;

    /// Predict a single vector
    fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        let x = to_matrix(std::slice::from_ref(features))?;
        self.predict_matrix(&x)?
            .first()
            .copied()
            .ok_or_else(|| ModelError::Prediction("model returned empty predictions".to_string()))
    }
}

/// Row-major dense matrix from feature vectors
pub fn to_matrix(rows: &[FeatureVector]) -> Result<DenseMatrix<f64>, ModelError> {
    let first = rows
        .first()
        .ok_or_else(|| ModelError::InvalidFeatures("empty feature matrix".to_string()))?;
    let n_features = first.len();

    let mut flat = Vec::with_capacity(rows.len() * n_features);
    for row in rows {
        if row.len() != n_features {
            return Err(ModelError::InvalidFeatures(
                "all feature vectors must have the same length".to_string(),
            ));
        }
        flat.extend_from_slice(row.values());
    }

    Ok(DenseMatrix::new(rows.len(), n_features, flat, false))
}
