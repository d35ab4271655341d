//! SmartCore tree ensembles.
//!
//! - [`BaggedForest`]: bootstrap-aggregated regression trees
//!   (SmartCore's `RandomForestRegressor`)
//! - [`BoostedTrees`]: least-squares gradient boosting, fitting SmartCore
//!   regression trees to the running residuals

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

use super::models::Regressor;
use super::{ModelError, ModelType};

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Bagged forest hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParameters {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParameters {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 5,
            seed: 42,
        }
    }
}

impl ForestParameters {
    fn to_smartcore(self, n_features: usize) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: Some(self.max_depth),
            min_samples_leaf: 1,
            min_samples_split: self.min_samples_split,
            n_trees: self.n_trees,
            m: Some(n_features), // every split considers all features
            keep_samples: false,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BaggedForest {
    params: ForestParameters,
    model: Forest,
}

impl BaggedForest {
    pub fn fit(
        x: &DenseMatrix<f64>,
        y: &[f64],
        params: ForestParameters,
    ) -> Result<Self, ModelError> {
        check_training_shape(x, y)?;
        let (_, n_features) = x.shape();

        let model: Forest = RandomForestRegressor::fit(x, &y.to_vec(), params.to_smartcore(n_features))
            .map_err(|e| ModelError::Training(format!("random forest: {:?}", e)))?;

        Ok(Self { params, model })
    }

    pub fn params(&self) -> &ForestParameters {
        &self.params
    }
}

impl Regressor for BaggedForest {
    fn predict_matrix(&self, x: &DenseMatrix<f64>) -> Result<Vec<f64>, ModelError> {
        self.model
            .predict(x)
            .map_err(|e| ModelError::Prediction(format!("random forest: {:?}", e)))
    }

    fn model_type(&self) -> ModelType {
        ModelType::RandomForest
    }
}

/// Gradient boosting hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParameters {
    pub n_stages: usize,
    pub max_depth: u16,
    pub learning_rate: f64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingParameters {
    fn default() -> Self {
        Self {
            n_stages: 100,
            max_depth: 6,
            learning_rate: 0.1,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl BoostingParameters {
    fn tree_parameters(&self) -> DecisionTreeRegressorParameters {
        DecisionTreeRegressorParameters::default()
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
    }
}

/// Additive tree model: `init + learning_rate * Σ stage(x)`
#[derive(Debug, Serialize, Deserialize)]
pub struct BoostedTrees {
    params: BoostingParameters,
    init: f64,
    stages: Vec<Tree>,
}

impl BoostedTrees {
    pub fn fit(
        x: &DenseMatrix<f64>,
        y: &[f64],
        params: BoostingParameters,
    ) -> Result<Self, ModelError> {
        check_training_shape(x, y)?;
        if params.n_stages == 0 {
            return Err(ModelError::Training(
                "gradient boosting needs at least one stage".to_string(),
            ));
        }
        if !(params.learning_rate > 0.0 && params.learning_rate <= 1.0) {
            return Err(ModelError::Training(format!(
                "learning rate must be in (0, 1], got {}",
                params.learning_rate
            )));
        }

        let init = y.iter().sum::<f64>() / y.len() as f64;
        let mut fitted = vec![init; y.len()];
        let mut stages: Vec<Tree> = Vec::with_capacity(params.n_stages);
        let tree_params = params.tree_parameters();

        for stage in 0..params.n_stages {
            let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(t, f)| t - f).collect();
            let tree: Tree = DecisionTreeRegressor::fit(x, &residuals, tree_params.clone())
                .map_err(|e| {
                    ModelError::Training(format!("boosting stage {}: {:?}", stage, e))
                })?;
            let update = tree
                .predict(x)
                .map_err(|e| ModelError::Training(format!("boosting stage {}: {:?}", stage, e)))?;
            for (f, u) in fitted.iter_mut().zip(&update) {
                *f += params.learning_rate * u;
            }
            stages.push(tree);
        }

        Ok(Self {
            params,
            init,
            stages,
        })
    }

    pub fn params(&self) -> &BoostingParameters {
        &self.params
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }
}

impl Regressor for BoostedTrees {
    fn predict_matrix(&self, x: &DenseMatrix<f64>) -> Result<Vec<f64>, ModelError> {
        let (n_rows, _) = x.shape();
        let mut out = vec![self.init; n_rows];
        for tree in &self.stages {
            let update = tree
                .predict(x)
                .map_err(|e| ModelError::Prediction(format!("gradient boosting: {:?}", e)))?;
            for (o, u) in out.iter_mut().zip(&update) {
                *o += self.params.learning_rate * u;
            }
        }
        Ok(out)
    }

    fn model_type(&self) -> ModelType {
        ModelType::GradientBoosting
    }
}

fn check_training_shape(x: &DenseMatrix<f64>, y: &[f64]) -> Result<(), ModelError> {
    let (n_rows, _) = x.shape();
    if n_rows == 0 || y.is_empty() {
        return Err(ModelError::Training("cannot train on empty dataset".to_string()));
    }
    if n_rows != y.len() {
        return Err(ModelError::Training(format!(
            "feature and target count mismatch: {} rows, {} targets",
            n_rows,
            y.len()
        )));
    }
    Ok(())
}
