//! L2-regularized logistic regression.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use super::{Classifier, ParamError, ParamSet, sigmoid};

mod train;

/// Optimizer used to minimize the penalized log-loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Solver {
    /// Full-batch gradient descent.
    Batch,
    /// Shuffled mini-batch gradient descent.
    Stochastic,
}

/// Training options for [`LogRegModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogRegParams {
    /// Inverse regularization strength.
    pub c: f64,
    pub solver: Solver,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub balance_classes: bool,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for LogRegParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            solver: Solver::Batch,
            max_iter: 300,
            learning_rate: 0.5,
            batch_size: 32,
            balance_classes: true,
            tolerance: 1e-6,
            seed: 42,
        }
    }
}

impl LogRegParams {
    pub const NAMES: [&'static str; 5] = ["c", "solver", "max_iter", "learning_rate", "class_weight"];

    pub fn from_params(params: &ParamSet, seed: u64) -> Result<Self, ParamError> {
        params.check_known(&Self::NAMES)?;
        let defaults = Self::default();
        let solver = match params.choice("solver", &["batch", "stochastic"], "batch")? {
            "stochastic" => Solver::Stochastic,
            _ => Solver::Batch,
        };
        Ok(Self {
            c: params.positive_float("c", defaults.c)?,
            solver,
            max_iter: params.usize("max_iter", defaults.max_iter)?.max(1),
            learning_rate: params.positive_float("learning_rate", defaults.learning_rate)?,
            balance_classes: params.choice("class_weight", &["balanced", "none"], "balanced")?
                == "balanced",
            seed,
            ..defaults
        })
    }
}

/// Fitted linear model over the preprocessed feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRegModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogRegModel {
    pub fn decision_function(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.weights
            .iter()
            .zip(row.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias
    }
}

impl Classifier for LogRegModel {
    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        sigmoid(self.decision_function(row))
    }
}
