//! Bagged ensemble of randomized CART trees.

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{TreeModel, TreeParams};
use super::{
    Classifier, Estimator, FitError, ParamError, ParamSet, balanced_class_weights,
    check_training_data,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub bootstrap: bool,
    pub balance_classes: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            bootstrap: true,
            balance_classes: true,
            seed: 42,
        }
    }
}

impl ForestParams {
    pub const NAMES: [&'static str; 4] =
        ["n_estimators", "max_depth", "min_samples_split", "class_weight"];

    pub fn from_params(params: &ParamSet, seed: u64) -> Result<Self, ParamError> {
        params.check_known(&Self::NAMES)?;
        let defaults = Self::default();
        Ok(Self {
            n_estimators: params.usize("n_estimators", defaults.n_estimators)?.max(1),
            max_depth: params.optional_usize("max_depth", defaults.max_depth)?,
            min_samples_split: params
                .usize("min_samples_split", defaults.min_samples_split)?
                .max(2),
            balance_classes: params.choice("class_weight", &["balanced", "none"], "balanced")?
                == "balanced",
            seed,
            ..defaults
        })
    }

    fn tree_params(&self, n_features: usize) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: 1,
            max_features: Some(sqrt_features(n_features)),
            balance_classes: self.balance_classes,
            seed: self.seed,
        }
    }
}

/// `floor(sqrt(d))`, at least one.
fn sqrt_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt().floor() as usize).max(1)
}

impl Estimator for ForestParams {
    type Model = ForestModel;

    fn fit(&self, x: ArrayView2<'_, f64>, y: &[u8]) -> Result<ForestModel, FitError> {
        check_training_data(x, y)?;
        let n = x.nrows();
        let class_weights = if self.balance_classes {
            balanced_class_weights(y)
        } else {
            [1.0, 1.0]
        };
        let tree_params = self.tree_params(x.ncols());
        let mut master = StdRng::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let mut rng = StdRng::seed_from_u64(master.random::<u64>());
            let mut counts = vec![0u32; n];
            if self.bootstrap {
                for _ in 0..n {
                    counts[rng.random_range(0..n)] += 1;
                }
            } else {
                counts.fill(1);
            }
            let weights: Vec<f64> = counts
                .iter()
                .zip(y)
                .map(|(&count, &label)| f64::from(count) * class_weights[label as usize])
                .collect();
            trees.push(tree_params.grow(x, y, &weights, &mut rng));
        }
        Ok(ForestModel {
            n_features: x.ncols(),
            trees,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    pub n_features: usize,
    pub trees: Vec<TreeModel>,
}

impl Classifier for ForestModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    /// Mean of the member trees' probabilities.
    fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.predict_proba_row(row)).sum();
        sum / self.trees.len() as f64
    }
}
