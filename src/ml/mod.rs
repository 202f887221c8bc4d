//! Binary classifiers for tabular feature matrices.
//!
//! Every family follows the same shape: a parameter struct built from a [`ParamSet`]
//! implements [`Estimator`], and fitting produces a serializable model implementing
//! [`Classifier`]. [`ModelFamily`] ties the families together in their fixed selection
//! order and [`FittedModel`] is the persisted, family-tagged union.

pub mod boost;
pub mod forest;
pub mod knn;
pub mod logreg;
pub mod metrics;
pub mod params;
pub mod search;
pub mod tree;

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use params::{ParamError, ParamSet, ParamValue, SearchGrid};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error(transparent)]
    Params(#[from] ParamError),
    #[error("training data is empty")]
    Empty,
    #[error("{rows} feature rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("label {0} is not 0 or 1")]
    InvalidLabel(u8),
    #[error("feature matrix contains non-finite values")]
    NonFinite,
    #[error("{rows} rows cannot be split into {folds} folds")]
    TooFewRows { rows: usize, folds: usize },
}

/// Capability shared by every fitted model.
pub trait Classifier {
    /// Number of input features the model was fit on.
    fn n_features(&self) -> usize;

    /// Probability of the positive class for one row.
    fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> f64;

    /// Positive when the probability is strictly above one half.
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> u8 {
        u8::from(self.predict_proba_row(row) > 0.5)
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Vec<u8> {
        x.axis_iter(Axis(0)).map(|row| self.predict_row(row)).collect()
    }
}

/// Unfitted, parameterized learner.
pub trait Estimator {
    type Model: Classifier;

    fn fit(&self, x: ArrayView2<'_, f64>, y: &[u8]) -> Result<Self::Model, FitError>;
}

/// Classifier families in their fixed enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    LogisticRegression,
    DecisionTree,
    RandomForest,
    KNeighbors,
    /// Depth-wise Newton-boosted trees.
    GradientBoosting,
    /// Symmetric (oblivious) boosted trees over quantized borders.
    ObliviousBoosting,
}

impl ModelFamily {
    /// Selection order; ties in accuracy go to the earlier family.
    pub const ALL: [ModelFamily; 6] = [
        ModelFamily::LogisticRegression,
        ModelFamily::DecisionTree,
        ModelFamily::RandomForest,
        ModelFamily::KNeighbors,
        ModelFamily::GradientBoosting,
        ModelFamily::ObliviousBoosting,
    ];

    /// The families named in `families`, once each, in [`ModelFamily::ALL`] order.
    pub fn in_selection_order(families: &[ModelFamily]) -> Vec<ModelFamily> {
        ModelFamily::ALL
            .into_iter()
            .filter(|family| families.contains(family))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::LogisticRegression => "logistic_regression",
            ModelFamily::DecisionTree => "decision_tree",
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::KNeighbors => "k_neighbors",
            ModelFamily::GradientBoosting => "gradient_boosting",
            ModelFamily::ObliviousBoosting => "oblivious_boosting",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFamily::LogisticRegression => "Logistic Regression",
            ModelFamily::DecisionTree => "Decision Tree",
            ModelFamily::RandomForest => "Random Forest",
            ModelFamily::KNeighbors => "K-Neighbors",
            ModelFamily::GradientBoosting => "Gradient Boosting",
            ModelFamily::ObliviousBoosting => "Oblivious Boosting",
        }
    }

    /// Built-in search grid.
    pub fn default_grid(&self) -> SearchGrid {
        match self {
            ModelFamily::LogisticRegression => SearchGrid::new()
                .with("c", [0.01, 0.1, 1.0, 10.0, 100.0])
                .with("solver", ["batch", "stochastic"]),
            ModelFamily::DecisionTree => SearchGrid::new()
                .with(
                    "max_depth",
                    [
                        ParamValue::from("none"),
                        5i64.into(),
                        10i64.into(),
                        20i64.into(),
                        50i64.into(),
                    ],
                )
                .with("min_samples_split", [2i64, 5, 10]),
            ModelFamily::RandomForest => SearchGrid::new()
                .with("n_estimators", [100i64, 200, 500])
                .with(
                    "max_depth",
                    [
                        ParamValue::from("none"),
                        5i64.into(),
                        10i64.into(),
                        20i64.into(),
                    ],
                ),
            ModelFamily::KNeighbors => SearchGrid::new().with("n_neighbors", [3i64, 5, 7, 10, 15]),
            ModelFamily::GradientBoosting => SearchGrid::new()
                .with("n_estimators", [100i64, 200, 500])
                .with("max_depth", [3i64, 5, 10])
                .with("learning_rate", [0.01, 0.05, 0.1, 0.2]),
            ModelFamily::ObliviousBoosting => SearchGrid::new()
                .with("iterations", [100i64, 300])
                .with("learning_rate", [0.05, 0.1])
                .with("depth", [4i64, 6])
                .with("l2_leaf_reg", [1.0, 3.0])
                .with("border_count", [32i64, 128])
                .with("bagging_temperature", [0.0, 1.0]),
        }
    }

    /// Build this family's estimator from `params` and fit it.
    pub fn fit(
        &self,
        params: &ParamSet,
        seed: u64,
        x: ArrayView2<'_, f64>,
        y: &[u8],
    ) -> Result<FittedModel, FitError> {
        Ok(match self {
            ModelFamily::LogisticRegression => FittedModel::LogisticRegression(
                logreg::LogRegParams::from_params(params, seed)?.fit(x, y)?,
            ),
            ModelFamily::DecisionTree => FittedModel::DecisionTree(
                tree::TreeParams::from_params(params, seed)?.fit(x, y)?,
            ),
            ModelFamily::RandomForest => FittedModel::RandomForest(
                forest::ForestParams::from_params(params, seed)?.fit(x, y)?,
            ),
            ModelFamily::KNeighbors => {
                FittedModel::KNeighbors(knn::KnnParams::from_params(params)?.fit(x, y)?)
            }
            ModelFamily::GradientBoosting => FittedModel::GradientBoosting(
                boost::GbdtParams::from_params(params)?.fit(x, y)?,
            ),
            ModelFamily::ObliviousBoosting => FittedModel::ObliviousBoosting(
                boost::ObliviousParams::from_params(params, seed)?.fit(x, y)?,
            ),
        })
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ModelFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == value)
            .ok_or_else(|| format!("unknown model family {value:?}"))
    }
}

/// Any fitted model, tagged by family for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "model", rename_all = "snake_case")]
pub enum FittedModel {
    LogisticRegression(logreg::LogRegModel),
    DecisionTree(tree::TreeModel),
    RandomForest(forest::ForestModel),
    KNeighbors(knn::KnnModel),
    GradientBoosting(boost::GbdtModel),
    ObliviousBoosting(boost::ObliviousModel),
}

impl FittedModel {
    pub fn family(&self) -> ModelFamily {
        match self {
            FittedModel::LogisticRegression(_) => ModelFamily::LogisticRegression,
            FittedModel::DecisionTree(_) => ModelFamily::DecisionTree,
            FittedModel::RandomForest(_) => ModelFamily::RandomForest,
            FittedModel::KNeighbors(_) => ModelFamily::KNeighbors,
            FittedModel::GradientBoosting(_) => ModelFamily::GradientBoosting,
            FittedModel::ObliviousBoosting(_) => ModelFamily::ObliviousBoosting,
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            FittedModel::LogisticRegression(model) => model,
            FittedModel::DecisionTree(model) => model,
            FittedModel::RandomForest(model) => model,
            FittedModel::KNeighbors(model) => model,
            FittedModel::GradientBoosting(model) => model,
            FittedModel::ObliviousBoosting(model) => model,
        }
    }
}

impl Classifier for FittedModel {
    fn n_features(&self) -> usize {
        self.inner().n_features()
    }

    fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.inner().predict_proba_row(row)
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> u8 {
        self.inner().predict_row(row)
    }
}

/// Validate shapes and labels before any family starts fitting.
pub fn check_training_data(x: ArrayView2<'_, f64>, y: &[u8]) -> Result<(), FitError> {
    if x.nrows() == 0 || y.is_empty() {
        return Err(FitError::Empty);
    }
    if x.nrows() != y.len() {
        return Err(FitError::LengthMismatch {
            rows: x.nrows(),
            labels: y.len(),
        });
    }
    if let Some(label) = y.iter().find(|label| **label > 1) {
        return Err(FitError::InvalidLabel(*label));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }
    Ok(())
}

/// Per-class weights `n / (n_present * n_class)`, where `n_present` counts the classes
/// that occur in `y`; a missing class gets weight 0.
pub fn balanced_class_weights(y: &[u8]) -> [f64; 2] {
    let mut counts = [0usize; 2];
    for &label in y {
        counts[usize::from(label.min(1))] += 1;
    }
    let present = counts.iter().filter(|&&count| count > 0).count() as f64;
    let total = y.len() as f64;
    counts.map(|count| {
        if count == 0 {
            0.0
        } else {
            total / (present * count as f64)
        }
    })
}

/// Numerically stable logistic function.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn families_parse_from_their_config_names() {
        for family in ModelFamily::ALL {
            assert_eq!(family.as_str().parse::<ModelFamily>(), Ok(family));
        }
        assert!("xgboost".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn selection_order_follows_enumeration_and_dedups() {
        let picked = ModelFamily::in_selection_order(&[
            ModelFamily::KNeighbors,
            ModelFamily::DecisionTree,
            ModelFamily::KNeighbors,
        ]);
        assert_eq!(picked, [ModelFamily::DecisionTree, ModelFamily::KNeighbors]);
        assert!(ModelFamily::in_selection_order(&[]).is_empty());
    }

    #[test]
    fn default_grids_expand() {
        for family in ModelFamily::ALL {
            let candidates = family.default_grid().candidates().unwrap();
            assert!(!candidates.is_empty(), "{family}");
        }
        assert_eq!(ModelFamily::LogisticRegression.default_grid().len(), 10);
    }

    #[test]
    fn balanced_weights_follow_class_frequency() {
        let weights = balanced_class_weights(&[0, 0, 0, 1]);
        assert!((weights[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((weights[1] - 2.0).abs() < 1e-12);
        assert_eq!(balanced_class_weights(&[0, 0]), [1.0, 0.0]);
        assert_eq!(balanced_class_weights(&[1, 1, 1]), [0.0, 1.0]);
    }

    #[test]
    fn training_data_checks() {
        let x = array![[1.0], [2.0]];
        assert_eq!(check_training_data(x.view(), &[0]), Err(FitError::LengthMismatch { rows: 2, labels: 1 }));
        assert_eq!(check_training_data(x.view(), &[0, 2]), Err(FitError::InvalidLabel(2)));
        let bad = array![[f64::NAN], [2.0]];
        assert_eq!(check_training_data(bad.view(), &[0, 1]), Err(FitError::NonFinite));
        assert!(check_training_data(x.view(), &[0, 1]).is_ok());
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(1000.0) <= 1.0);
        assert!(sigmoid(-1000.0) >= 0.0);
        assert!(sigmoid(-1000.0).is_finite());
    }

    #[test]
    fn every_family_separates_a_simple_problem() {
        let x = array![
            [-2.0, 0.0],
            [-1.5, 1.0],
            [-1.0, 0.0],
            [-1.2, 1.0],
            [1.0, 0.0],
            [1.4, 1.0],
            [2.0, 0.0],
            [1.7, 1.0],
        ];
        let y = [0, 0, 0, 0, 1, 1, 1, 1];
        let small = |family: ModelFamily| match family {
            ModelFamily::RandomForest => ParamSet::new().with("n_estimators", 15i64),
            ModelFamily::KNeighbors => ParamSet::new().with("n_neighbors", 3i64),
            ModelFamily::GradientBoosting => ParamSet::new().with("n_estimators", 20i64),
            ModelFamily::ObliviousBoosting => ParamSet::new()
                .with("iterations", 30i64)
                .with("depth", 2i64)
                .with("bagging_temperature", 0.0),
            _ => ParamSet::new(),
        };
        for family in ModelFamily::ALL {
            let model = family.fit(&small(family), 7, x.view(), &y).unwrap();
            assert_eq!(model.family(), family);
            assert_eq!(model.n_features(), 2);
            assert_eq!(model.predict(x.view()), y.to_vec(), "{family}");
            let probe = array![3.0, 0.5];
            assert_eq!(model.predict_row(probe.view()), 1, "{family}");
        }
    }
}
