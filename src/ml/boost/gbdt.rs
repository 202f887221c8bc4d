use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{base_margin, logistic_grad_hess};
use crate::ml::{
    Classifier, Estimator, FitError, ParamError, ParamSet, check_training_data, sigmoid,
};

/// Depth-wise boosting with exact greedy split search.
#[derive(Debug, Clone, PartialEq)]
pub struct GbdtParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// L2 penalty on leaf values.
    pub reg_lambda: f64,
    /// Minimum hessian sum per child.
    pub min_child_weight: f64,
    /// Minimum loss reduction required to split.
    pub gamma: f64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.3,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            gamma: 0.0,
        }
    }
}

impl GbdtParams {
    pub const NAMES: [&'static str; 6] = [
        "n_estimators",
        "max_depth",
        "learning_rate",
        "reg_lambda",
        "min_child_weight",
        "gamma",
    ];

    pub fn from_params(params: &ParamSet) -> Result<Self, ParamError> {
        params.check_known(&Self::NAMES)?;
        let defaults = Self::default();
        let reg_lambda = params.float("reg_lambda", defaults.reg_lambda)?;
        let min_child_weight = params.float("min_child_weight", defaults.min_child_weight)?;
        let gamma = params.float("gamma", defaults.gamma)?;
        for (name, value) in [
            ("reg_lambda", reg_lambda),
            ("min_child_weight", min_child_weight),
            ("gamma", gamma),
        ] {
            if value < 0.0 {
                return Err(ParamError::Invalid {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: "must be >= 0",
                });
            }
        }
        Ok(Self {
            n_estimators: params.usize("n_estimators", defaults.n_estimators)?.max(1),
            max_depth: params.usize("max_depth", defaults.max_depth)?,
            learning_rate: params.positive_float("learning_rate", defaults.learning_rate)?,
            reg_lambda,
            min_child_weight,
            gamma,
        })
    }
}

impl Estimator for GbdtParams {
    type Model = GbdtModel;

    fn fit(&self, x: ArrayView2<'_, f64>, y: &[u8]) -> Result<GbdtModel, FitError> {
        check_training_data(x, y)?;
        let n = x.nrows();
        let base_margin = base_margin(y, None);
        let mut margins = vec![base_margin; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut trees = Vec::with_capacity(self.n_estimators);
        for _round in 0..self.n_estimators {
            logistic_grad_hess(y, &margins, &mut grad, &mut hess);
            let mut builder = TreeBuilder {
                params: self,
                x: x.view(),
                grad: &grad,
                hess: &hess,
                nodes: Vec::new(),
            };
            builder.build((0..n).collect(), 0);
            let tree = RegTree {
                nodes: builder.nodes,
            };
            for (i, margin) in margins.iter_mut().enumerate() {
                *margin += tree.predict_row(x.row(i));
            }
            trees.push(tree);
        }
        Ok(GbdtModel {
            n_features: x.ncols(),
            base_margin,
            trees,
        })
    }
}

/// Regression tree node; leaf values already include the learning rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegTree {
    pub nodes: Vec<RegNode>,
}

impl RegTree {
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(RegNode::Leaf { value }) => return *value,
                Some(RegNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtModel {
    pub n_features: usize,
    pub base_margin: f64,
    pub trees: Vec<RegTree>,
}

impl GbdtModel {
    pub fn margin(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.base_margin
            + self
                .trees
                .iter()
                .map(|tree| tree.predict_row(row))
                .sum::<f64>()
    }
}

impl Classifier for GbdtModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        sigmoid(self.margin(row))
    }
}

struct TreeBuilder<'a> {
    params: &'a GbdtParams,
    x: ArrayView2<'a, f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    nodes: Vec<RegNode>,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let node_idx = self.nodes.len();
        let (g, h) = self.sums(&indices);
        let lambda = self.params.reg_lambda;
        let value = if h + lambda > 0.0 {
            -g / (h + lambda) * self.params.learning_rate
        } else {
            0.0
        };
        self.nodes.push(RegNode::Leaf { value });
        if depth >= self.params.max_depth || indices.len() < 2 {
            return node_idx;
        }
        let Some(split) = self.best_split(&indices, g, h) else {
            return node_idx;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[[i, split.feature]] <= split.threshold);
        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);
        self.nodes[node_idx] = RegNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }

    fn sums(&self, indices: &[usize]) -> (f64, f64) {
        indices
            .iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + self.grad[i], h + self.hess[i]))
    }

    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<Split> {
        let lambda = self.params.reg_lambda;
        let min_child = self.params.min_child_weight;
        let parent = g * g / (h + lambda);
        let mut best: Option<Split> = None;
        let mut order = indices.to_vec();
        for feature in 0..self.x.ncols() {
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            let (mut gl, mut hl) = (0.0, 0.0);
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                gl += self.grad[i];
                hl += self.hess[i];
                let here = self.x[[i, feature]];
                let next = self.x[[order[pos + 1], feature]];
                if here == next {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < min_child || hr < min_child {
                    continue;
                }
                let gain = 0.5 * (gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent)
                    - self.params.gamma;
                if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(Split {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn parses_grid_parameters() {
        let params = ParamSet::new()
            .with("n_estimators", 200i64)
            .with("max_depth", 5i64)
            .with("learning_rate", 0.05);
        let parsed = GbdtParams::from_params(&params).unwrap();
        assert_eq!(parsed.n_estimators, 200);
        assert_eq!(parsed.max_depth, 5);
        assert_eq!(parsed.learning_rate, 0.05);
        assert!(GbdtParams::from_params(&ParamSet::new().with("gamma", -1.0)).is_err());
    }

    #[test]
    fn boosting_reduces_training_loss() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0]];
        let y = [0, 0, 0, 0, 1, 1, 1, 1];
        let logloss = |model: &GbdtModel| {
            y.iter()
                .enumerate()
                .map(|(i, &label)| {
                    let p = model.predict_proba_row(x.row(i));
                    if label == 1 { -p.ln() } else { -(1.0 - p).ln() }
                })
                .sum::<f64>()
        };
        let params = |rounds| GbdtParams {
            n_estimators: rounds,
            min_child_weight: 0.0,
            ..GbdtParams::default()
        };
        let few = params(2).fit(x.view(), &y).unwrap();
        let many = params(20).fit(x.view(), &y).unwrap();
        assert!(logloss(&many) < logloss(&few));
        assert_eq!(many.predict(x.view()), y.to_vec());
    }

    #[test]
    fn max_depth_zero_yields_constant_trees() {
        let x = array![[0.0], [1.0]];
        let params = GbdtParams {
            max_depth: 0,
            n_estimators: 3,
            ..GbdtParams::default()
        };
        let model = params.fit(x.view(), &[0, 1]).unwrap();
        assert!(model.trees.iter().all(|tree| tree.nodes.len() == 1));
    }
}
