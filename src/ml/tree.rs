//! Weighted CART decision tree using Gini impurity.

use ndarray::{ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{
    Classifier, Estimator, FitError, ParamError, ParamSet, balanced_class_weights,
    check_training_data,
};

const MIN_IMPURITY_DECREASE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    /// `None` grows until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all of them.
    pub max_features: Option<usize>,
    pub balance_classes: bool,
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            balance_classes: true,
            seed: 42,
        }
    }
}

impl TreeParams {
    pub const NAMES: [&'static str; 4] =
        ["max_depth", "min_samples_split", "min_samples_leaf", "class_weight"];

    pub fn from_params(params: &ParamSet, seed: u64) -> Result<Self, ParamError> {
        params.check_known(&Self::NAMES)?;
        let defaults = Self::default();
        Ok(Self {
            max_depth: params.optional_usize("max_depth", defaults.max_depth)?,
            min_samples_split: params
                .usize("min_samples_split", defaults.min_samples_split)?
                .max(2),
            min_samples_leaf: params
                .usize("min_samples_leaf", defaults.min_samples_leaf)?
                .max(1),
            balance_classes: params.choice("class_weight", &["balanced", "none"], "balanced")?
                == "balanced",
            seed,
            ..defaults
        })
    }

    /// Grow a tree from explicit per-sample weights. Zero-weight samples are ignored.
    pub(crate) fn grow(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[u8],
        sample_weights: &[f64],
        rng: &mut StdRng,
    ) -> TreeModel {
        let indices: Vec<usize> = (0..x.nrows()).filter(|&i| sample_weights[i] > 0.0).collect();
        let mut grower = Grower {
            params: self,
            x: x.view(),
            y,
            weights: sample_weights,
            rng,
            nodes: Vec::new(),
        };
        grower.build(indices, 0);
        TreeModel {
            n_features: x.ncols(),
            nodes: grower.nodes,
        }
    }
}

impl Estimator for TreeParams {
    type Model = TreeModel;

    fn fit(&self, x: ArrayView2<'_, f64>, y: &[u8]) -> Result<TreeModel, FitError> {
        check_training_data(x, y)?;
        let class_weights = if self.balance_classes {
            balanced_class_weights(y)
        } else {
            [1.0, 1.0]
        };
        let weights: Vec<f64> = y.iter().map(|&label| class_weights[label as usize]).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok(self.grow(x, y, &weights, &mut rng))
    }
}

/// Flat node storage; the root is node 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        /// Weighted fraction of positive samples.
        proba: f64,
    },
    Split {
        feature: usize,
        /// Rows with `value <= threshold` go left.
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeModel {
    pub n_features: usize,
    pub nodes: Vec<Node>,
}

impl TreeModel {
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }
}

impl Classifier for TreeModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { proba }) => return *proba,
                Some(Node::Split {
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

struct Grower<'a, 'r> {
    params: &'a TreeParams,
    x: ArrayView2<'a, f64>,
    y: &'a [u8],
    weights: &'a [f64],
    rng: &'r mut StdRng,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

impl Grower<'_, '_> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let node_idx = self.nodes.len();
        let (w0, w1) = self.class_weight_sums(&indices);
        let total = w0 + w1;
        let proba = if total > 0.0 { w1 / total } else { 0.0 };
        self.nodes.push(Node::Leaf { proba });

        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        let pure = w0 == 0.0 || w1 == 0.0;
        if depth_reached || pure || indices.len() < self.params.min_samples_split {
            return node_idx;
        }
        let Some(split) = self.best_split(&indices, w0, w1) else {
            return node_idx;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[[i, split.feature]] <= split.threshold);
        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);
        self.nodes[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }

    fn class_weight_sums(&self, indices: &[usize]) -> (f64, f64) {
        indices.iter().fold((0.0, 0.0), |(w0, w1), &i| {
            if self.y[i] == 1 {
                (w0, w1 + self.weights[i])
            } else {
                (w0 + self.weights[i], w1)
            }
        })
    }

    /// Feature visiting order and how many must be visited before stopping. With a feature
    /// budget the order is a random permutation and the search keeps going past the budget
    /// until some valid split has been found.
    fn feature_order(&mut self) -> (Vec<usize>, usize) {
        let d = self.x.ncols();
        match self.params.max_features {
            Some(k) if k < d => (
                rand::seq::index::sample(&mut *self.rng, d, d).into_vec(),
                k.max(1),
            ),
            _ => ((0..d).collect(), d),
        }
    }

    fn best_split(&mut self, indices: &[usize], w0: f64, w1: f64) -> Option<BestSplit> {
        let total = w0 + w1;
        let parent = gini(w0, w1) * total;
        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<BestSplit> = None;
        let mut order = indices.to_vec();
        let (features, budget) = self.feature_order();
        for (visited, feature) in features.into_iter().enumerate() {
            if visited >= budget && best.is_some() {
                break;
            }
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            let (mut left0, mut left1) = (0.0, 0.0);
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                if self.y[i] == 1 {
                    left1 += self.weights[i];
                } else {
                    left0 += self.weights[i];
                }
                let here = self.x[[i, feature]];
                let next = self.x[[order[pos + 1], feature]];
                let left_count = pos + 1;
                if here == next || left_count < min_leaf || order.len() - left_count < min_leaf {
                    continue;
                }
                let (right0, right1) = (w0 - left0, w1 - left1);
                let children = gini(left0, left1) * (left0 + left1)
                    + gini(right0, right1) * (right0 + right1);
                let decrease = (parent - children) / total;
                if decrease > MIN_IMPURITY_DECREASE
                    && best.as_ref().is_none_or(|b| decrease > b.decrease)
                {
                    best = Some(BestSplit {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        decrease,
                    });
                }
            }
        }
        best
    }
}

fn gini(w0: f64, w1: f64) -> f64 {
    let total = w0 + w1;
    if total <= 0.0 {
        return 0.0;
    }
    let p0 = w0 / total;
    let p1 = w1 / total;
    1.0 - p0 * p0 - p1 * p1
}
