use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{base_margin, logistic_grad_hess};
use crate::ml::{
    Classifier, Estimator, FitError, ParamError, ParamSet, check_training_data, sigmoid,
};

/// Symmetric-tree boosting over quantized feature borders.
#[derive(Debug, Clone, PartialEq)]
pub struct ObliviousParams {
    pub iterations: usize,
    pub learning_rate: f64,
    pub depth: usize,
    pub l2_leaf_reg: f64,
    /// Maximum number of borders per feature.
    pub border_count: usize,
    /// Exponent of the Bayesian bootstrap weights; 0 disables bagging.
    pub bagging_temperature: f64,
    pub seed: u64,
}

impl Default for ObliviousParams {
    fn default() -> Self {
        Self {
            iterations: 500,
            learning_rate: 0.05,
            depth: 6,
            l2_leaf_reg: 3.0,
            border_count: 254,
            bagging_temperature: 1.0,
            seed: 42,
        }
    }
}

/// Deepest symmetric tree; leaf counts grow as `2^depth`.
const MAX_DEPTH: usize = 16;

impl ObliviousParams {
    pub const NAMES: [&'static str; 6] = [
        "iterations",
        "learning_rate",
        "depth",
        "l2_leaf_reg",
        "border_count",
        "bagging_temperature",
    ];

    pub fn from_params(params: &ParamSet, seed: u64) -> Result<Self, ParamError> {
        params.check_known(&Self::NAMES)?;
        let defaults = Self::default();
        let depth = params.usize("depth", defaults.depth)?;
        if depth == 0 || depth > MAX_DEPTH {
            return Err(ParamError::Invalid {
                name: "depth".to_string(),
                value: depth.to_string(),
                reason: "must be between 1 and 16",
            });
        }
        let l2_leaf_reg = params.float("l2_leaf_reg", defaults.l2_leaf_reg)?;
        let bagging_temperature =
            params.float("bagging_temperature", defaults.bagging_temperature)?;
        for (name, value) in [
            ("l2_leaf_reg", l2_leaf_reg),
            ("bagging_temperature", bagging_temperature),
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
            iterations: params.usize("iterations", defaults.iterations)?.max(1),
            learning_rate: params.positive_float("learning_rate", defaults.learning_rate)?,
            depth,
            l2_leaf_reg,
            border_count: params
                .usize("border_count", defaults.border_count)?
                .clamp(1, 65_534),
            bagging_temperature,
            seed,
        })
    }
}

impl Estimator for ObliviousParams {
    type Model = ObliviousModel;

    fn fit(&self, x: ArrayView2<'_, f64>, y: &[u8]) -> Result<ObliviousModel, FitError> {
        check_training_data(x, y)?;
        let n = x.nrows();
        let d = x.ncols();
        let borders: Vec<Vec<f64>> = (0..d)
            .map(|j| select_borders(x.column(j).iter().copied(), self.border_count))
            .collect();
        // bins[j][i]: number of borders of feature j strictly below x[i, j]
        let bins: Vec<Vec<u16>> = borders
            .iter()
            .enumerate()
            .map(|(j, feature_borders)| {
                x.column(j)
                    .iter()
                    .map(|&v| feature_borders.partition_point(|&b| b < v) as u16)
                    .collect()
            })
            .collect();

        let base_margin = base_margin(y, None);
        let mut margins = vec![base_margin; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut weights = vec![1.0; n];
        let mut leaf_of = vec![0usize; n];
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.iterations);

        for _iteration in 0..self.iterations {
            logistic_grad_hess(y, &margins, &mut grad, &mut hess);
            if self.bagging_temperature > 0.0 {
                for w in weights.iter_mut() {
                    let u: f64 = rng.random_range(f64::EPSILON..1.0);
                    *w = (-u.ln()).powf(self.bagging_temperature);
                }
            }
            leaf_of.fill(0);
            let mut splits = Vec::with_capacity(self.depth);
            for level in 0..self.depth {
                let Some((feature, bin)) =
                    self.best_level_split(&bins, &borders, &grad, &hess, &weights, &leaf_of, level)
                else {
                    break;
                };
                for (i, leaf) in leaf_of.iter_mut().enumerate() {
                    if bins[feature][i] as usize > bin {
                        *leaf |= 1 << level;
                    }
                }
                splits.push(ObliviousSplit {
                    feature,
                    border: borders[feature][bin],
                });
            }

            let n_leaves = 1usize << splits.len();
            let mut g_sum = vec![0.0; n_leaves];
            let mut h_sum = vec![0.0; n_leaves];
            for i in 0..n {
                g_sum[leaf_of[i]] += weights[i] * grad[i];
                h_sum[leaf_of[i]] += weights[i] * hess[i];
            }
            let leaf_values: Vec<f64> = g_sum
                .iter()
                .zip(&h_sum)
                .map(|(g, h)| {
                    let denom = h + self.l2_leaf_reg;
                    // Leaves no row reaches keep a zero value.
                    if denom > 0.0 {
                        -g / denom * self.learning_rate
                    } else {
                        0.0
                    }
                })
                .collect();
            for (i, margin) in margins.iter_mut().enumerate() {
                *margin += leaf_values[leaf_of[i]];
            }
            trees.push(ObliviousTree {
                splits,
                leaf_values,
            });
        }

        Ok(ObliviousModel {
            n_features: d,
            base_margin,
            trees,
        })
    }
}

impl ObliviousParams {
    /// Pick the (feature, border) pair applied to every current leaf that maximizes the
    /// summed Newton score of the resulting children.
    #[allow(clippy::too_many_arguments)]
    fn best_level_split(
        &self,
        bins: &[Vec<u16>],
        borders: &[Vec<f64>],
        grad: &[f64],
        hess: &[f64],
        weights: &[f64],
        leaf_of: &[usize],
        level: usize,
    ) -> Option<(usize, usize)> {
        let n_leaves = 1usize << level;
        let lambda = self.l2_leaf_reg;
        let mut best: Option<(f64, usize, usize)> = None;
        for (feature, feature_borders) in borders.iter().enumerate() {
            let n_bins = feature_borders.len() + 1;
            if n_bins < 2 {
                continue;
            }
            let mut g_hist = vec![0.0; n_leaves * n_bins];
            let mut h_hist = vec![0.0; n_leaves * n_bins];
            for (i, &bin) in bins[feature].iter().enumerate() {
                let slot = leaf_of[i] * n_bins + bin as usize;
                g_hist[slot] += weights[i] * grad[i];
                h_hist[slot] += weights[i] * hess[i];
            }
            let mut g_left = vec![0.0; n_leaves];
            let mut h_left = vec![0.0; n_leaves];
            let g_total: Vec<f64> = (0..n_leaves)
                .map(|leaf| g_hist[leaf * n_bins..(leaf + 1) * n_bins].iter().sum())
                .collect();
            let h_total: Vec<f64> = (0..n_leaves)
                .map(|leaf| h_hist[leaf * n_bins..(leaf + 1) * n_bins].iter().sum())
                .collect();
            // Border b sends bins 0..=b left.
            for border in 0..feature_borders.len() {
                let mut score = 0.0;
                for leaf in 0..n_leaves {
                    g_left[leaf] += g_hist[leaf * n_bins + border];
                    h_left[leaf] += h_hist[leaf * n_bins + border];
                    let gr = g_total[leaf] - g_left[leaf];
                    let hr = h_total[leaf] - h_left[leaf];
                    score += newton_score(g_left[leaf], h_left[leaf], lambda)
                        + newton_score(gr, hr, lambda);
                }
                if best.is_none_or(|(best_score, _, _)| score > best_score + 1e-12) {
                    best = Some((score, feature, border));
                }
            }
        }
        best.map(|(_, feature, border)| (feature, border))
    }
}

/// `g^2 / (h + lambda)`, zero for a side no row reaches.
fn newton_score(g: f64, h: f64, lambda: f64) -> f64 {
    let denom = h + lambda;
    if denom > 0.0 { g * g / denom } else { 0.0 }
}

/// Candidate borders: midpoints between distinct values, thinned to quantiles when there are
/// more than `max_borders` of them.
fn select_borders(values: impl Iterator<Item = f64>, max_borders: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    let midpoints: Vec<f64> = sorted.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0).collect();
    if midpoints.len() <= max_borders {
        return midpoints;
    }
    let mut picked: Vec<f64> = (1..=max_borders)
        .map(|k| {
            let pos = k * midpoints.len() / (max_borders + 1);
            midpoints[pos.min(midpoints.len() - 1)]
        })
        .collect();
    picked.dedup();
    picked
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObliviousSplit {
    pub feature: usize,
    /// Rows with `value > border` set this level's bit.
    pub border: f64,
}

/// One symmetric tree: every level applies the same split to all nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObliviousTree {
    pub splits: Vec<ObliviousSplit>,
    /// `2^splits.len()` values, already scaled by the learning rate.
    pub leaf_values: Vec<f64>,
}

impl ObliviousTree {
    pub fn leaf_index(&self, row: ArrayView1<'_, f64>) -> usize {
        self.splits
            .iter()
            .enumerate()
            .fold(0, |idx, (level, split)| {
                let value = row.get(split.feature).copied().unwrap_or(0.0);
                if value > split.border {
                    idx | (1 << level)
                } else {
                    idx
                }
            })
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.leaf_values
            .get(self.leaf_index(row))
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObliviousModel {
    pub n_features: usize,
    pub base_margin: f64,
    pub trees: Vec<ObliviousTree>,
}

impl ObliviousModel {
    pub fn margin(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.base_margin + self.trees.iter().map(|tree| tree.predict_row(row)).sum::<f64>()
    }
}

impl Classifier for ObliviousModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        sigmoid(self.margin(row))
    }
}
