use ndarray::ArrayView2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::{LogRegModel, LogRegParams, Solver};
use crate::ml::{Estimator, FitError, balanced_class_weights, check_training_data, sigmoid};

impl Estimator for LogRegParams {
    type Model = LogRegModel;

    /// Minimize `mean_w(logloss) + ||w||^2 / (2 * C * sum_w)`; the bias is not penalized.
    fn fit(&self, x: ArrayView2<'_, f64>, y: &[u8]) -> Result<LogRegModel, FitError> {
        check_training_data(x, y)?;
        let n = x.nrows();
        let dim = x.ncols();
        let class_weights = if self.balance_classes {
            balanced_class_weights(y)
        } else {
            [1.0, 1.0]
        };
        let sample_weights: Vec<f64> = y.iter().map(|&label| class_weights[label as usize]).collect();
        let total_weight: f64 = sample_weights.iter().sum();
        let l2 = 1.0 / (self.c * total_weight.max(1.0));

        let mut weights = vec![0.0f64; dim];
        let mut bias = 0.0f64;
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let batch_size = match self.solver {
            Solver::Batch => n,
            Solver::Stochastic => self.batch_size.clamp(1, n),
        };

        for epoch in 0..self.max_iter {
            if self.solver == Solver::Stochastic {
                indices.shuffle(&mut rng);
            }
            let lr = match self.solver {
                Solver::Batch => self.learning_rate,
                Solver::Stochastic => self.learning_rate / (1.0 + 0.01 * epoch as f64),
            };
            let mut largest_step = 0.0f64;
            for chunk in indices.chunks(batch_size) {
                let mut grad_w = vec![0.0f64; dim];
                let mut grad_b = 0.0f64;
                let mut batch_weight = 0.0f64;
                for &idx in chunk {
                    let weight = sample_weights[idx];
                    if weight == 0.0 {
                        continue;
                    }
                    let row = x.row(idx);
                    let z = weights.iter().zip(row.iter()).map(|(w, v)| w * v).sum::<f64>() + bias;
                    let diff = (sigmoid(z) - f64::from(y[idx])) * weight;
                    for (g, v) in grad_w.iter_mut().zip(row.iter()) {
                        *g += diff * v;
                    }
                    grad_b += diff;
                    batch_weight += weight;
                }
                if batch_weight == 0.0 {
                    continue;
                }
                let inv = 1.0 / batch_weight;
                // Implicit step on the penalty keeps small `C` stable at any rate.
                let shrink = 1.0 / (1.0 + lr * l2);
                for (w, g) in weights.iter_mut().zip(&grad_w) {
                    let updated = (*w - lr * g * inv) * shrink;
                    largest_step = largest_step.max((updated - *w).abs());
                    *w = updated;
                }
                let step = lr * grad_b * inv;
                bias -= step;
                largest_step = largest_step.max(step.abs());
            }
            if self.solver == Solver::Batch && largest_step < self.tolerance {
                break;
            }
        }

        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(FitError::NonFinite);
        }
        Ok(LogRegModel { weights, bias })
    }
}
