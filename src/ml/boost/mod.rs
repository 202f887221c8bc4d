//! Newton-boosted tree ensembles for the logistic loss.
//!
//! Both variants start from the clamped log-odds of the training labels and add shrunken
//! tree outputs to the raw margin; the positive-class probability is `sigmoid(margin)`.

mod gbdt;
mod oblivious;

pub use gbdt::{GbdtModel, GbdtParams, RegNode, RegTree};
pub use oblivious::{ObliviousModel, ObliviousParams, ObliviousTree};

use super::sigmoid;

const MIN_BASE_PROBA: f64 = 1e-6;

/// Log-odds of the weighted positive rate, clamped away from 0 and 1.
fn base_margin(y: &[u8], weights: Option<&[f64]>) -> f64 {
    let (pos, total) = y.iter().enumerate().fold((0.0, 0.0), |(pos, total), (i, &label)| {
        let w = weights.map_or(1.0, |w| w[i]);
        (pos + w * f64::from(label), total + w)
    });
    if total <= 0.0 {
        return 0.0;
    }
    let p = (pos / total).clamp(MIN_BASE_PROBA, 1.0 - MIN_BASE_PROBA);
    (p / (1.0 - p)).ln()
}

/// First and second derivatives of the log-loss with respect to the margin.
fn logistic_grad_hess(y: &[u8], margins: &[f64], grad: &mut [f64], hess: &mut [f64]) {
    for (i, (&label, &margin)) in y.iter().zip(margins).enumerate() {
        let p = sigmoid(margin);
        grad[i] = p - f64::from(label);
        hess[i] = (p * (1.0 - p)).max(1e-16);
    }
}
