//! Brute-force k-nearest-neighbours with uniform voting.

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{Classifier, Estimator, FitError, ParamError, ParamSet, check_training_data};

#[derive(Debug, Clone, PartialEq)]
pub struct KnnParams {
    pub n_neighbors: usize,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self { n_neighbors: 5 }
    }
}

impl KnnParams {
    pub const NAMES: [&'static str; 1] = ["n_neighbors"];

    pub fn from_params(params: &ParamSet) -> Result<Self, ParamError> {
        params.check_known(&Self::NAMES)?;
        let n_neighbors = params.usize("n_neighbors", Self::default().n_neighbors)?;
        if n_neighbors == 0 {
            return Err(ParamError::Invalid {
                name: "n_neighbors".to_string(),
                value: "0".to_string(),
                reason: "must be >= 1",
            });
        }
        Ok(Self { n_neighbors })
    }
}

impl Estimator for KnnParams {
    type Model = KnnModel;

    fn fit(&self, x: ArrayView2<'_, f64>, y: &[u8]) -> Result<KnnModel, FitError> {
        check_training_data(x, y)?;
        Ok(KnnModel {
            n_features: x.ncols(),
            n_neighbors: self.n_neighbors.min(x.nrows()),
            points: x.iter().copied().collect(),
            labels: y.to_vec(),
        })
    }
}

/// Memorized training set. `k` is clamped to the number of stored rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnModel {
    pub n_features: usize,
    pub n_neighbors: usize,
    /// Row-major training features.
    pub points: Vec<f64>,
    pub labels: Vec<u8>,
}

impl KnnModel {
    /// Indices of the `k` closest stored rows; equal distances favour the earlier row.
    pub fn neighbors(&self, row: ArrayView1<'_, f64>) -> Vec<usize> {
        if self.n_features == 0 {
            return (0..self.n_neighbors.min(self.labels.len())).collect();
        }
        let mut distances: Vec<(f64, usize)> = self
            .points
            .chunks_exact(self.n_features)
            .enumerate()
            .map(|(idx, point)| {
                let dist = point
                    .iter()
                    .zip(row.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>();
                (dist, idx)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        distances
            .into_iter()
            .take(self.n_neighbors)
            .map(|(_, idx)| idx)
            .collect()
    }
}

impl Classifier for KnnModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    /// Fraction of positive labels among the nearest neighbours.
    fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let neighbors = self.neighbors(row);
        if neighbors.is_empty() {
            return 0.0;
        }
        let positives = neighbors.iter().filter(|&&idx| self.labels[idx] == 1).count();
        positives as f64 / neighbors.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn votes_among_nearest_rows() {
        let x = array![[0.0, 0.0], [0.1, 0.0], [0.0, 0.2], [5.0, 5.0], [5.1, 5.0]];
        let y = [0, 0, 0, 1, 1];
        let model = KnnParams { n_neighbors: 3 }.fit(x.view(), &y).unwrap();
        let near_origin = array![0.2, 0.1];
        assert_eq!(model.predict_proba_row(near_origin.view()), 0.0);
        let far = array![4.0, 4.0];
        assert!((model.predict_proba_row(far.view()) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(model.predict_row(far.view()), 1);
    }

    #[test]
    fn k_is_clamped_to_training_size() {
        let x = array![[0.0], [1.0]];
        let model = KnnParams { n_neighbors: 15 }.fit(x.view(), &[0, 1]).unwrap();
        assert_eq!(model.n_neighbors, 2);
        assert_eq!(model.neighbors(array![0.9].view()), vec![1, 0]);
    }

    #[test]
    fn ties_prefer_earlier_rows() {
        let x = array![[1.0], [-1.0], [1.0]];
        let model = KnnParams { n_neighbors: 1 }.fit(x.view(), &[1, 0, 0]).unwrap();
        assert_eq!(model.neighbors(array![0.0].view()), vec![0]);
    }

    #[test]
    fn zero_neighbors_is_invalid() {
        let params = ParamSet::new().with("n_neighbors", 0i64);
        assert!(KnnParams::from_params(&params).is_err());
    }
}
