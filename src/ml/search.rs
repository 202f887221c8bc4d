//! Grid search with stratified k-fold cross-validation.

use ndarray::{Array2, ArrayView2, Axis};
use thiserror::Error;
use tracing::debug;

use super::metrics::accuracy_score;
use super::{Classifier, FitError, FittedModel, ModelFamily, ParamError, ParamSet, SearchGrid};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SearchError {
    #[error("invalid grid for {family}: {source}")]
    Grid {
        family: ModelFamily,
        #[source]
        source: ParamError,
    },
    #[error("fitting {family} with {params} failed: {source}")]
    Fit {
        family: ModelFamily,
        params: ParamSet,
        #[source]
        source: FitError,
    },
    #[error("cross-validation needs at least 2 folds, got {0}")]
    TooFewFolds(usize),
    #[error("{family} model expects {expected} features but the test matrix has {found}")]
    FeatureWidth {
        family: ModelFamily,
        expected: usize,
        found: usize,
    },
}

/// Search settings shared by every family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub folds: usize,
    pub seed: u64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { folds: 3, seed: 42 }
    }
}

/// Best candidate of one family.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyResult {
    pub family: ModelFamily,
    pub params: ParamSet,
    /// Mean cross-validation accuracy of the chosen candidate.
    pub cv_accuracy: f64,
    /// Accuracy of the refit model on the held-out test matrix.
    pub test_accuracy: f64,
    pub candidates_evaluated: usize,
    pub model: FittedModel,
}

/// Fold index per row. Rows of each class are dealt round-robin in order, so every fold
/// receives the same share of each class (up to one row).
pub fn stratified_folds(y: &[u8], folds: usize) -> Vec<usize> {
    let mut assignment = vec![0usize; y.len()];
    let mut next = [0usize; 2];
    for (row, &label) in y.iter().enumerate() {
        let class = usize::from(label.min(1));
        assignment[row] = next[class] % folds;
        next[class] += 1;
    }
    assignment
}

fn select_rows(x: ArrayView2<'_, f64>, rows: &[usize]) -> Array2<f64> {
    x.select(Axis(0), rows)
}

/// Mean accuracy of `params` across stratified folds of the training data.
pub fn cross_val_accuracy(
    family: ModelFamily,
    params: &ParamSet,
    x: ArrayView2<'_, f64>,
    y: &[u8],
    options: SearchOptions,
) -> Result<f64, SearchError> {
    if options.folds < 2 {
        return Err(SearchError::TooFewFolds(options.folds));
    }
    if x.nrows() < options.folds {
        return Err(fit_error(
            family,
            params,
            FitError::TooFewRows {
                rows: x.nrows(),
                folds: options.folds,
            },
        ));
    }
    let assignment = stratified_folds(y, options.folds);
    let mut total = 0.0;
    for fold in 0..options.folds {
        let (train_rows, val_rows): (Vec<usize>, Vec<usize>) =
            (0..y.len()).partition(|&row| assignment[row] != fold);
        let train_x = select_rows(x, &train_rows);
        let train_y: Vec<u8> = train_rows.iter().map(|&row| y[row]).collect();
        let val_x = select_rows(x, &val_rows);
        let val_y: Vec<u8> = val_rows.iter().map(|&row| y[row]).collect();
        let model = family
            .fit(params, options.seed, train_x.view(), &train_y)
            .map_err(|source| fit_error(family, params, source))?;
        total += accuracy_score(&val_y, &model.predict(val_x.view()));
    }
    Ok(total / options.folds as f64)
}

/// Evaluate every candidate of `grid` by cross-validation, refit the first best one on the
/// full training data, and score it on the test data.
pub fn search_family(
    family: ModelFamily,
    grid: &SearchGrid,
    train: (ArrayView2<'_, f64>, &[u8]),
    test: (ArrayView2<'_, f64>, &[u8]),
    options: SearchOptions,
) -> Result<FamilyResult, SearchError> {
    let (train_x, train_y) = train;
    let (test_x, test_y) = test;
    let candidates = grid
        .candidates()
        .map_err(|source| SearchError::Grid { family, source })?;

    let mut best: Option<(f64, ParamSet)> = None;
    for params in &candidates {
        let score = cross_val_accuracy(family, params, train_x, train_y, options)?;
        debug!(%family, %params, cv_accuracy = score, "Evaluated candidate");
        if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
            best = Some((score, params.clone()));
        }
    }
    let (cv_accuracy, params) = best.unwrap_or_default();

    let model = family
        .fit(&params, options.seed, train_x, train_y)
        .map_err(|source| fit_error(family, &params, source))?;
    if model.n_features() != test_x.ncols() {
        return Err(SearchError::FeatureWidth {
            family,
            expected: model.n_features(),
            found: test_x.ncols(),
        });
    }
    let test_accuracy = accuracy_score(test_y, &model.predict(test_x));
    Ok(FamilyResult {
        family,
        params,
        cv_accuracy,
        test_accuracy,
        candidates_evaluated: candidates.len(),
        model,
    })
}

fn fit_error(family: ModelFamily, params: &ParamSet, source: FitError) -> SearchError {
    SearchError::Fit {
        family,
        params: params.clone(),
        source,
    }
}

/// Highest test accuracy; ties keep the earliest entry.
pub fn select_best(results: &[FamilyResult]) -> Option<&FamilyResult> {
    results.iter().fold(None, |best: Option<&FamilyResult>, candidate| match best {
        Some(current) if candidate.test_accuracy <= current.test_accuracy => Some(current),
        _ => Some(candidate),
    })
}
