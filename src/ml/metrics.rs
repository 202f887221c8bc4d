//! Evaluation metrics for binary classifiers.

use serde::{Deserialize, Serialize};

/// 2x2 confusion matrix indexed by `[truth][predicted]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[u32; 2]; 2],
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tally aligned truth/prediction pairs; labels other than 0/1 are skipped.
    pub fn from_labels(truth: &[u8], predicted: &[u8]) -> Self {
        let mut cm = Self::new();
        for (&t, &p) in truth.iter().zip(predicted) {
            cm.add(t, p);
        }
        cm
    }

    pub fn add(&mut self, truth: u8, predicted: u8) {
        if truth > 1 || predicted > 1 {
            return;
        }
        let cell = &mut self.counts[truth as usize][predicted as usize];
        *cell = cell.saturating_add(1);
    }

    /// Count for the cell; labels above 1 read as zero.
    pub fn get(&self, truth: u8, predicted: u8) -> u32 {
        self.counts
            .get(usize::from(truth))
            .and_then(|row| row.get(usize::from(predicted)))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().flatten().sum()
    }
}

/// Precision/recall statistics for a single class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f64,
    /// `TP / (TP + FN)`.
    pub recall: f64,
    pub f1: f64,
    /// Number of true examples of the class.
    pub support: u32,
}

/// Per-class precision and recall, indexed by class label.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> [ClassStats; 2] {
    [0u8, 1u8].map(|class| {
        let other = 1 - class;
        let tp = f64::from(cm.get(class, class));
        let fn_ = f64::from(cm.get(class, other));
        let fp = f64::from(cm.get(other, class));
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        ClassStats {
            precision,
            recall,
            f1,
            support: cm.get(class, class) + cm.get(class, other),
        }
    })
}

/// Fraction of correct predictions; 0 for an empty matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f64 {
    let total = cm.total();
    if total == 0 {
        0.0
    } else {
        f64::from(cm.get(0, 0) + cm.get(1, 1)) / f64::from(total)
    }
}

/// Accuracy straight from aligned label slices.
pub fn accuracy_score(truth: &[u8], predicted: &[u8]) -> f64 {
    accuracy(&ConfusionMatrix::from_labels(truth, predicted))
}
