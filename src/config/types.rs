use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ml::search::SearchOptions;
use crate::ml::{ModelFamily, SearchGrid};
use crate::preprocess::UnknownCategory;

/// Everything the training and prediction tools read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub artifacts: ArtifactSettings,
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub serving: ServingSettings,
    /// Per-family grids keyed by family name; families without an entry use their
    /// built-in grid.
    #[serde(default = "default_search")]
    pub search: BTreeMap<String, SearchGrid>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            artifacts: ArtifactSettings::default(),
            training: TrainingSettings::default(),
            serving: ServingSettings::default(),
            search: default_search(),
        }
    }
}

impl Settings {
    /// Grid searched for `family`.
    pub fn grid_for(&self, family: ModelFamily) -> SearchGrid {
        self.search
            .get(family.as_str())
            .cloned()
            .unwrap_or_else(|| family.default_grid())
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            folds: self.training.cv_folds,
            seed: self.training.seed,
        }
    }

    pub(super) fn normalized(mut self) -> Self {
        self.training.cv_folds = self.training.cv_folds.max(MIN_CV_FOLDS);
        if !self.training.min_accuracy.is_finite() {
            self.training.min_accuracy = default_min_accuracy();
        }
        self.training.families = self.training.selected_families();
        self
    }
}

/// Config keys: `dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSettings {
    /// Directory holding `preprocessor.json` and `model.json`.
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
        }
    }
}

/// Config keys: `seed`, `cv_folds`, `min_accuracy`, `families`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Test accuracy the best family must reach before anything is persisted.
    #[serde(default = "default_min_accuracy")]
    pub min_accuracy: f64,
    /// Families to search; order and duplicates are ignored.
    #[serde(default = "default_families")]
    pub families: Vec<ModelFamily>,
}

impl TrainingSettings {
    /// Families to search, deduplicated and in enumeration order; ties in selection go
    /// to the earlier one.
    pub fn selected_families(&self) -> Vec<ModelFamily> {
        ModelFamily::in_selection_order(&self.families)
    }
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            cv_folds: default_cv_folds(),
            min_accuracy: default_min_accuracy(),
            families: default_families(),
        }
    }
}

/// Config keys: `clean_records`, `unknown_categories`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServingSettings {
    /// Apply the training-time category collapsing to records before prediction.
    #[serde(default = "default_true")]
    pub clean_records: bool,
    #[serde(default)]
    pub unknown_categories: UnknownCategory,
}

impl Default for ServingSettings {
    fn default() -> Self {
        Self {
            clean_records: true,
            unknown_categories: UnknownCategory::default(),
        }
    }
}

const MIN_CV_FOLDS: usize = 2;

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_seed() -> u64 {
    42
}

fn default_cv_folds() -> usize {
    3
}

fn default_min_accuracy() -> f64 {
    0.6
}

fn default_families() -> Vec<ModelFamily> {
    ModelFamily::ALL.to_vec()
}

fn default_true() -> bool {
    true
}

fn default_search() -> BTreeMap<String, SearchGrid> {
    ModelFamily::ALL
        .into_iter()
        .map(|family| (family.as_str().to_string(), family.default_grid()))
        .collect()
}
