//! Training run: load and clean tables, fit the preprocessor, search every family,
//! select the best, and persist only if it clears the accuracy threshold.

use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2, s};
use thiserror::Error;
use tracing::{info, warn};

use super::artifacts::{ArtifactError, ArtifactStore, TrainedModel};
use crate::config::Settings;
use crate::dataset::{CleaningRules, LabeledTable, TableError, load_labeled_csv};
use crate::ml::metrics::{ConfusionMatrix, accuracy};
use crate::ml::search::{FamilyResult, SearchError, search_family, select_best};
use crate::ml::{Classifier, ModelFamily, ParamSet};
use crate::preprocess::{PreprocessError, Preprocessor, PreprocessorBuilder};

/// Which input table an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Split::Train => "train",
            Split::Test => "test",
        })
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("loading {split} table {path}: {source}")]
    Load {
        split: Split,
        path: PathBuf,
        #[source]
        source: TableError,
    },
    #[error("cleaning {split} table: {source}")]
    Clean {
        split: Split,
        #[source]
        source: TableError,
    },
    #[error("fitting preprocessor: {0}")]
    FitPreprocessor(#[source] PreprocessError),
    #[error("transforming {split} table: {source}")]
    Transform {
        split: Split,
        #[source]
        source: PreprocessError,
    },
    #[error("model search: {0}")]
    Search(#[from] SearchError),
    #[error("no model families configured")]
    NoFamilies,
    #[error("persisting artifacts: {0}")]
    Persist(#[source] ArtifactError),
    #[error("re-reading persisted model: {0}")]
    Verify(#[source] ArtifactError),
}

/// Transformed train/test matrices with the label appended as the last column.
#[derive(Debug, Clone)]
pub struct TransformedData {
    pub train: Array2<f64>,
    pub test: Array2<f64>,
    pub preprocessor: Preprocessor,
    /// Where the preprocessor is written once a model is accepted.
    pub preprocessor_path: PathBuf,
}

impl TransformedData {
    pub fn train_parts(&self) -> (ArrayView2<'_, f64>, Vec<u8>) {
        split_label(&self.train)
    }

    pub fn test_parts(&self) -> (ArrayView2<'_, f64>, Vec<u8>) {
        split_label(&self.test)
    }
}

/// Features and labels of a matrix whose last column is the 0/1 label.
pub fn split_label(matrix: &Array2<f64>) -> (ArrayView2<'_, f64>, Vec<u8>) {
    let width = matrix.ncols().saturating_sub(1);
    let features = matrix.slice(s![.., ..width]);
    let labels = matrix
        .column(width)
        .iter()
        .map(|&v| u8::from(v >= 0.5))
        .collect();
    (features, labels)
}

fn append_label(features: &Array2<f64>, labels: &[u8]) -> Array2<f64> {
    let width = features.ncols();
    Array2::from_shape_fn((features.nrows(), width + 1), |(row, col)| {
        if col < width {
            features[[row, col]]
        } else {
            f64::from(labels[row])
        }
    })
}

/// One family's search outcome without the fitted model.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilySummary {
    pub family: ModelFamily,
    pub params: ParamSet,
    pub cv_accuracy: f64,
    pub test_accuracy: f64,
}

impl From<&FamilyResult> for FamilySummary {
    fn from(result: &FamilyResult) -> Self {
        Self {
            family: result.family,
            params: result.params.clone(),
            cv_accuracy: result.cv_accuracy,
            test_accuracy: result.test_accuracy,
        }
    }
}

/// Summary of an accepted run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub chosen: FamilySummary,
    /// Test accuracy of the model read back from the artifact store.
    pub test_accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub families: Vec<FamilySummary>,
    pub preprocessor_path: PathBuf,
    pub model_path: PathBuf,
}

/// Result of a run that completed without infrastructure errors.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    /// Best model cleared the threshold and both artifacts were written.
    Accepted(TrainReport),
    /// Best model fell short; nothing was written.
    Rejected {
        best: FamilySummary,
        min_accuracy: f64,
        families: Vec<FamilySummary>,
    },
}

impl TrainOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TrainOutcome::Accepted(_))
    }
}

pub struct TrainingPipeline {
    settings: Settings,
    store: ArtifactStore,
    cleaning: CleaningRules,
    builder: PreprocessorBuilder,
}

impl TrainingPipeline {
    /// Pipeline writing to the artifact directory named in `settings`.
    pub fn new(settings: Settings) -> Self {
        let store = ArtifactStore::new(settings.artifacts.dir.clone());
        Self::with_store(settings, store)
    }

    pub fn with_store(settings: Settings, store: ArtifactStore) -> Self {
        let builder =
            PreprocessorBuilder::stroke().unknown_categories(settings.serving.unknown_categories);
        Self {
            settings,
            store,
            cleaning: CleaningRules::stroke(),
            builder,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn load(&self, split: Split, path: &Path) -> Result<LabeledTable, TrainError> {
        let mut table = load_labeled_csv(path).map_err(|source| TrainError::Load {
            split,
            path: path.to_path_buf(),
            source,
        })?;
        self.cleaning
            .apply(&mut table.features)
            .map_err(|source| TrainError::Clean { split, source })?;
        info!(%split, path = %path.display(), rows = table.labels.len(), "Loaded table");
        Ok(table)
    }

    /// Clean both tables, fit the preprocessor on train only, and transform both.
    pub fn transform_data(
        &self,
        train_path: &Path,
        test_path: &Path,
    ) -> Result<TransformedData, TrainError> {
        let train = self.load(Split::Train, train_path)?;
        let test = self.load(Split::Test, test_path)?;

        let preprocessor = self
            .builder
            .fit(&train.features)
            .map_err(TrainError::FitPreprocessor)?;
        info!(features = preprocessor.n_features_out(), "Fitted preprocessor");

        let transform = |split: Split, table: &LabeledTable| {
            preprocessor
                .transform(&table.features)
                .map(|features| append_label(&features, &table.labels))
                .map_err(|source| TrainError::Transform { split, source })
        };
        let train_matrix = transform(Split::Train, &train)?;
        let test_matrix = transform(Split::Test, &test)?;
        Ok(TransformedData {
            train: train_matrix,
            test: test_matrix,
            preprocessor,
            preprocessor_path: self.store.preprocessor_path(),
        })
    }

    /// Search every configured family; results follow the enumeration order.
    pub fn select_model(&self, data: &TransformedData) -> Result<Vec<FamilyResult>, TrainError> {
        let families = self.settings.training.selected_families();
        if families.is_empty() {
            return Err(TrainError::NoFamilies);
        }
        let (train_x, train_y) = data.train_parts();
        let (test_x, test_y) = data.test_parts();
        let options = self.settings.search_options();
        let mut results = Vec::with_capacity(families.len());
        for &family in &families {
            let grid = self.settings.grid_for(family);
            let result = search_family(
                family,
                &grid,
                (train_x, train_y.as_slice()),
                (test_x, test_y.as_slice()),
                options,
            )?;
            info!(
                %family,
                params = %result.params,
                cv_accuracy = result.cv_accuracy,
                test_accuracy = result.test_accuracy,
                "Family searched"
            );
            results.push(result);
        }
        Ok(results)
    }

    /// Full training run.
    pub fn run(&self, train_path: &Path, test_path: &Path) -> Result<TrainOutcome, TrainError> {
        let data = self.transform_data(train_path, test_path)?;
        let results = self.select_model(&data)?;
        let families: Vec<FamilySummary> = results.iter().map(FamilySummary::from).collect();
        let best = select_best(&results).ok_or(TrainError::NoFamilies)?;
        let min_accuracy = self.settings.training.min_accuracy;

        if best.test_accuracy < min_accuracy {
            warn!(
                family = %best.family,
                test_accuracy = best.test_accuracy,
                min_accuracy,
                "No acceptable model; nothing persisted"
            );
            return Ok(TrainOutcome::Rejected {
                best: FamilySummary::from(best),
                min_accuracy,
                families,
            });
        }

        let trained = TrainedModel {
            family: best.family,
            params: best.params.clone(),
            test_accuracy: best.test_accuracy,
            feature_names: data.preprocessor.feature_names().to_vec(),
            model: best.model.clone(),
        };
        let preprocessor_path = self
            .store
            .save_preprocessor(&data.preprocessor)
            .map_err(TrainError::Persist)?;
        let model_path = self.store.save_model(&trained).map_err(TrainError::Persist)?;

        let reloaded = self.store.load_model().map_err(TrainError::Verify)?;
        let (test_x, test_y) = data.test_parts();
        let confusion = ConfusionMatrix::from_labels(&test_y, &reloaded.model.predict(test_x));
        let test_accuracy = accuracy(&confusion);
        info!(family = %best.family, test_accuracy, "Model accepted");

        Ok(TrainOutcome::Accepted(TrainReport {
            chosen: FamilySummary::from(best),
            test_accuracy,
            confusion,
            families,
            preprocessor_path,
            model_path,
        }))
    }
}
