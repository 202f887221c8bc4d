//! Single-record inference against the persisted artifact pair.
//!
//! Nothing is cached: every call reads both artifacts from the store, so a retrain is
//! picked up by the next call.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use super::artifacts::{ArtifactError, ArtifactStore};
use crate::config::{ServingSettings, Settings};
use crate::dataset::{CleaningRules, FeatureTable, TableError};
use crate::ml::{Classifier, ModelFamily};
use crate::preprocess::PreprocessError;
use crate::record::{Record, RecordError};

/// Predicted class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrokePrediction {
    NoStroke = 0,
    Stroke = 1,
}

impl StrokePrediction {
    fn from_label(label: u8) -> Self {
        if label == 1 {
            StrokePrediction::Stroke
        } else {
            StrokePrediction::NoStroke
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for StrokePrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("record does not match the preprocessor: {0}")]
    Schema(#[source] PreprocessError),
    #[error("{family} model expects {expected} features but the preprocessor produces {found}")]
    FeatureWidth {
        family: ModelFamily,
        expected: usize,
        found: usize,
    },
    #[error(
        "{family} model was trained on feature {position} = {expected:?} but the preprocessor \
         produces {found:?}"
    )]
    FeatureNames {
        family: ModelFamily,
        position: usize,
        expected: String,
        found: String,
    },
    #[error("expected exactly one row, got {0}")]
    RowCount(usize),
    #[error("cleaning record: {0}")]
    Cleaning(#[source] TableError),
}

/// Loads the artifact pair on each call and classifies one row.
#[derive(Debug, Clone)]
pub struct PredictPipeline {
    store: ArtifactStore,
    serving: ServingSettings,
    cleaning: CleaningRules,
}

impl PredictPipeline {
    pub fn new(store: ArtifactStore, serving: ServingSettings) -> Self {
        Self {
            store,
            serving,
            cleaning: CleaningRules::stroke(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            ArtifactStore::new(settings.artifacts.dir.clone()),
            settings.serving,
        )
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn predict(&self, record: &Record) -> Result<StrokePrediction, PredictError> {
        record.validate()?;
        self.predict_table(record.to_table())
    }

    /// Classify a one-row table whose columns match the training table's feature columns.
    pub fn predict_table(&self, mut table: FeatureTable) -> Result<StrokePrediction, PredictError> {
        if table.n_rows() != 1 {
            return Err(PredictError::RowCount(table.n_rows()));
        }
        if self.serving.clean_records {
            self.cleaning
                .apply(&mut table)
                .map_err(PredictError::Cleaning)?;
        }

        let preprocessor = self.store.load_preprocessor()?;
        let trained = self.store.load_model()?;
        let found = preprocessor.n_features_out();
        let expected = trained.model.n_features();
        if expected != found || trained.n_features() != found {
            return Err(PredictError::FeatureWidth {
                family: trained.family,
                expected,
                found,
            });
        }
        // Same width is not enough: a preprocessor refit on other categories reorders columns.
        if let Some((position, (trained_name, produced_name))) = trained
            .feature_names
            .iter()
            .zip(preprocessor.feature_names())
            .enumerate()
            .find(|(_, (trained_name, produced_name))| trained_name != produced_name)
        {
            return Err(PredictError::FeatureNames {
                family: trained.family,
                position,
                expected: trained_name.clone(),
                found: produced_name.clone(),
            });
        }

        let features = preprocessor
            .transform_with(&table, self.serving.unknown_categories)
            .map_err(PredictError::Schema)?;
        debug!(features = found, "Record transformed");
        let label = trained.model.predict_row(features.row(0));
        let prediction = StrokePrediction::from_label(label);
        info!(family = %trained.family, %prediction, "Prediction made");
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::ParamSet;
    use crate::pipeline::artifacts::TrainedModel;
    use crate::preprocess::{PreprocessorBuilder, UnknownCategory};
    use crate::record::{
        EverMarried, Gender, RECORD_FIELDS, ResidenceType, SmokingStatus, WorkType,
    };
    use tempfile::tempdir;

    fn record(age: u32, glucose: f64, work_type: WorkType) -> Record {
        Record {
            age,
            bmi: 25.0,
            avg_glucose_level: glucose,
            gender: Gender::Female,
            ever_married: EverMarried::Yes,
            residence_type: ResidenceType::Rural,
            work_type,
            smoking_status: SmokingStatus::NeverSmoked,
            hypertension: false,
            heart_disease: false,
        }
    }

    fn training_table() -> (FeatureTable, Vec<u8>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (age, glucose, work, label) in [
            (70, 220.0, WorkType::Private, 1),
            (75, 240.0, WorkType::SelfEmployed, 1),
            (80, 200.0, WorkType::GovtJob, 1),
            (20, 80.0, WorkType::Private, 0),
            (25, 90.0, WorkType::GovtJob, 0),
            (30, 85.0, WorkType::Children, 0),
        ] {
            let mut table = record(age, glucose, work).to_table();
            CleaningRules::stroke().apply(&mut table).unwrap();
            rows.push(
                (0..RECORD_FIELDS.len())
                    .map(|col| table.cell(0, col).map(str::to_string))
                    .collect(),
            );
            labels.push(label);
        }
        let columns = RECORD_FIELDS.iter().map(|name| name.to_string()).collect();
        (FeatureTable::from_rows(columns, rows), labels)
    }

    fn store_with_artifacts(dir: &std::path::Path) -> ArtifactStore {
        let (table, labels) = training_table();
        let preprocessor = PreprocessorBuilder::stroke().fit(&table).unwrap();
        let x = preprocessor.transform(&table).unwrap();
        let params = ParamSet::new().with("n_neighbors", 1i64);
        let model = ModelFamily::KNeighbors
            .fit(&params, 0, x.view(), &labels)
            .unwrap();
        let store = ArtifactStore::new(dir);
        store.save_preprocessor(&preprocessor).unwrap();
        store
            .save_model(&TrainedModel {
                family: ModelFamily::KNeighbors,
                params,
                test_accuracy: 1.0,
                feature_names: preprocessor.feature_names().to_vec(),
                model,
            })
            .unwrap();
        store
    }

    #[test]
    fn predicts_each_class() {
        let dir = tempdir().unwrap();
        let pipeline =
            PredictPipeline::new(store_with_artifacts(dir.path()), ServingSettings::default());
        assert_eq!(
            pipeline.predict(&record(78, 230.0, WorkType::Private)).unwrap(),
            StrokePrediction::Stroke
        );
        assert_eq!(
            pipeline.predict(&record(22, 82.0, WorkType::Private)).unwrap(),
            StrokePrediction::NoStroke
        );
    }

    #[test]
    fn raw_categories_are_collapsed_before_encoding() {
        let dir = tempdir().unwrap();
        let store = store_with_artifacts(dir.path());
        let cleaned = PredictPipeline::new(store.clone(), ServingSettings::default());
        assert!(cleaned.predict(&record(8, 85.0, WorkType::Children)).is_ok());

        let raw = PredictPipeline::new(
            store,
            ServingSettings {
                clean_records: false,
                unknown_categories: UnknownCategory::Error,
            },
        );
        assert!(matches!(
            raw.predict(&record(8, 85.0, WorkType::Children)),
            Err(PredictError::Schema(PreprocessError::UnknownCategory { .. }))
        ));
    }

    #[test]
    fn missing_artifacts_fail_without_a_prediction() {
        let dir = tempdir().unwrap();
        let pipeline =
            PredictPipeline::new(ArtifactStore::new(dir.path()), ServingSettings::default());
        assert!(matches!(
            pipeline.predict(&record(50, 100.0, WorkType::Private)),
            Err(PredictError::Artifact(ArtifactError::NotFound { .. }))
        ));
    }

    #[test]
    fn rejects_multi_row_tables() {
        let dir = tempdir().unwrap();
        let pipeline =
            PredictPipeline::new(store_with_artifacts(dir.path()), ServingSettings::default());
        let (table, _) = training_table();
        assert!(matches!(
            pipeline.predict_table(table),
            Err(PredictError::RowCount(6))
        ));
    }

    #[test]
    fn preprocessor_with_other_vocabulary_is_rejected() {
        let dir = tempdir().unwrap();
        let store = store_with_artifacts(dir.path());
        let (mut table, _) = training_table();
        table
            .map_column("work_type", |value| {
                (value == "Self-employed").then(|| "Never_worked".to_string())
            })
            .unwrap();
        let swapped = PreprocessorBuilder::stroke().fit(&table).unwrap();
        let original = store.load_preprocessor().unwrap();
        assert_eq!(swapped.n_features_out(), original.n_features_out());
        assert_ne!(swapped.feature_names(), original.feature_names());
        store.save_preprocessor(&swapped).unwrap();

        let pipeline = PredictPipeline::new(store, ServingSettings::default());
        assert!(matches!(
            pipeline.predict(&record(78, 230.0, WorkType::Private)),
            Err(PredictError::FeatureNames {
                family: ModelFamily::KNeighbors,
                ..
            })
        ));
    }

    #[test]
    fn display_is_the_bare_label() {
        assert_eq!(StrokePrediction::Stroke.to_string(), "1");
        assert_eq!(StrokePrediction::NoStroke.as_u8(), 0);
    }
}
