//! Stroke-risk training and inference library shared by the command-line tools and tests.
/// Application directory resolution.
pub mod app_dirs;
/// TOML settings.
pub mod config;
/// CSV tables and category cleaning.
pub mod dataset;
/// Whole-file replacement helpers.
pub mod fs_util;
/// Tracing subscriber setup for binaries.
pub mod logging;
/// Classifier families, grid search and metrics.
pub mod ml;
/// Training run and single-record inference.
pub mod pipeline;
/// Column preprocessing.
pub mod preprocess;
/// Front-end input record.
pub mod record;

pub use pipeline::{PredictPipeline, StrokePrediction, TrainOutcome, TrainingPipeline};
pub use record::Record;
