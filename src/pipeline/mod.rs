//! Training and inference over the persisted preprocessor/model pair.

pub mod artifacts;
pub mod predict;
pub mod train;

pub use artifacts::{ArtifactError, ArtifactKind, ArtifactStore, TrainedModel};
pub use predict::{PredictError, PredictPipeline, StrokePrediction};
pub use train::{
    FamilySummary, TrainError, TrainOutcome, TrainReport, TrainingPipeline, TransformedData,
};
