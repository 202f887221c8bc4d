//! TOML settings for training and serving.
//!
//! Config keys: `artifacts`, `training`, `serving`, `search`. A missing file means
//! defaults; a partial file fills the gaps with defaults.

mod errors;
mod io;
mod types;

pub use errors::ConfigError;
pub use io::{load, load_from, save, save_to_path};
pub use types::{ArtifactSettings, ServingSettings, Settings, TrainingSettings};
