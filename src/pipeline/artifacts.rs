//! The two persisted artifacts and the directory that holds them.
//!
//! Each artifact is a JSON document `{format_version, kind, payload}` written with a
//! whole-file swap. The two files are replaced independently; readers may observe a new
//! model next to an old preprocessor while a training run is persisting.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::fs_util::write_atomic;
use crate::ml::{FittedModel, ModelFamily, ParamSet};
use crate::preprocess::Preprocessor;

pub const PREPROCESSOR_FILE: &str = "preprocessor.json";
pub const MODEL_FILE: &str = "model.json";
pub const FORMAT_VERSION: u32 = 1;

/// Which slot an artifact belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Preprocessor,
    Model,
}

impl ArtifactKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Preprocessor => PREPROCESSOR_FILE,
            ArtifactKind::Model => MODEL_FILE,
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ArtifactKind::Preprocessor => "preprocessor",
            ArtifactKind::Model => "model",
        })
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{kind} artifact not found at {path}")]
    NotFound { kind: ArtifactKind, path: PathBuf },
    #[error("failed to read {kind} artifact {path}: {source}")]
    Read {
        kind: ArtifactKind,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {kind} artifact {path}: {source}")]
    Write {
        kind: ArtifactKind,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create artifact directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{kind} artifact {path} is corrupt: {source}")]
    Corrupt {
        kind: ArtifactKind,
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode {kind} artifact: {source}")]
    Encode {
        kind: ArtifactKind,
        source: serde_json::Error,
    },
    #[error("{path} holds a {found} artifact, expected {expected}")]
    WrongKind {
        path: PathBuf,
        expected: ArtifactKind,
        found: ArtifactKind,
    },
    #[error("{kind} artifact {path} has format version {found}, expected {FORMAT_VERSION}")]
    UnsupportedVersion {
        kind: ArtifactKind,
        path: PathBuf,
        found: u32,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    format_version: u32,
    kind: ArtifactKind,
    payload: T,
}

/// Persisted best model plus what the preprocessor must produce for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub family: ModelFamily,
    pub params: ParamSet,
    pub test_accuracy: f64,
    /// Output feature names of the preprocessor the model was trained behind.
    pub feature_names: Vec<String>,
    pub model: FittedModel,
}

impl TrainedModel {
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}

/// Explicit storage handle: a base directory with one slot per [`ArtifactKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn preprocessor_path(&self) -> PathBuf {
        self.path(ArtifactKind::Preprocessor)
    }

    pub fn model_path(&self) -> PathBuf {
        self.path(ArtifactKind::Model)
    }

    pub fn save_preprocessor(&self, preprocessor: &Preprocessor) -> Result<PathBuf, ArtifactError> {
        self.save(ArtifactKind::Preprocessor, preprocessor)
    }

    pub fn load_preprocessor(&self) -> Result<Preprocessor, ArtifactError> {
        self.load(ArtifactKind::Preprocessor)
    }

    pub fn save_model(&self, model: &TrainedModel) -> Result<PathBuf, ArtifactError> {
        self.save(ArtifactKind::Model, model)
    }

    pub fn load_model(&self) -> Result<TrainedModel, ArtifactError> {
        self.load(ArtifactKind::Model)
    }

    fn save<T: Serialize>(&self, kind: ArtifactKind, payload: &T) -> Result<PathBuf, ArtifactError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ArtifactError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;
        let envelope = Envelope {
            format_version: FORMAT_VERSION,
            kind,
            payload,
        };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|source| ArtifactError::Encode { kind, source })?;
        let path = self.path(kind);
        write_atomic(&path, &bytes).map_err(|source| ArtifactError::Write {
            kind,
            path: path.clone(),
            source,
        })?;
        info!(%kind, path = %path.display(), bytes = bytes.len(), "Saved artifact");
        Ok(path)
    }

    fn load<T: DeserializeOwned>(&self, kind: ArtifactKind) -> Result<T, ArtifactError> {
        let path = self.path(kind);
        let bytes = std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound {
                    kind,
                    path: path.clone(),
                }
            } else {
                ArtifactError::Read {
                    kind,
                    path: path.clone(),
                    source,
                }
            }
        })?;
        let header: Envelope<serde::de::IgnoredAny> =
            serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Corrupt {
                kind,
                path: path.clone(),
                source,
            })?;
        if header.format_version != FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                kind,
                path,
                found: header.format_version,
            });
        }
        if header.kind != kind {
            return Err(ArtifactError::WrongKind {
                path,
                expected: kind,
                found: header.kind,
            });
        }
        let envelope: Envelope<T> =
            serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Corrupt {
                kind,
                path: path.clone(),
                source,
            })?;
        debug!(%kind, path = %path.display(), "Loaded artifact");
        Ok(envelope.payload)
    }
}
