use std::path::Path;

use serde::de::Error as SerdeDeError;
use tracing::debug;

use super::{ConfigError, Settings};
use crate::app_dirs;
use crate::fs_util::write_atomic;
use crate::ml::ModelFamily;

/// Load `<app root>/config.toml`, returning defaults if it does not exist.
pub fn load() -> Result<Settings, ConfigError> {
    let path = app_dirs::config_path()?;
    load_from(&path)
}

/// Load settings from `path`, returning defaults if the file does not exist.
pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "No config file; using defaults");
        return Ok(Settings::default());
    }
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source: SerdeDeError::custom(source),
    })?;
    let settings: Settings = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(name) = settings
        .search
        .keys()
        .find(|name| name.parse::<ModelFamily>().is_err())
    {
        return Err(ConfigError::UnknownFamily {
            path: path.to_path_buf(),
            name: name.clone(),
        });
    }
    Ok(settings.normalized())
}

/// Save to `<app root>/config.toml`.
pub fn save(settings: &Settings) -> Result<(), ConfigError> {
    let path = app_dirs::config_path()?;
    save_to_path(settings, &path)
}

/// Write settings as pretty TOML, creating parent directories as needed.
pub fn save_to_path(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(settings).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, data.as_bytes()).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{ParamValue, SearchGrid};
    use crate::preprocess::UnknownCategory;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.training.min_accuracy, 0.6);
        assert_eq!(settings.training.cv_folds, 3);
        assert_eq!(settings.training.families, ModelFamily::ALL.to_vec());
        assert!(settings.serving.clean_records);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[training]
seed = 7
families = ["k_neighbors", "decision_tree"]

[serving]
unknown_categories = "ignore"

[search.k_neighbors]
n_neighbors = [1, 3]
"#,
        )
        .unwrap();
        let settings = load_from(&path).unwrap();
        assert_eq!(settings.training.seed, 7);
        assert_eq!(settings.training.cv_folds, 3);
        assert_eq!(
            settings.training.families,
            [ModelFamily::DecisionTree, ModelFamily::KNeighbors]
        );
        assert_eq!(settings.serving.unknown_categories, UnknownCategory::Ignore);
        assert_eq!(
            settings.grid_for(ModelFamily::KNeighbors),
            SearchGrid::new().with("n_neighbors", [ParamValue::Int(1), ParamValue::Int(3)])
        );
        assert_eq!(
            settings.grid_for(ModelFamily::DecisionTree),
            ModelFamily::DecisionTree.default_grid()
        );
    }

    #[test]
    fn unknown_search_family_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search.xgboost]\nmax_depth = [3]\n").unwrap();
        assert!(matches!(
            load_from(&path),
            Err(ConfigError::UnknownFamily { name, .. }) if name == "xgboost"
        ));
    }

    #[test]
    fn normalization_clamps_folds_and_orders_families() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[training]\ncv_folds = 1\nfamilies = [\"k_neighbors\", \"decision_tree\", \"decision_tree\"]\n",
        )
        .unwrap();
        let settings = load_from(&path).unwrap();
        assert_eq!(settings.training.cv_folds, 2);
        assert_eq!(
            settings.training.families,
            [ModelFamily::DecisionTree, ModelFamily::KNeighbors]
        );
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut settings = Settings::default();
        settings.training.min_accuracy = 0.75;
        settings.artifacts.dir = dir.path().join("store");
        save_to_path(&settings, &path).unwrap();
        assert_eq!(load_from(&path).unwrap(), settings);
    }
}
