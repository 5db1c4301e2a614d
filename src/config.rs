use std::{
    env, fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{ProtoErr, Result, network::DEFAULT_SEED};

pub const IRIS_MODEL_PATH_VAR: &str = "PROTOML_IRIS_MODEL_PATH";
pub const DETECTION_MODEL_PATH_VAR: &str = "PROTOML_DETECTION_MODEL_PATH";
pub const DATASET_PATH_VAR: &str = "PROTOML_DATASET_PATH";

const DEFAULT_EPOCHS: NonZeroUsize = NonZeroUsize::new(4).unwrap();
const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// The hyperparameters of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    pub epochs: NonZeroUsize,
    pub learning_rate: f32,
    /// Seeds both the weights initialization and the sample shuffling.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: DEFAULT_SEED,
        }
    }
}

/// Everything the binary needs to train, classify and detect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub iris_model_path: PathBuf,
    pub detection_model_path: PathBuf,
    pub dataset_path: PathBuf,
    pub training: TrainingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            iris_model_path: PathBuf::from("models/iris"),
            detection_model_path: PathBuf::from("models/detection"),
            dataset_path: PathBuf::from("data/iris/bezdekIris.data"),
            training: TrainingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Builds the configuration: the defaults, overridden by the JSON file at `path` if any, and
    /// finally by the environment.
    ///
    /// # Returns
    /// The configuration or a `Config` error if the file is unreadable or a value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let config = config.with_overrides(|var| env::var(var).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file, missing fields take their default value.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| ProtoErr::Config(format!("{}: {e}", path.display())))?;

        serde_json::from_str(&raw).map_err(|e| ProtoErr::Config(format!("{}: {e}", path.display())))
    }

    /// Overrides the paths with the variables `lookup` finds.
    ///
    /// # Arguments
    /// * `lookup` - Resolves a variable name to its value, if set.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = [
            (IRIS_MODEL_PATH_VAR, &mut self.iris_model_path),
            (DETECTION_MODEL_PATH_VAR, &mut self.detection_model_path),
            (DATASET_PATH_VAR, &mut self.dataset_path),
        ];

        for (var, field) in overrides {
            if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                *field = PathBuf::from(value);
            }
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        let lr = self.training.learning_rate;
        if !lr.is_finite() || lr <= 0. {
            return Err(ProtoErr::Config(format!(
                "learning rate must be positive, got {lr}"
            )));
        }

        for (name, path) in [
            ("iris_model_path", &self.iris_model_path),
            ("detection_model_path", &self.detection_model_path),
            ("dataset_path", &self.dataset_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ProtoErr::Config(format!("{name} must not be empty")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_the_reference_training_run() {
        let config = AppConfig::default();

        assert_eq!(config.training.epochs.get(), 4);
        assert_eq!(config.training.learning_rate, 0.01);
        assert_eq!(config.training.seed, 1234567);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protoml.json");
        fs::write(
            &path,
            r#"{ "iris_model_path": "/srv/iris", "training": { "epochs": 10 } }"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.iris_model_path, PathBuf::from("/srv/iris"));
        assert_eq!(config.training.epochs.get(), 10);
        assert_eq!(config.training.learning_rate, 0.01);
        assert_eq!(config.dataset_path, AppConfig::default().dataset_path);
    }

    #[test]
    fn invalid_files_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protoml.json");

        fs::write(&path, r#"{ "training": { "epochs": 0 } }"#).unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(ProtoErr::Config(_))
        ));

        fs::write(&path, r#"{ "unknown": 1 }"#).unwrap();
        assert!(AppConfig::from_file(&path).is_err());

        assert!(AppConfig::from_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn environment_overrides_paths() {
        let vars = HashMap::from([
            (DATASET_PATH_VAR, "/data/iris.csv".to_string()),
            (IRIS_MODEL_PATH_VAR, String::new()),
        ]);

        let config = AppConfig::default().with_overrides(|var| vars.get(var).cloned());
        assert_eq!(config.dataset_path, PathBuf::from("/data/iris.csv"));
        assert_eq!(config.iris_model_path, AppConfig::default().iris_model_path);
    }

    #[test]
    fn non_positive_learning_rates_are_rejected() {
        let mut config = AppConfig::default();
        config.training.learning_rate = 0.;
        assert!(config.validate().is_err());

        config.training.learning_rate = f32::NAN;
        assert!(config.validate().is_err());
    }
}
