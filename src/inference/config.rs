//! Model lifecycle configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{DatasetOrigin, SyntheticConfig};
use crate::training::GradientBoostingConfig;

/// Default location of the served model file
pub const DEFAULT_MODEL_PATH: &str = "models/model.txt";
/// Default feature count for synthetic training and request validation
pub const DEFAULT_N_FEATURES: usize = 6;

/// Configuration for the model lifecycle manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Where the served model is persisted
    pub model_path: PathBuf,

    /// Optional CSV used for default training; when set it must exist
    pub training_data_path: Option<PathBuf>,

    /// Feature count of the synthetic bootstrap dataset
    pub n_features: usize,

    /// Seed for synthetic data and boosting subsampling
    pub seed: u64,

    /// Rows in the synthetic bootstrap dataset
    pub synthetic_samples: usize,

    /// Boosting rounds for the synthetic bootstrap model
    pub bootstrap_rounds: usize,

    /// Boosting rounds for models trained from real data
    pub training_rounds: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: std::env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_MODEL_PATH)),
            training_data_path: std::env::var("TRAINING_DATA_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            n_features: std::env::var("N_FEATURES")
                .ok()
                .and_then(|n| n.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_N_FEATURES),
            seed: 42,
            synthetic_samples: 200,
            bootstrap_rounds: 20,
            training_rounds: 100,
        }
    }
}

impl ModelConfig {
    /// Environment-independent config rooted at `model_path`
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            training_data_path: None,
            n_features: DEFAULT_N_FEATURES,
            seed: 42,
            synthetic_samples: 200,
            bootstrap_rounds: 20,
            training_rounds: 100,
        }
    }

    pub fn with_training_data(mut self, path: impl Into<PathBuf>) -> Self {
        self.training_data_path = Some(path.into());
        self
    }

    pub fn with_n_features(mut self, n_features: usize) -> Self {
        self.n_features = n_features;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn synthetic(&self) -> SyntheticConfig {
        SyntheticConfig {
            n_samples: self.synthetic_samples,
            n_features: self.n_features,
            seed: self.seed,
            ..SyntheticConfig::default()
        }
    }

    /// Booster parameters for a dataset of the given origin
    pub fn boosting_for(&self, origin: &DatasetOrigin) -> GradientBoostingConfig {
        let rounds = match origin {
            DatasetOrigin::Synthetic { .. } => self.bootstrap_rounds,
            DatasetOrigin::File(_) | DatasetOrigin::Inline => self.training_rounds,
        };
        GradientBoostingConfig::default()
            .with_n_estimators(rounds)
            .with_random_state(self.seed)
    }
}
