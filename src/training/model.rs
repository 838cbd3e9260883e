//! Trained model artifact
//!
//! Couples a fitted booster with the metadata needed to serve it. The
//! expected feature count is recorded here at fit time and travels with
//! the serialized model.

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
use crate::data::Dataset;
use crate::error::{ModelError, Result};

/// Descriptive metadata recorded when a model is trained
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    pub trained_at: DateTime<Utc>,
    pub n_features: usize,
    pub n_samples: usize,
    pub n_trees: usize,
    /// Human readable description of the training data
    pub source: String,
    pub training_time_secs: f64,
}

/// A fitted, immutable model ready for scoring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainedModel {
    metadata: ModelMetadata,
    booster: GradientBoostingClassifier,
}

impl TrainedModel {
    /// Fit a booster on `dataset`
    pub fn train(dataset: &Dataset, config: GradientBoostingConfig) -> Result<Self> {
        let start = Instant::now();
        let mut booster = GradientBoostingClassifier::new(config);
        booster.fit(&dataset.features, &dataset.labels).map_err(|e| match e {
            ModelError::TrainingFailed(_) => e,
            other => ModelError::TrainingFailed(other.to_string()),
        })?;

        let metadata = ModelMetadata {
            trained_at: Utc::now(),
            n_features: booster.n_features(),
            n_samples: dataset.n_samples(),
            n_trees: booster.n_trees(),
            source: dataset.origin.to_string(),
            training_time_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            n_samples = metadata.n_samples,
            n_features = metadata.n_features,
            n_trees = metadata.n_trees,
            source = %metadata.source,
            training_time_secs = metadata.training_time_secs,
            "Model trained"
        );

        Ok(Self { metadata, booster })
    }

    /// Scores (probability of class 1) in row order
    pub fn score(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        Ok(self.booster.predict_proba(x)?.to_vec())
    }

    pub fn n_features(&self) -> usize {
        self.metadata.n_features
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Consistency check for a model read back from storage
    pub fn verify(&self) -> std::result::Result<(), String> {
        if self.metadata.n_features != self.booster.n_features() {
            return Err(format!(
                "metadata declares {} features but booster was fitted on {}",
                self.metadata.n_features,
                self.booster.n_features()
            ));
        }
        self.booster.check_integrity()
    }
}
