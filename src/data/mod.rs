//! Training data provider
//!
//! Produces `(features, labels)` pairs for the booster, either from a CSV
//! file with a trailing label column or from a seeded synthetic generator.

mod loader;
mod synthetic;

pub use loader::load_csv;
pub use synthetic::{generate, SyntheticConfig};

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use tracing::{debug, info};

use crate::error::{ModelError, Result};

/// Minimum number of distinct feature rows a dataset needs to be trainable
pub const MIN_DISTINCT_ROWS: usize = 2;

/// Where a dataset came from
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetOrigin {
    Synthetic { seed: u64 },
    File(PathBuf),
    Inline,
}

impl fmt::Display for DatasetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetOrigin::Synthetic { seed } => write!(f, "synthetic(seed={})", seed),
            DatasetOrigin::File(path) => write!(f, "file({})", path.display()),
            DatasetOrigin::Inline => write!(f, "inline"),
        }
    }
}

/// Feature matrix plus binary label vector
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
    pub origin: DatasetOrigin,
}

impl Dataset {
    pub fn new(features: Array2<f64>, labels: Array1<f64>) -> Self {
        Self {
            features,
            labels,
            origin: DatasetOrigin::Inline,
        }
    }

    /// Build a dataset from rows whose last value is the label
    pub fn from_labeled_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let width = match rows.first() {
            Some(first) => first.len(),
            None => return Err(ModelError::DatasetInvalid("dataset has no rows".into())),
        };
        if width < 2 {
            return Err(ModelError::DatasetInvalid(format!(
                "rows need at least 2 columns (features + label), got {}",
                width
            )));
        }

        let mut flat = Vec::with_capacity(rows.len() * (width - 1));
        let mut labels = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(ModelError::DatasetInvalid(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    width
                )));
            }
            flat.extend_from_slice(&row[..width - 1]);
            labels.push(row[width - 1]);
        }

        let features = Array2::from_shape_vec((rows.len(), width - 1), flat)
            .map_err(|e| ModelError::DatasetInvalid(e.to_string()))?;
        Ok(Self::new(features, Array1::from_vec(labels)))
    }

    pub fn with_origin(mut self, origin: DatasetOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Check the dataset is large and clean enough to fit a model
    pub fn validate(&self) -> Result<()> {
        let n = self.n_samples();
        if n != self.labels.len() {
            return Err(ModelError::DatasetInvalid(format!(
                "{} feature rows but {} labels",
                n,
                self.labels.len()
            )));
        }
        if self.n_features() == 0 {
            return Err(ModelError::DatasetInvalid("dataset has no feature columns".into()));
        }
        if n < MIN_DISTINCT_ROWS {
            return Err(ModelError::DatasetInvalid(format!(
                "dataset has {} rows, need at least {}",
                n, MIN_DISTINCT_ROWS
            )));
        }
        if let Some(((row, col), _)) = self.features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ModelError::DatasetInvalid(format!(
                "row {}, column {} is not a finite number",
                row, col
            )));
        }
        if let Some((row, _)) = self.labels.iter().enumerate().find(|(_, &v)| v != 0.0 && v != 1.0) {
            return Err(ModelError::DatasetInvalid(format!(
                "row {} has a label other than 0 or 1",
                row
            )));
        }

        let mut distinct: HashSet<Vec<u64>> = HashSet::new();
        for row in self.features.rows() {
            distinct.insert(row.iter().map(|v| v.to_bits()).collect());
            if distinct.len() >= MIN_DISTINCT_ROWS {
                return Ok(());
            }
        }
        Err(ModelError::DatasetInvalid(format!(
            "dataset has {} rows but fewer than {} distinct feature rows",
            n, MIN_DISTINCT_ROWS
        )))
    }
}

/// Which dataset a training run should use
#[derive(Debug, Clone, Default)]
pub enum DataSource {
    /// The configured training-data path, or synthetic data when none is set
    #[default]
    Configured,
    /// An explicit CSV file
    File(PathBuf),
    /// Synthetic data with an explicit seed
    Synthetic { seed: u64 },
    /// Rows supplied directly by the caller
    Inline(Dataset),
}

/// Resolves a `DataSource` to a validated `Dataset`
#[derive(Debug, Clone)]
pub struct TrainingDataProvider {
    training_data_path: Option<PathBuf>,
    synthetic: SyntheticConfig,
}

impl TrainingDataProvider {
    pub fn new(training_data_path: Option<PathBuf>, synthetic: SyntheticConfig) -> Self {
        Self {
            training_data_path,
            synthetic,
        }
    }

    pub fn training_data_path(&self) -> Option<&Path> {
        self.training_data_path.as_deref()
    }

    /// Produce a validated dataset for `source`
    pub fn dataset(&self, source: DataSource) -> Result<Dataset> {
        let dataset = match source {
            DataSource::Configured => match &self.training_data_path {
                // An explicitly configured path never falls back to synthetic data
                Some(path) => load_csv(path)?,
                None => generate(&self.synthetic),
            },
            DataSource::File(path) => load_csv(&path)?,
            DataSource::Synthetic { seed } => generate(&SyntheticConfig {
                seed,
                ..self.synthetic.clone()
            }),
            DataSource::Inline(dataset) => dataset,
        };

        dataset.validate()?;
        debug!(
            origin = %dataset.origin,
            n_samples = dataset.n_samples(),
            n_features = dataset.n_features(),
            "Dataset validated"
        );
        if matches!(dataset.origin, DatasetOrigin::Synthetic { .. }) {
            info!(n_samples = dataset.n_samples(), origin = %dataset.origin, "Generated synthetic training data");
        }
        Ok(dataset)
    }
}
