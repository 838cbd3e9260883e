//! Model lifecycle manager
//!
//! Owns the single served model. The first caller that needs a model loads
//! it from the store or trains and persists one; concurrent first callers
//! wait on the same write gate instead of training again. Predictions take
//! an `Arc` snapshot of the current model under a short read lock, so a
//! retrain only contends with them for the instant of the swap.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::ModelConfig;
use crate::data::{DataSource, Dataset, TrainingDataProvider};
use crate::error::{InputError, ModelError, Result};
use crate::store::ModelStore;
use crate::training::TrainedModel;

/// Lifecycle of the served model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Failed = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LifecycleState::Initializing,
            2 => LifecycleState::Ready,
            3 => LifecycleState::Failed,
            _ => LifecycleState::Uninitialized,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    loads: AtomicU64,
    trainings: AtomicU64,
    saves: AtomicU64,
    predictions: AtomicU64,
    failed_retrains: AtomicU64,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LifecycleStats {
    /// Models read from the store
    pub loads: u64,
    /// Successful fits
    pub trainings: u64,
    /// Model files written
    pub saves: u64,
    /// Rows scored
    pub predictions: u64,
    pub failed_retrains: u64,
}

/// Serializable view of the manager for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub state: LifecycleState,
    pub ready: bool,
    pub model_path: String,
    pub n_features: Option<usize>,
    pub trained_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub stats: LifecycleStats,
}

/// Outcome of a successful retrain
#[derive(Debug, Clone, Serialize)]
pub struct RetrainReport {
    pub n_samples: usize,
    pub n_features: usize,
    pub source: String,
    pub trained_at: DateTime<Utc>,
}

/// Owns, initializes, serves and replaces the model
pub struct ModelManager {
    config: ModelConfig,
    store: ModelStore,
    provider: TrainingDataProvider,
    current: RwLock<Option<Arc<TrainedModel>>>,
    state: AtomicU8,
    /// Serializes initialization and retraining, the only writers of the model file
    write_gate: Mutex<()>,
    counters: Counters,
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("model_path", &self.store.path())
            .field("state", &self.state())
            .finish()
    }
}

impl ModelManager {
    pub fn new(config: ModelConfig) -> Self {
        let store = ModelStore::new(config.model_path.clone());
        let provider = TrainingDataProvider::new(config.training_data_path.clone(), config.synthetic());
        Self {
            config,
            store,
            provider,
            current: RwLock::new(None),
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
            write_gate: Mutex::new(()),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether a model is being served. Never blocks and never initializes.
    pub fn health(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    /// Make sure a model is loaded or trained. Safe to call concurrently.
    pub fn ensure_model(&self) -> Result<()> {
        self.snapshot().map(|_| ())
    }

    /// Score rows against the current model, in input order
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let model = self.snapshot()?;
        let x = validate_rows(rows, model.n_features())?;
        let scores = model.score(&x)?;
        self.counters
            .predictions
            .fetch_add(rows.len() as u64, Ordering::Relaxed);
        debug!(rows = rows.len(), "Scored batch");
        Ok(scores)
    }

    /// Train a replacement model and swap it in once it is trained and persisted.
    ///
    /// On failure the previously served model (if any) keeps serving.
    pub fn retrain(&self, source: DataSource) -> Result<RetrainReport> {
        let _gate = self.write_gate.lock();
        info!(state = ?self.state(), "Retraining model");

        let outcome = self
            .provider
            .dataset(source)
            .and_then(|dataset| self.fit(&dataset))
            .and_then(|model| self.persist(&model).map(|_| model));

        match outcome {
            Ok(model) => {
                let meta = model.metadata();
                let report = RetrainReport {
                    n_samples: meta.n_samples,
                    n_features: meta.n_features,
                    source: meta.source.clone(),
                    trained_at: meta.trained_at,
                };
                self.publish(Arc::new(model));
                info!(
                    n_samples = report.n_samples,
                    n_features = report.n_features,
                    source = %report.source,
                    "Retrained model is now serving"
                );
                Ok(report)
            }
            Err(e) => {
                self.counters.failed_retrains.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, serving = self.health(), "Retrain failed, keeping current model");
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> LifecycleStats {
        LifecycleStats {
            loads: self.counters.loads.load(Ordering::Relaxed),
            trainings: self.counters.trainings.load(Ordering::Relaxed),
            saves: self.counters.saves.load(Ordering::Relaxed),
            predictions: self.counters.predictions.load(Ordering::Relaxed),
            failed_retrains: self.counters.failed_retrains.load(Ordering::Relaxed),
        }
    }

    pub fn status(&self) -> ModelStatus {
        let current = self.current.read().clone();
        let state = self.state();
        ModelStatus {
            state,
            ready: state == LifecycleState::Ready,
            model_path: self.store.path().display().to_string(),
            n_features: current.as_ref().map(|m| m.n_features()),
            trained_at: current.as_ref().map(|m| m.metadata().trained_at),
            source: current.as_ref().map(|m| m.metadata().source.clone()),
            stats: self.stats(),
        }
    }

    /// Current model, initializing it first if needed.
    ///
    /// The handle keeps scoring with this model even if a retrain swaps in
    /// a replacement meanwhile.
    pub fn snapshot(&self) -> Result<Arc<TrainedModel>> {
        if let Some(model) = self.current.read().clone() {
            return Ok(model);
        }

        let _gate = self.write_gate.lock();
        // Another caller may have finished initialization while we waited
        if let Some(model) = self.current.read().clone() {
            return Ok(model);
        }

        self.set_state(LifecycleState::Initializing);
        match self.load_or_train() {
            Ok(model) => {
                let model = Arc::new(model);
                self.publish(Arc::clone(&model));
                Ok(model)
            }
            Err(e) => {
                self.set_state(LifecycleState::Failed);
                error!(error = %e, path = %self.store.path().display(), "Model initialization failed");
                Err(ModelError::unavailable(e))
            }
        }
    }

    fn load_or_train(&self) -> Result<TrainedModel> {
        if self.store.exists() {
            let model = self.store.load()?;
            self.counters.loads.fetch_add(1, Ordering::Relaxed);
            if model.n_features() != self.config.n_features {
                warn!(
                    model_features = model.n_features(),
                    configured_features = self.config.n_features,
                    "Loaded model feature count differs from configuration; validating against the model"
                );
            }
            return Ok(model);
        }

        info!(path = %self.store.path().display(), "No model file found, training a new model");
        let dataset = self.provider.dataset(DataSource::Configured)?;
        let model = self.fit(&dataset)?;
        self.persist(&model)?;
        Ok(model)
    }

    fn fit(&self, dataset: &Dataset) -> Result<TrainedModel> {
        let model = TrainedModel::train(dataset, self.config.boosting_for(&dataset.origin))?;
        self.counters.trainings.fetch_add(1, Ordering::Relaxed);
        Ok(model)
    }

    fn persist(&self, model: &TrainedModel) -> Result<()> {
        self.store.save(model)?;
        self.counters.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn publish(&self, model: Arc<TrainedModel>) {
        *self.current.write() = Some(model);
        self.set_state(LifecycleState::Ready);
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Reject empty, ragged or non-finite input before it reaches the model
fn validate_rows(rows: &[Vec<f64>], n_features: usize) -> std::result::Result<Array2<f64>, InputError> {
    if rows.is_empty() {
        return Err(InputError::Empty);
    }

    let mut flat = Vec::with_capacity(rows.len() * n_features);
    for (row_idx, row) in rows.iter().enumerate() {
        if row.len() != n_features {
            return Err(InputError::RaggedRow {
                row: row_idx,
                expected: n_features,
                actual: row.len(),
            });
        }
        if let Some(column) = row.iter().position(|v| !v.is_finite()) {
            return Err(InputError::NonFinite { row: row_idx, column });
        }
        flat.extend_from_slice(row);
    }

    // Shape is consistent by construction
    Array2::from_shape_vec((rows.len(), n_features), flat).map_err(|_| InputError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &tempfile::TempDir) -> ModelManager {
        ModelManager::new(ModelConfig::new(dir.path().join("models/model.txt")))
    }

    #[test]
    fn test_validate_rows() {
        assert_eq!(validate_rows(&[], 6).unwrap_err(), InputError::Empty);
        assert_eq!(
            validate_rows(&[vec![1.0, 2.0, 3.0]], 6).unwrap_err(),
            InputError::RaggedRow { row: 0, expected: 6, actual: 3 }
        );
        assert_eq!(
            validate_rows(&[vec![1.0, 2.0], vec![f64::NAN, 0.0]], 2).unwrap_err(),
            InputError::NonFinite { row: 1, column: 0 }
        );
        assert_eq!(validate_rows(&[vec![1.0, 2.0]], 2).unwrap().dim(), (1, 2));
    }

    #[test]
    fn test_health_does_not_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        assert!(!manager.health());
        assert_eq!(manager.state(), LifecycleState::Uninitialized);
        assert!(!dir.path().join("models/model.txt").exists());
        assert_eq!(manager.stats().trainings, 0);
    }

    #[test]
    fn test_ensure_model_trains_then_loads() {
        let dir = tempfile::tempdir().unwrap();

        let first = manager(&dir);
        first.ensure_model().unwrap();
        assert!(first.health());
        assert_eq!(first.stats().trainings, 1);
        assert_eq!(first.stats().saves, 1);

        // A fresh manager finds the persisted file and does not retrain
        let second = manager(&dir);
        second.ensure_model().unwrap();
        assert_eq!(second.stats().loads, 1);
        assert_eq!(second.stats().trainings, 0);
    }

    #[test]
    fn test_failed_init_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.csv");
        let manager = ModelManager::new(
            ModelConfig::new(dir.path().join("model.txt")).with_training_data(&data),
        );

        let err = manager.ensure_model().unwrap_err();
        assert!(matches!(err, ModelError::ModelUnavailable(_)), "{err}");
        assert_eq!(manager.state(), LifecycleState::Failed);

        std::fs::write(&data, "a,b,y\n0,0,0\n1,1,1\n0,1,0\n1,0,1\n").unwrap();
        manager.ensure_model().unwrap();
        assert!(manager.health());
    }

    #[test]
    fn test_status_reports_model() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);
        assert_eq!(manager.status().n_features, None);

        manager.ensure_model().unwrap();
        let status = manager.status();
        assert!(status.ready);
        assert_eq!(status.state, LifecycleState::Ready);
        assert_eq!(status.n_features, Some(6));
        assert_eq!(status.source.as_deref(), Some("synthetic(seed=42)"));
    }
}
