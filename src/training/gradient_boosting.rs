//! Gradient Boosting implementation
//!
//! A native Rust implementation of gradient boosted decision trees for
//! binary targets, similar in spirit to LightGBM's `binary` objective but
//! much simpler: each round grows a tree on the logistic gradients and
//! hessians, and adds its Newton-step leaves to the log-odds with shrinkage.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use crate::error::{InputError, ModelError, Result};

/// Floor on per-row curvature so saturated rows keep leaf values finite
const MIN_HESSIAN: f64 = 1e-16;

/// Row count above which scoring is split across the rayon pool
const PARALLEL_PREDICT_ROWS: usize = 4096;

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Subsample ratio for each tree
    pub subsample: f64,
    /// Column subsample ratio
    pub colsample_bytree: f64,
    /// L2 regularization on leaf values
    pub reg_lambda: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 6,
            min_samples_leaf: 1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            reg_lambda: 1.0,
            random_state: Some(42),
        }
    }
}

impl GradientBoostingConfig {
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }
}

/// Gradient Boosting Classifier (binary, logistic loss)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    initial_log_odds: f64,
    n_features: usize,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_log_odds: 0.0,
            n_features: 0,
        }
    }

    /// Fit binary classification. Labels must be 0 or 1.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(ModelError::TrainingFailed(format!(
                "feature rows ({}) and labels ({}) differ in length",
                n_samples,
                y.len()
            )));
        }
        if n_samples < 2 || n_features == 0 {
            return Err(ModelError::TrainingFailed(format!(
                "need at least 2 rows and 1 feature, got {}x{}",
                n_samples, n_features
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::TrainingFailed("feature matrix contains non-finite values".into()));
        }
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(ModelError::TrainingFailed("labels must be 0 or 1".into()));
        }
        if !(self.config.learning_rate > 0.0) || self.config.n_estimators == 0 {
            return Err(ModelError::TrainingFailed(format!(
                "invalid boosting parameters: n_estimators={}, learning_rate={}",
                self.config.n_estimators, self.config.learning_rate
            )));
        }

        // Clamp so a single-class dataset still yields finite log-odds
        let p = y.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
        self.initial_log_odds = (p / (1.0 - p)).ln();
        self.n_features = n_features;
        self.trees.clear();

        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        for _ in 0..self.config.n_estimators {
            // Newton statistics of log loss: descent direction y - p, curvature p(1 - p)
            let probs = log_odds.mapv(sigmoid);
            let gradients = y - &probs;
            let hessians = probs.mapv(|p| (p * (1.0 - p)).max(MIN_HESSIAN));

            let sample_indices = draw_indices(n_samples, self.config.subsample, &mut rng);
            let col_indices = draw_indices(n_features, self.config.colsample_bytree, &mut rng);

            let x_sub = x.select(Axis(0), &sample_indices).select(Axis(1), &col_indices);
            let g_sub = gradients.select(Axis(0), &sample_indices);
            let h_sub = hessians.select(Axis(0), &sample_indices);

            let mut tree = DecisionTree::new()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf)
                .with_reg_lambda(self.config.reg_lambda);
            tree.fit_gradients(&x_sub, &g_sub, &h_sub)?;
            tree.remap_features(&col_indices);

            let update = tree.predict(x);
            log_odds.scaled_add(self.config.learning_rate, &update);

            self.trees.push(tree);
        }

        if log_odds.iter().any(|v| !v.is_finite()) {
            self.trees.clear();
            return Err(ModelError::TrainingFailed("boosting diverged to non-finite scores".into()));
        }

        Ok(())
    }

    /// Predict probabilities of class 1, one per row in input order
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ModelError::TrainingFailed("model has not been fitted".into()));
        }
        if x.ncols() != self.n_features {
            return Err(InputError::RaggedRow {
                row: 0,
                expected: self.n_features,
                actual: x.ncols(),
            }
            .into());
        }

        let score = |row: ndarray::ArrayView1<f64>| {
            let raw = self
                .trees
                .iter()
                .fold(self.initial_log_odds, |acc, tree| {
                    acc + self.config.learning_rate * tree.predict_row(row)
                });
            sigmoid(raw)
        };

        let scores: Vec<f64> = if x.nrows() > PARALLEL_PREDICT_ROWS {
            (0..x.nrows()).into_par_iter().map(|i| score(x.row(i))).collect()
        } else {
            x.rows().into_iter().map(score).collect()
        };

        Ok(Array1::from_vec(scores))
    }

    /// Predict class labels (threshold 0.5)
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let probs = self.predict_proba(x)?;
        Ok(probs.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    /// Number of features seen at fit time
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    /// Structural check for models read back from disk
    pub fn check_integrity(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("model contains no trees".into());
        }
        if !self.initial_log_odds.is_finite() || !(self.config.learning_rate > 0.0) {
            return Err("model parameters are not finite".into());
        }
        match self.trees.iter().filter_map(DecisionTree::max_feature_index).max() {
            Some(idx) if idx >= self.n_features => Err(format!(
                "tree references feature {} but model has {} features",
                idx, self.n_features
            )),
            _ => Ok(()),
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Sorted random subset of `0..n` of size `ceil(n * ratio)` (at least 1)
fn draw_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let sample_size = (((n as f64) * ratio).ceil() as usize).clamp(1, n);
    let mut indices: Vec<usize> = (0..n).collect();
    if sample_size < n {
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((100, 2), (0..200).map(|i| i as f64 * 0.1).collect()).unwrap();

        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| if row[0] + row[1] > 10.0 { 1.0 } else { 0.0 })
            .collect();

        (x, y)
    }

    #[test]
    fn test_gradient_boosting_classifier() {
        let (x, y) = create_classification_data();
        let config = GradientBoostingConfig {
            n_estimators: 10,
            max_depth: 3,
            ..Default::default()
        };

        let mut model = GradientBoostingClassifier::new(config);
        model.fit(&x, &y).unwrap();

        let predictions = model.predict(&x).unwrap();
        assert_eq!(predictions.len(), 100);

        let correct = y
            .iter()
            .zip(predictions.iter())
            .filter(|(&yi, &pi)| (yi - pi).abs() < 0.5)
            .count();

        let accuracy = correct as f64 / y.len() as f64;
        assert!(accuracy > 0.9, "Accuracy ({}) should be above 90%", accuracy);
    }

    #[test]
    fn test_short_run_separates_classes() {
        let (x, y) = create_classification_data();
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig::default().with_n_estimators(20));
        model.fit(&x, &y).unwrap();

        let probs = model.predict_proba(&x).unwrap();
        for (p, label) in probs.iter().zip(y.iter()) {
            if *label == 1.0 {
                assert!(*p > 0.7, "positive row scored {}", p);
            } else {
                assert!(*p < 0.3, "negative row scored {}", p);
            }
        }
    }

    #[test]
    fn test_probabilities_in_unit_interval() {
        let (x, y) = create_classification_data();
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig::default().with_n_estimators(5));
        model.fit(&x, &y).unwrap();

        let probs = model.predict_proba(&x).unwrap();
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(model.n_features(), 2);
        assert_eq!(model.n_trees(), 5);
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = create_classification_data();
        let config = GradientBoostingConfig::default().with_n_estimators(8).with_random_state(7);

        let mut a = GradientBoostingClassifier::new(config.clone());
        let mut b = GradientBoostingClassifier::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_single_class_is_finite() {
        let x = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = Array1::from_vec(vec![1.0, 1.0, 1.0, 1.0]);

        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig::default().with_n_estimators(3));
        model.fit(&x, &y).unwrap();

        let probs = model.predict_proba(&x).unwrap();
        assert!(probs.iter().all(|p| p.is_finite() && *p > 0.5));
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let x = Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap();
        let y = Array1::from_vec(vec![0.0, 2.0, 1.0]);

        let err = GradientBoostingClassifier::new(GradientBoostingConfig::default())
            .fit(&x, &y)
            .unwrap_err();
        assert!(matches!(err, ModelError::TrainingFailed(_)));
    }

    #[test]
    fn test_predict_wrong_width() {
        let (x, y) = create_classification_data();
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig::default().with_n_estimators(2));
        model.fit(&x, &y).unwrap();

        let narrow = Array2::zeros((1, 1));
        let err = model.predict_proba(&narrow).unwrap_err();
        assert!(matches!(
            err,
            ModelError::InvalidInput(InputError::RaggedRow { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_unfitted_model_fails_integrity() {
        let model = GradientBoostingClassifier::new(GradientBoostingConfig::default());
        assert!(model.check_integrity().is_err());
    }
}
