//! Boosted-tree training module
//!
//! The model library the service treats as a black box:
//! - Regression trees (weak learners)
//! - Binary gradient boosting with logistic loss (`fit` / `predict_proba`)
//! - `TrainedModel`, the fitted artifact the service persists and serves

pub mod decision_tree;
pub mod gradient_boosting;
pub mod model;

pub use decision_tree::{DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use model::{ModelMetadata, TrainedModel};
