//! gbdt-serve - gradient-boosted tree inference service
//!
//! Serves a single binary classifier over HTTP. The model is loaded from
//! disk, or trained and persisted, the first time it is needed, and can be
//! replaced at runtime without interrupting in-flight predictions.
//!
//! # Modules
//!
//! - [`training`] - Gradient boosting with Newton-step regression trees
//! - [`data`] - Training datasets from CSV files, inline rows or synthetic generation
//! - [`store`] - Atomic model persistence
//! - [`inference`] - Model lifecycle manager
//! - [`server`] - HTTP API
//! - [`cli`] - Command-line interface
//! - [`logging`] - Tracing setup

pub mod error;

pub mod data;
pub mod store;
pub mod training;

pub mod inference;

pub mod cli;
pub mod logging;
pub mod server;

pub use error::{InputError, ModelError, Result};

/// Prelude for common imports
pub mod prelude {
    pub use crate::data::{DataSource, Dataset, DatasetOrigin};
    pub use crate::error::{InputError, ModelError, Result};
    pub use crate::inference::{LifecycleState, ModelConfig, ModelManager, RetrainReport};
    pub use crate::store::ModelStore;
    pub use crate::training::{GradientBoostingConfig, TrainedModel};
}
