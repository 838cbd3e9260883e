//! Inference module
//!
//! Model lifecycle management: lazy load-or-train, validated concurrent
//! prediction and copy-then-swap retraining.

mod config;
mod manager;

pub use config::{ModelConfig, DEFAULT_MODEL_PATH, DEFAULT_N_FEATURES};
pub use manager::{LifecycleState, LifecycleStats, ModelManager, ModelStatus, RetrainReport};
