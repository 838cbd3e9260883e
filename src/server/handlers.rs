//! Request handlers
//!
//! Thin translation between JSON bodies and `ModelManager` calls. Manager
//! work is CPU bound (training, scoring) so it runs on the blocking pool.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

use crate::data::{DataSource, Dataset};

use super::error::{Result, ServerError};
use super::state::AppState;

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(format!("worker task failed: {}", e)))?
        .map_err(ServerError::from)
}

/// Parse a JSON body, reporting failures in the service's error shape
fn parse_json<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| ServerError::BadRequest(format!("invalid {} body: {}", what, e)))
}

// ============================================================================
// Health
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let status = state.manager.status();
    Json(serde_json::json!({
        "status": if status.ready { "ok" } else { "unavailable" },
        "ready": status.ready,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime_secs(),
        "address": format!("{}:{}", state.config.host, state.config.port),
        "model": status,
    }))
}

// ============================================================================
// Inference
// ============================================================================

/// A batch of rows, or a single bare row
#[derive(Deserialize)]
#[serde(untagged)]
pub enum Features {
    Batch(Vec<Vec<f64>>),
    Single(Vec<f64>),
}

impl Features {
    fn into_rows(self) -> Vec<Vec<f64>> {
        match self {
            Features::Batch(rows) => rows,
            Features::Single(row) => vec![row],
        }
    }
}

#[derive(Deserialize)]
pub struct PredictRequest {
    features: Features,
}

pub async fn predict(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<serde_json::Value>> {
    let request: PredictRequest = parse_json(&body, "predict")?;
    let rows = request.features.into_rows();
    let manager = Arc::clone(&state.manager);
    let predictions = run_blocking(move || manager.predict(&rows)).await?;

    Ok(Json(serde_json::json!({
        "predictions": predictions,
    })))
}

// ============================================================================
// Retraining
// ============================================================================

/// Optional retrain body; at most one source may be given
#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RetrainRequest {
    data_path: Option<String>,
    seed: Option<u64>,
    /// Inline rows, last value of each row is the label
    rows: Option<Vec<Vec<f64>>>,
}

impl RetrainRequest {
    /// `data_dir` is the directory of the configured training file; HTTP
    /// callers may only name files inside it
    fn into_source(self, data_dir: Option<&Path>) -> Result<DataSource> {
        match (self.data_path, self.seed, self.rows) {
            (None, None, None) => Ok(DataSource::Configured),
            (Some(path), None, None) => Ok(DataSource::File(resolve_data_path(&path, data_dir)?)),
            (None, Some(seed), None) => Ok(DataSource::Synthetic { seed }),
            (None, None, Some(rows)) => Ok(DataSource::Inline(Dataset::from_labeled_rows(&rows)?)),
            _ => Err(ServerError::BadRequest(
                "specify at most one of data_path, seed, rows".to_string(),
            )),
        }
    }
}

/// Resolve a requested training file against the allowed directory.
///
/// Relative paths are taken relative to `data_dir`. `..` components are
/// refused, and an existing file must still lie inside `data_dir` once
/// symlinks are resolved.
fn resolve_data_path(requested: &str, data_dir: Option<&Path>) -> Result<PathBuf> {
    let data_dir = data_dir.ok_or_else(|| {
        ServerError::BadRequest("data_path is not accepted: no training data file is configured".to_string())
    })?;
    let outside = || ServerError::BadRequest("data_path must name a file inside the training data directory".to_string());

    let requested = Path::new(requested);
    if requested.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(outside());
    }
    let candidate = data_dir.join(requested);
    if !candidate.starts_with(data_dir) {
        return Err(outside());
    }

    if candidate.exists() {
        let root = data_dir.canonicalize().map_err(|_| outside())?;
        let resolved = candidate.canonicalize().map_err(|_| outside())?;
        if !resolved.starts_with(&root) {
            return Err(outside());
        }
    }
    Ok(candidate)
}

pub async fn retrain(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<serde_json::Value>> {
    let request: RetrainRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RetrainRequest::default()
    } else {
        parse_json(&body, "retrain")?
    };
    let data_dir = state
        .manager
        .config()
        .training_data_path
        .as_deref()
        .map(|path| match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        });
    let source = request.into_source(data_dir)?;

    let manager = Arc::clone(&state.manager);
    let report = run_blocking(move || manager.retrain(source)).await?;
    info!(source = %report.source, n_samples = report.n_samples, "Retrain request completed");

    Ok(Json(serde_json::json!({
        "success": true,
        "n_samples": report.n_samples,
        "n_features": report.n_features,
        "source": report.source,
        "trained_at": report.trained_at.to_rfc3339(),
    })))
}
