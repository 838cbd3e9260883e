//! Model store
//!
//! Persists a `TrainedModel` as pretty JSON text inside a small versioned
//! envelope. Writes go to a temporary file in the target directory which is
//! then renamed over the destination, so readers only ever see a complete
//! file.

use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{ModelError, Result};
use crate::training::TrainedModel;

/// Format tag written into every model file
pub const MODEL_FORMAT: &str = "gbdt-serve/booster";
/// Current envelope version
pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ModelFileRef<'a> {
    format: &'a str,
    format_version: u32,
    model: &'a TrainedModel,
}

#[derive(Deserialize)]
struct ModelFile {
    format: String,
    format_version: u32,
    model: TrainedModel,
}

/// File-backed store for the single served model
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a model file is present at the configured path
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Atomically write `model` to the configured path
    pub fn save(&self, model: &TrainedModel) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| ModelError::store_io(&dir, e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| ModelError::store_io(&dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let envelope = ModelFileRef {
                format: MODEL_FORMAT,
                format_version: MODEL_FORMAT_VERSION,
                model,
            };
            serde_json::to_writer_pretty(&mut writer, &envelope)
                .map_err(|e| ModelError::store_io(&self.path, e))?;
            writer.flush().map_err(|e| ModelError::store_io(&self.path, e))?;
        }
        tmp.as_file().sync_all().map_err(|e| ModelError::store_io(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| ModelError::store_io(&self.path, e.error))?;

        info!(
            path = %self.path.display(),
            n_features = model.n_features(),
            "Model saved"
        );
        Ok(())
    }

    /// Read and verify the model at the configured path
    pub fn load(&self) -> Result<TrainedModel> {
        let text = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ModelError::store_io(&self.path, "model file not found"),
            _ => ModelError::store_io(&self.path, e),
        })?;

        let file: ModelFile = serde_json::from_str(&text)
            .map_err(|e| ModelError::store_io(&self.path, format!("malformed model file: {}", e)))?;

        if file.format != MODEL_FORMAT {
            return Err(ModelError::store_io(
                &self.path,
                format!("unrecognized model format '{}'", file.format),
            ));
        }
        if file.format_version != MODEL_FORMAT_VERSION {
            return Err(ModelError::store_io(
                &self.path,
                format!("unsupported model format version {}", file.format_version),
            ));
        }
        file.model
            .verify()
            .map_err(|reason| ModelError::store_io(&self.path, format!("corrupt model: {}", reason)))?;

        debug!(path = %self.path.display(), bytes = text.len(), "Model file parsed");
        info!(
            path = %self.path.display(),
            n_features = file.model.n_features(),
            trained_at = %file.model.metadata().trained_at.to_rfc3339(),
            "Model loaded"
        );
        Ok(file.model)
    }
}
