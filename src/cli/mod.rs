//! Command-line interface: run the server, train a model, or score rows.

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::*;

use crate::data::DataSource;
use crate::inference::{ModelConfig, ModelManager, DEFAULT_MODEL_PATH, DEFAULT_N_FEATURES};
use crate::server::{run_server, ServerConfig};

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}

fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}

fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn kv(key: &str, val: &str) {
    println!("  {} {}", dim(key), val.white());
}

fn step_run(msg: &str) {
    write_step(&mut std::io::stdout(), msg);
}

/// The line stays open until `step_done`, so flush to show it while the step runs
fn write_step<W: Write>(out: &mut W, msg: &str) {
    let _ = write!(out, "  {} {}... ", accent("›"), msg);
    let _ = out.flush();
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

#[derive(Parser)]
#[command(name = "gbdt-serve")]
#[command(author, version, about = "Gradient-boosted tree model service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Model lifecycle options shared by every command
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Model file to load or create
    #[arg(long, env = "MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    pub model_path: PathBuf,

    /// CSV used for default training (features..., label)
    #[arg(long, env = "TRAINING_DATA_PATH")]
    pub data_path: Option<PathBuf>,

    /// Feature count of the synthetic bootstrap dataset
    #[arg(long, env = "N_FEATURES", default_value_t = DEFAULT_N_FEATURES)]
    pub n_features: usize,
}

impl ModelArgs {
    pub fn to_config(&self) -> ModelConfig {
        let config = ModelConfig::new(&self.model_path).with_n_features(self.n_features);
        match &self.data_path {
            Some(path) => config.with_training_data(path),
            None => config,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Host to bind to
        #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, env = "API_PORT", default_value = "8000")]
        port: u16,

        /// Load or train the model at startup instead of on first request
        #[arg(long)]
        warm: bool,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Train a model and write it to the model path
    Train {
        /// Training CSV; defaults to the configured data or synthetic data
        #[arg(short, long, conflicts_with = "seed")]
        data: Option<PathBuf>,

        /// Train on synthetic data with this seed
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Score rows given as JSON, e.g. '[[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]]'
    Predict {
        /// JSON array of rows, or a single row
        #[arg(short, long)]
        features: String,

        #[command(flatten)]
        model: ModelArgs,
    },
}

pub async fn cmd_serve(config: ServerConfig) -> anyhow::Result<()> {
    println!();
    println!("  {} {}", "gbdt-serve".white().bold(), dim(&format!("v{}", env!("CARGO_PKG_VERSION"))));
    kv("Health ", &format!("http://{}:{}/health", config.host, config.port));
    kv("Predict", &format!("http://{}:{}/predict", config.host, config.port));
    kv("Model  ", &config.model.model_path.display().to_string());
    println!("  {}", dim("ctrl+c to stop"));
    println!();

    run_server(config).await
}

pub fn cmd_train(model: &ModelArgs, data: Option<PathBuf>, seed: Option<u64>) -> anyhow::Result<()> {
    let source = match (data, seed) {
        (Some(path), _) => DataSource::File(path),
        (None, Some(seed)) => DataSource::Synthetic { seed },
        (None, None) => DataSource::Configured,
    };

    let manager = ModelManager::new(model.to_config());
    let start = Instant::now();
    step_run("Training model");
    let report = manager.retrain(source).context("training failed")?;
    step_done(&format!("{:.2}s", start.elapsed().as_secs_f64()));

    kv("Source  ", &report.source);
    kv("Samples ", &report.n_samples.to_string());
    kv("Features", &report.n_features.to_string());
    kv("Saved to", &model.model_path.display().to_string());
    Ok(())
}

pub fn cmd_predict(model: &ModelArgs, features: &str) -> anyhow::Result<()> {
    let rows = parse_rows(features)?;
    let manager = ModelManager::new(model.to_config());
    let predictions = manager.predict(&rows)?;
    println!("{}", serde_json::json!({ "predictions": predictions }));
    Ok(())
}

/// Accept `[[...], ...]` or a single `[...]` row
fn parse_rows(raw: &str) -> anyhow::Result<Vec<Vec<f64>>> {
    if let Ok(rows) = serde_json::from_str::<Vec<Vec<f64>>>(raw) {
        return Ok(rows);
    }
    let row: Vec<f64> = serde_json::from_str(raw).context("features must be a JSON array of numbers or of rows")?;
    Ok(vec![row])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingWriter {
        written: Vec<u8>,
        flushes: usize,
    }

    impl Write for RecordingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_step_line_is_flushed() {
        let mut out = RecordingWriter::default();
        write_step(&mut out, "Training model");
        assert_eq!(out.flushes, 1);
        assert!(String::from_utf8_lossy(&out.written).contains("Training model..."));
    }

    #[test]
    fn test_parse_rows() {
        assert_eq!(parse_rows("[[1, 2], [3, 4]]").unwrap().len(), 2);
        assert_eq!(parse_rows("[1.5, 2]").unwrap(), vec![vec![1.5, 2.0]]);
        assert!(parse_rows("{\"a\": 1}").is_err());
    }

    #[test]
    fn test_cli_parses_train() {
        let cli = Cli::try_parse_from([
            "gbdt-serve",
            "train",
            "--seed",
            "7",
            "--model-path",
            "/tmp/m.txt",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Train { seed, data, model }) => {
                assert_eq!(seed, Some(7));
                assert!(data.is_none());
                assert_eq!(model.to_config().model_path, PathBuf::from("/tmp/m.txt"));
            }
            _ => panic!("expected train command"),
        }
    }

    #[test]
    fn test_train_rejects_both_sources() {
        assert!(Cli::try_parse_from(["gbdt-serve", "train", "--seed", "1", "--data", "x.csv"]).is_err());
    }
}
