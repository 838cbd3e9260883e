//! HTTP front end for the model service.
//!
//! Exposes `GET /health`, `POST /predict` and `POST /retrain` over a shared
//! [`ModelManager`](crate::inference::ModelManager).

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::inference::ModelConfig;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Load or train the model in the background at startup
    pub warm_start: bool,
    pub model: ModelConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            warm_start: std::env::var("WARM_START")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false),
            model: ModelConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    let addr = config.address()?;
    let state = Arc::new(AppState::new(config.clone()));

    info!(
        address = %addr,
        model_path = %config.model.model_path.display(),
        training_data = ?config.model.training_data_path,
        n_features = config.model.n_features,
        warm_start = config.warm_start,
        started_at = %start_time.to_rfc3339(),
        "Model server starting"
    );

    if config.warm_start {
        let manager = Arc::clone(&state.manager);
        tokio::task::spawn_blocking(move || match manager.ensure_model() {
            Ok(()) => info!("Warm start complete, model is serving"),
            Err(e) => warn!(error = %e, "Warm start failed, will retry on first request"),
        });
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(
            uptime_secs = uptime.num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
