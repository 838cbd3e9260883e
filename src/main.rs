//! gbdt-serve entry point

use clap::Parser;
use gbdt_serve::cli::{cmd_predict, cmd_serve, cmd_train, Cli, Commands};
use gbdt_serve::logging::{self, LoggingConfig};
use gbdt_serve::server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(&LoggingConfig::default())?;

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { host, port, warm, model }) => {
            let defaults = ServerConfig::default();
            let config = ServerConfig {
                host,
                port,
                warm_start: warm || defaults.warm_start,
                model: model.to_config(),
            };
            cmd_serve(config).await?;
        }
        Some(Commands::Train { data, seed, model }) => {
            cmd_train(&model, data, seed)?;
        }
        Some(Commands::Predict { features, model }) => {
            cmd_predict(&model, &features)?;
        }
        None => {
            cmd_serve(ServerConfig::default()).await?;
        }
    }

    Ok(())
}
