mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            ref manifest,
            ref workflow,
            ref input,
            ref output,
            stats,
        } => {
            commands::run::execute(
                &cli.config,
                manifest,
                workflow.clone(),
                input,
                output,
                stats,
            )
            .await
        }
        Commands::Validate { ref manifest } => {
            commands::validate::execute(&cli.config, manifest.as_deref()).await
        }
        Commands::Functions => commands::functions::execute(&cli.config).await,
    };

    let code = match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            commands::EXIT_BAD_CONFIGURATION
        }
    };
    std::process::exit(code);
}
