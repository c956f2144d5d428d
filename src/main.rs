//! Trellis CLI entry point.

use clap::Parser;

use trellis::cli::commands::config::ConfigCommands;
use trellis::cli::{Cli, Commands};
use trellis::infrastructure::logging::LoggerImpl;
use trellis::ConfigLoader;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => trellis::cli::handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => trellis::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Query(args) => {
            trellis::cli::commands::query::execute(args, &config, cli.json).await
        }
        Commands::Config(command @ ConfigCommands::Show) => {
            trellis::cli::commands::config::execute(command, &config, cli.json)
        }
    };

    if let Err(err) = result {
        trellis::cli::handle_error(err, cli.json);
    }
}
