use clap::Parser;
use statbot::cli::{Cli, Commands};
use statbot::error::Result;

mod main_modes;
mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.clone().unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = load_config(&cli.config)?;
            init_logging(&config.logging);
            main_modes::run_daemon(config).await?;
        }
        Commands::Once => {
            let config = load_config(&cli.config)?;
            init_logging(&config.logging);
            main_modes::run_once(config).await?;
        }
        Commands::Preview => {
            init_logging_simple();
            let config = load_config(&cli.config)?;
            main_modes::run_preview(config).await?;
        }
        Commands::Channels => {
            init_logging_simple();
            let config = load_config(&cli.config)?;
            main_modes::show_channels(config).await?;
        }
        Commands::Migrate { from } => {
            init_logging_simple();
            let config = load_config(&cli.config)?;
            main_modes::run_migrate(config, &from)?;
        }
    }

    Ok(())
}
