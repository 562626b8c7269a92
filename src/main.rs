use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use debug_hub::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // The logging format lives in the config file; fall back to pretty when it can't be read yet.
    let format = debug_hub::config::load_config_from(&args.config)
        .map(|cfg| cfg.logging.format)
        .unwrap_or_else(|_| "pretty".to_string());
    init_tracing(&format);

    match args.get_command() {
        cli::Commands::Start { demo } => {
            commands::start::execute(&args.config, demo).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Version => {
            println!("Debug Hub v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
