//! ClipSync CLI - clipboard & file relay for paired devices.

mod commands;
mod ui;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clipsync")]
#[command(about = "Relay server for clipboard and file sync between paired devices", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server (default)
    Run,
    /// Show the resolved configuration
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = clipsync_core::Config::from_env();

    let level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("clipsync_core={level}").parse()?)
                .add_directive(format!("clipsync_cli={level}").parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run_relay(config).await?,
        Commands::Info => commands::show_info(&config),
    }

    Ok(())
}
