//! Recall CLI - command-line interface for the recall rendering core.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recall")]
#[command(author, version, about = "Recall rendering core CLI", long_about = None)]
struct Cli {
    /// Engine configuration file (defaults to the user config)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a run offline into a WAV file
    Render(commands::render::RenderArgs),

    /// Play a run in real time on the configured device
    Play(commands::play::PlayArgs),

    /// Print the delay and attack tables of a timing configuration
    Timing(commands::timing::TimingArgs),

    /// List audio output devices
    Devices(commands::devices::DevicesArgs),

    /// Show or create the engine configuration
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Render(args) => commands::render::run(args, config),
        Commands::Play(args) => commands::play::run(args, config),
        Commands::Timing(args) => commands::timing::run(args, config),
        Commands::Devices(args) => commands::devices::run(args),
        Commands::Config(args) => commands::config::run(args, config),
    }
}
