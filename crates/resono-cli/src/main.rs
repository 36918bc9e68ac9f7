//! resono CLI - play and render FM instruments from the command line.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resono")]
#[command(author, version, about = "resono FM synthesizer and looper", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio systems, output devices and their sample rates
    Devices(commands::devices::DevicesArgs),

    /// List and export instruments and bindings
    Presets(commands::presets::PresetsArgs),

    /// Render a note or controller script to a WAV file
    Render(commands::render::RenderArgs),

    /// Play an instrument live, driven by controller events on stdin
    Play(commands::play::PlayArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices(args) => commands::devices::run(args),
        Commands::Presets(args) => commands::presets::run(args),
        Commands::Render(args) => commands::render::run(args),
        Commands::Play(args) => commands::play::run(args),
    }
}
