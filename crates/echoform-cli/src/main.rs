//! echoform CLI - validate, hash, inspect and render audio graph specs.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "echoform")]
#[command(author, version, about = "echoform audio graph CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a spec file for structural errors
    Validate(commands::validate::ValidateArgs),

    /// Print the content hash of a spec
    Hash(commands::hash::HashArgs),

    /// List nodes, sinks and upstream chains
    Inspect(commands::inspect::InspectArgs),

    /// Render a spec (or one node's chain) to WAV
    Render(commands::render::RenderArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(args) => commands::validate::run(args),
        Commands::Hash(args) => commands::hash::run(args),
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Render(args) => commands::render::run(args),
    }
}
