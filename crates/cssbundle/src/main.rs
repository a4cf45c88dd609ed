//! cssbundle CLI - Main entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "cssbundle")]
#[command(version, about = "Stylesheet bundler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the stylesheet of one build unit
    Build {
        /// Build unit description (TOML)
        unit: String,

        /// Directory for the globals cache (defaults to `<root>/.cssbundle`)
        #[arg(long)]
        cache_dir: Option<String>,

        /// Write the stylesheet to stdout instead of the target file
        #[arg(long)]
        stdout: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cssbundle=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            unit,
            cache_dir,
            stdout,
        } => commands::build::execute(commands::build::BuildArgs {
            unit,
            cache_dir,
            stdout,
        }),
    }
}
