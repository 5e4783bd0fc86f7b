//! narragraph CLI: the main entry point.
//!
//! Commands:
//! - `extract`: Build the narrative graph of a text file
//! - `providers`: List the predefined LLM providers

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "narragraph",
    about = "narragraph: narrative graphs from plain text",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract entities, actions and locations from a text file
    Extract {
        /// File holding the narrative text
        file: PathBuf,

        /// Provider to use instead of the configured default
        #[arg(short, long)]
        provider: Option<String>,

        /// Model to use instead of the provider default
        #[arg(short, long)]
        model: Option<String>,

        /// Print the graph as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the predefined providers
    Providers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Extract {
            file,
            provider,
            model,
            json,
        } => commands::extract::run(file, provider, model, json).await?,
        Commands::Providers => commands::providers::run().await?,
    }

    Ok(())
}
