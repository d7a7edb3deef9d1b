//! Ferry CLI - Command-line interface for application deployment
//!
//! This CLI provides operators and developers with a terminal interface to:
//! - Resolve manifests with inheritance and variables, and write them back out
//! - Decompose route strings and preview hostnames
//! - Rehearse a push against an in-memory platform

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
mod output;

use commands::{manifest, playground, route};
use config::CliConfig;
use error::CliResult;

/// Ferry CLI application
#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Ferry - Application deployment orchestration CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FERRY_CONFIG")]
    config: Option<String>,

    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table")]
    output: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Resolve and normalize manifests
    Manifest {
        #[command(subcommand)]
        command: manifest::ManifestCommands,
    },

    /// Inspect route strings and hostnames
    Route {
        #[command(subcommand)]
        command: route::RouteCommands,
    },

    /// Push against an in-memory platform
    Playground {
        #[command(subcommand)]
        command: playground::PlaygroundCommands,
    },

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    // Load config
    let config = CliConfig::load(cli.config.as_deref())?;
    debug!(path = ?cli.config, "Loaded configuration");

    // Execute command
    match cli.command {
        Commands::Manifest { command } => {
            manifest::execute(command, config.variables.as_deref(), cli.output)
        }
        Commands::Route { command } => route::execute(command, cli.output),
        Commands::Playground { command } => {
            playground::execute(command, &config, cli.output).await
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
