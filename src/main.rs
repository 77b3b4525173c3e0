use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobwatch::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "jobwatch",
    version,
    about = "Job posting watcher relaying new vacancies through RabbitMQ to Telegram",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file; environment variables are used when absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll sources on a schedule and publish new postings
    Observe,

    /// Consume postings and deliver them to chat recipients
    Relay,

    /// Declare the broker topology and exit
    Declare,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Observe => {
            tracing::info!(sources = config.sources.len(), "Starting observe command");
            commands::observe(config).await?;
        }

        Commands::Relay => {
            tracing::info!(
                recipients = config.notifier.recipients.len(),
                "Starting relay command"
            );
            commands::relay(config).await?;
        }

        Commands::Declare => {
            tracing::info!("Starting declare command");
            commands::declare(config).await?;
        }
    }

    tracing::info!("jobwatch stopped");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("jobwatch=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("jobwatch={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}
