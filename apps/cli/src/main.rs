//! Vecta CLI - Command-line interface for the Vecta embedding service
//!
//! This CLI provides a `vecta` command for embedding text with locally cached
//! models, validating model ids and running the service in the foreground.

mod commands;

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vecta_core::Settings;
use vecta_models::ProviderKind;

use commands::{embed, run, status, validate};

/// Vecta CLI - Local embedding service with a bounded model cache
#[derive(Parser, Debug)]
#[command(
    name = "vecta",
    author,
    version,
    about = "Vecta - Local embedding service with a bounded model cache"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error). Overrides RUST_LOG and settings.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Settings file (defaults to ./vecta.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Embedding provider (mock, fastembed)
    #[arg(short, long, global = true, value_parser = parse_provider)]
    provider: Option<ProviderKind>,

    /// Start without warming up the required models
    #[arg(long, global = true)]
    skip_warm_up: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Embed a single text and print the result as JSON
    Embed {
        /// Model identifier
        #[arg(short, long)]
        model: String,

        /// Text to embed
        text: String,
    },

    /// Embed several texts in one call and print the result as JSON
    Batch {
        /// Model identifier
        #[arg(short, long)]
        model: String,

        /// Texts to embed, in order
        texts: Vec<String>,
    },

    /// Check that models can be loaded and run, without caching them
    ///
    /// Exits non-zero if any model fails.
    Validate {
        /// Model identifiers
        #[arg(required = true)]
        models: Vec<String>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Warm up the required models and print service health as JSON
    Status,

    /// Run the service in the foreground until Ctrl-C
    Run {
        /// Seconds between health log lines
        #[arg(long, default_value_t = 60)]
        health_interval: u64,
    },
}

fn parse_provider(raw: &str) -> Result<ProviderKind, String> {
    ProviderKind::from_str(raw)
        .map_err(|()| format!("unknown provider '{raw}' (expected mock or fastembed)"))
}

/// Resolve the log filter: `--log-level`, then `RUST_LOG`, then settings.
fn log_filter(cli_level: Option<&str>, settings: &Settings) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(kind) = args.provider {
        settings.provider.kind = kind;
    }
    if let Some(level) = &args.log_level {
        settings.log_level.clone_from(level);
    }

    // Logs go to stderr so stdout stays parseable JSON.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(args.log_level.as_deref(), &settings))
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let skip_warm_up = args.skip_warm_up;
    match args.command {
        Command::Embed { model, text } => {
            embed::execute_single(settings, skip_warm_up, &model, &text).await?;
        }
        Command::Batch { model, texts } => {
            embed::execute_batch(settings, skip_warm_up, &model, &texts).await?;
        }
        Command::Validate { models, json } => {
            validate::execute(settings, &models, json).await?;
        }
        Command::Status => {
            status::execute(settings, skip_warm_up).await?;
        }
        Command::Run { health_interval } => {
            run::execute(settings, skip_warm_up, health_interval).await?;
        }
    }

    Ok(())
}
