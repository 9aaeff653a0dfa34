use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use scout_core::{PipelineOrchestrator, ScoutConfig};
use scout_remote::{GeminiBackend, SerperSearch};

/// scout: find open-source repositories that fit a project requirement.
///
/// Extracts technical criteria from the requirement, searches GitHub for
/// candidates, and prints them ranked by how well they match.
#[derive(Parser, Debug)]
#[command(name = "scout", version, about)]
struct Cli {
    /// Requirement in plain prose. Read from stdin when omitted.
    requirement: Option<String>,

    /// Config file to use instead of ~/.config/scout/config.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Only show the first N candidates.
    #[arg(long)]
    top: Option<usize>,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the report.
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match cli.config {
        Some(ref path) => ScoutConfig::load_from(path)?,
        None => ScoutConfig::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            ScoutConfig::default()
        }),
    };
    config.apply_env();
    config.validate()?;

    let requirement = match cli.requirement {
        Some(text) => text,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read requirement from stdin")?;
            text
        }
    };

    tracing::info!("Starting scout v{}", env!("CARGO_PKG_VERSION"));

    let backend = Arc::new(GeminiBackend::new(&config.api_keys, &config.backend)?);
    let surface = Arc::new(SerperSearch::new(&config.api_keys, &config.search)?);
    let pipeline = PipelineOrchestrator::from_config(&config, backend, surface);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match pipeline.run_until_cancelled(&requirement, cancel).await {
        Ok(report) => {
            if cli.json {
                println!("{}", report.to_json()?);
            } else {
                print!("{}", report.render(cli.top));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("scout: {} stage failed", err.stage);
            eprintln!("  {}", err.cause);
            if let scout_core::ScoutError::Analysis {
                raw_response: Some(ref raw),
                ..
            } = err.cause
            {
                tracing::debug!(raw_response = %raw, "backend reply");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
