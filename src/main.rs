//! Command-line entry point for edgar-fetch
//!
//! A single command: crawl a year range, print the run summary, and exit 0
//! on full completion, 1 if any document's retry budget was exhausted, or 2
//! when the run itself failed (bad configuration, unreachable index).

use clap::Parser;
use edgar_fetch::{Config, Crawler, run_with_shutdown};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "edgar-fetch",
    version,
    about = "Incremental, rate-limited fetch engine for the SEC EDGAR full index"
)]
struct Args {
    /// First year to crawl, inclusive
    #[arg(long)]
    start_year: i32,

    /// Last year to crawl, inclusive
    #[arg(long)]
    end_year: i32,

    /// JSON configuration file; command-line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// User-Agent header sent with every request
    #[arg(long)]
    user_agent: Option<String>,

    /// Directory for fetched documents
    #[arg(long)]
    document_dir: Option<PathBuf>,

    /// Ledger database path
    #[arg(long)]
    ledger: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::from(2);
        }
    };

    config.crawl.start_year = args.start_year;
    config.crawl.end_year = args.end_year;
    if let Some(user_agent) = args.user_agent {
        config.index.user_agent = user_agent;
    }
    if let Some(document_dir) = args.document_dir {
        config.storage.document_dir = document_dir;
    }
    if let Some(ledger) = args.ledger {
        config.storage.ledger_path = ledger;
    }

    let crawler = match Crawler::new(config).await {
        Ok(crawler) => crawler,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start crawler");
            return ExitCode::from(2);
        }
    };

    match run_with_shutdown(crawler).await {
        Ok(report) => {
            println!("{report}");
            if report.exhausted > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Crawl failed");
            ExitCode::from(2)
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(Config::default()),
    }
}
