//! # edgar-fetch
//!
//! Incremental, rate-limited fetch engine for the SEC EDGAR full index.
//!
//! ## Design Philosophy
//!
//! edgar-fetch is designed to be:
//! - **Polite** - token-bucket admission control per host, configurable
//!   minimum inter-request interval and concurrency ceiling
//! - **Incremental** - a durable ledger records every fetched document, so
//!   re-running a year range fetches only what is missing
//! - **Resumable** - the index cursor is persisted; a cancelled or failed
//!   run continues where it left off
//! - **Library-first** - the CLI binary is a thin wrapper over the crate
//!
//! ## Quick Start
//!
//! ```no_run
//! use edgar_fetch::{Config, Crawler, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.crawl.start_year = 2019;
//!     config.crawl.end_year = 2020;
//!
//!     let crawler = Crawler::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = crawler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = crawler.run().await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Top-level crawler wiring and run loop
pub mod crawler;
/// Error types
pub mod error;
/// Quarterly index traversal
pub mod index;
/// Durable dedup ledger
pub mod ledger;
/// Per-host rate limiting
pub mod limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Fetch task scheduling and dispatch
pub mod scheduler;
/// Atomic persistence of fetched documents
pub mod sink;
/// Composable content transforms
pub mod transform;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, CrawlConfig, IndexConfig, RateLimitConfig, RetryConfig, StorageConfig};
pub use crawler::Crawler;
pub use error::{DatabaseError, Error, Result};
pub use index::{IndexPage, IndexWalker};
pub use ledger::{Ledger, RecordOutcome};
pub use limiter::{RateLimitPermit, RateLimiter};
pub use scheduler::FetchScheduler;
pub use sink::{SinkWriter, StoredBlob};
pub use transform::{FetchTransform, IdentityTransform};
pub use types::{CrawlReport, Cursor, DocumentDescriptor, Event, FetchTask, LedgerEntry};

/// Helper function to run the crawler with graceful signal handling.
///
/// Runs the crawl to completion, or cancels it cooperatively when a
/// termination signal arrives and waits for it to settle.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use edgar_fetch::{Config, Crawler, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut config = Config::default();
///     config.crawl.start_year = 2019;
///     config.crawl.end_year = 2019;
///     let crawler = Crawler::new(config).await?;
///
///     let report = run_with_shutdown(crawler).await?;
///     println!("{report}");
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(crawler: Crawler) -> Result<types::CrawlReport> {
    let crawler = std::sync::Arc::new(crawler);

    let mut run_handle = {
        let crawler = crawler.clone();
        tokio::spawn(async move { crawler.run().await })
    };

    tokio::select! {
        result = &mut run_handle => flatten_join(result),
        _ = wait_for_signal() => {
            crawler.cancel();
            flatten_join(run_handle.await)
        }
    }
}

fn flatten_join(
    joined: std::result::Result<Result<types::CrawlReport>, tokio::task::JoinError>,
) -> Result<types::CrawlReport> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(Error::Other(format!("crawl task failed: {e}"))),
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
