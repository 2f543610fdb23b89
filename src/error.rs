//! Error types for edgar-fetch
//!
//! This module provides the error taxonomy for the crate:
//! - Per-run failures (`IndexUnavailable`) that halt traversal but leave the
//!   run resumable from the persisted cursor
//! - Per-descriptor failures (`FetchExhausted`) that are reported and counted
//!   without aborting the run
//! - Transient failures (`HttpStatus`, `Network`, `WriteFailed`) that are
//!   eligible for retry with backoff (see [`crate::retry`])

use thiserror::Error;

/// Result type alias for edgar-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for edgar-fetch
///
/// Each variant includes contextual information to help diagnose issues.
/// Retryability is classified separately via [`crate::retry::IsRetryable`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "crawl.start_year")
        key: Option<String>,
    },

    /// Ledger database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Index page could not be fetched after the walker's internal retry budget
    ///
    /// This halts the current run segment; the run is resumable from the
    /// persisted cursor. Never retried at the scheduler level.
    #[error("index unavailable: {url} ({attempts} attempts)")]
    IndexUnavailable {
        /// URL of the index page that could not be fetched
        url: String,
        /// Number of attempts made before giving up
        attempts: u32,
    },

    /// Index page payload was not a readable archive
    #[error("index archive error: {0}")]
    IndexArchive(String),

    /// Remote returned a non-success HTTP status
    ///
    /// 429 and 5xx statuses are transient and retried with backoff; other
    /// statuses are terminal for the descriptor.
    #[error("HTTP status {status} for {url}")]
    HttpStatus {
        /// The HTTP status code returned by the remote
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// Network error (connect failure, timeout, protocol error)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local persist of fetched content failed
    ///
    /// Treated as transient: the remote copy is still available, only the
    /// local staging or rename step failed.
    #[error("write failed for {identifier}: {reason}")]
    WriteFailed {
        /// Identifier of the document whose persist failed
        identifier: String,
        /// The reason the write failed
        reason: String,
    },

    /// All retry attempts for a document were exhausted
    ///
    /// Terminal for the descriptor; reported and counted, never fatal to the
    /// overall run.
    #[error("fetch exhausted for {identifier} after {attempts} attempts")]
    FetchExhausted {
        /// Identifier of the document that could not be fetched
        identifier: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new fetch tasks
    #[error("shutdown in progress: not accepting new fetch tasks")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Ledger database errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to the ledger database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}
