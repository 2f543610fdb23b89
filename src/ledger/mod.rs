//! Durable dedup ledger for edgar-fetch
//!
//! SQLite persistence recording which documents have been fetched, surviving
//! process restarts. The ledger is the single source of truth for "already
//! fetched"; the scheduler only queries membership and requests insertion.
//!
//! ## Submodules
//!
//! Methods on [`Ledger`] are organized by domain:
//! - [`migrations`] — database lifecycle, schema migrations
//! - [`entries`] — fetched-document membership and insertion
//! - [`cursor`] — index walker position persistence

use sqlx::sqlite::SqlitePool;

mod cursor;
mod entries;
mod migrations;

/// Outcome of recording a ledger entry
///
/// Insertion is idempotent: recording the same identifier twice returns
/// [`RecordOutcome::AlreadyRecorded`] without error, so crash-and-resume
/// never double-counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The entry was inserted
    Recorded,
    /// An entry for this identifier already existed; nothing was changed
    AlreadyRecorded,
}

/// Ledger database handle
pub struct Ledger {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
