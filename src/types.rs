//! Core types for edgar-fetch

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use tokio::time::Instant;

/// Metadata identifying one remote document without its content
///
/// Produced by the index walker and immutable from then on. Equality and
/// hashing are defined by `identifier` alone: two descriptors for the same
/// accession number are the same document even if other fields drifted
/// between index revisions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    /// Unique document identifier (the accession number from the filing path)
    pub identifier: String,
    /// Year of the index page that produced this descriptor
    pub year: i32,
    /// Filing form type (e.g., "10-K")
    pub form_type: String,
    /// Absolute URL of the document content
    pub source_url: String,
}

impl PartialEq for DocumentDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for DocumentDescriptor {}

impl Hash for DocumentDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

impl std::fmt::Display for DocumentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} {})", self.identifier, self.form_type, self.year)
    }
}

/// One in-progress fetch, owned by the scheduler
///
/// Created when a descriptor passes the dedup check, mutated on each retry,
/// destroyed on terminal success or exhaustion. Task-local: never shared
/// across workers.
#[derive(Debug)]
pub struct FetchTask {
    /// The document being fetched
    pub descriptor: DocumentDescriptor,
    /// Number of attempts made so far
    pub attempt_count: u32,
    /// Earliest time the next attempt may start
    pub next_eligible: Instant,
}

impl FetchTask {
    /// Create a task for a descriptor, eligible immediately
    pub fn new(descriptor: DocumentDescriptor) -> Self {
        Self {
            descriptor,
            attempt_count: 0,
            next_eligible: Instant::now(),
        }
    }

    /// Record a failed attempt and push the next attempt out by `delay`
    pub fn reschedule(&mut self, delay: std::time::Duration) {
        self.attempt_count += 1;
        self.next_eligible = Instant::now() + delay;
    }
}

/// Durable record of one successfully fetched document
///
/// Append-only; owned exclusively by the ledger. Used for membership checks
/// only, never mutated.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct LedgerEntry {
    /// Document identifier
    pub identifier: String,
    /// Unix timestamp of the successful fetch
    pub fetched_at: i64,
    /// Hex-encoded SHA-256 hash of the stored content
    pub content_hash: String,
}

/// Index walker position, persisted across runs
///
/// Pagination is year × quarter; the cursor names the next page to fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Year of the next index page
    pub year: i32,
    /// Quarter of the next index page (1-4)
    pub quarter: u8,
}

impl Cursor {
    /// First page of a year range
    pub fn first(start_year: i32) -> Self {
        Self {
            year: start_year,
            quarter: 1,
        }
    }

    /// The page after this one, or `None` past the end of the range
    pub fn next(self, end_year: i32) -> Option<Self> {
        if self.quarter < 4 {
            Some(Self {
                year: self.year,
                quarter: self.quarter + 1,
            })
        } else if self.year < end_year {
            Some(Self {
                year: self.year + 1,
                quarter: 1,
            })
        } else {
            None
        }
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/QTR{}", self.year, self.quarter)
    }
}

/// Run summary reported at the end of a crawl
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    /// Documents fetched and recorded this run
    pub fetched: u64,
    /// Descriptors skipped because the ledger already held them
    pub skipped: u64,
    /// Descriptors whose retry budget was exhausted
    pub exhausted: u64,
}

impl std::fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fetched={} skipped={} exhausted={}",
            self.fetched, self.skipped, self.exhausted
        )
    }
}

/// Progress events broadcast during a run
///
/// Consumers subscribe via [`crate::Crawler::subscribe`]; events are
/// best-effort and may be dropped if a receiver lags.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An index page was fetched and parsed
    PageLoaded {
        /// Page position
        year: i32,
        /// Page quarter (1-4)
        quarter: u8,
        /// Number of descriptors that matched the form filter
        descriptors: usize,
    },

    /// A document was fetched, stored, and recorded
    DocumentFetched {
        /// Document identifier
        identifier: String,
        /// Hex-encoded SHA-256 of the stored content
        content_hash: String,
    },

    /// A descriptor was skipped because it was already recorded or in flight
    DocumentSkipped {
        /// Document identifier
        identifier: String,
    },

    /// A descriptor's retry budget was exhausted
    FetchExhausted {
        /// Document identifier
        identifier: String,
        /// Attempts made before giving up
        attempts: u32,
        /// Final error message
        error: String,
    },

    /// The index endpoint was unreachable; the run will stop (resumable)
    IndexUnavailable {
        /// URL of the unreachable index page
        url: String,
    },

    /// The run finished
    Finished {
        /// Final run summary
        report: CrawlReport,
    },
}
