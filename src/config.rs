//! Configuration types for edgar-fetch
//!
//! One immutable [`Config`] is built and validated at startup and shared by
//! reference with every component. There is no process-wide mutable
//! configuration after initialization; [`Config::validate`] fails fast on
//! invalid settings rather than failing mid-crawl.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Crawl scope: which years and filing form types to traverse
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// First year to crawl, inclusive
    #[serde(default = "default_year")]
    pub start_year: i32,

    /// Last year to crawl, inclusive
    #[serde(default = "default_year")]
    pub end_year: i32,

    /// Filing form types to keep (default: 10-K, 10-Q, 8-K)
    #[serde(default = "default_form_types")]
    pub form_types: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_year: default_year(),
            end_year: default_year(),
            form_types: default_form_types(),
        }
    }
}

/// Remote index endpoint configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Base URL of the quarterly full index (default: the EDGAR full-index root)
    #[serde(default = "default_index_base_url")]
    pub base_url: String,

    /// Base URL for filing documents referenced by index rows
    #[serde(default = "default_archives_url")]
    pub archives_url: String,

    /// User-Agent header sent with every request
    ///
    /// The archive rejects requests without a descriptive User-Agent, so this
    /// must identify the client and a contact address.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Internal retry budget for a single index page (default: 3)
    ///
    /// Index pages are cheap to retry wholesale, so this budget is small and
    /// separate from the per-document retry configuration.
    #[serde(default = "default_page_retry_attempts")]
    pub page_retry_attempts: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: default_index_base_url(),
            archives_url: default_archives_url(),
            user_agent: default_user_agent(),
            page_retry_attempts: default_page_retry_attempts(),
        }
    }
}

/// Per-host rate limiting configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum interval between request starts against one host
    /// (default: 200ms, about 5 requests per second)
    #[serde(default = "default_min_delay", with = "duration_ms_serde")]
    pub min_delay_per_host: Duration,

    /// Maximum concurrent in-flight requests per host (default: 3)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency_per_host: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_delay_per_host: default_min_delay(),
            max_concurrency_per_host: default_max_concurrency(),
        }
    }
}

/// Retry configuration for transient document fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts per document (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay before the first retry (default: 1 second)
    #[serde(default = "default_backoff_base", with = "duration_ms_serde")]
    pub backoff_base: Duration,

    /// Cap on the delay between retries (default: 60 seconds)
    #[serde(default = "default_backoff_cap", with = "duration_ms_serde")]
    pub backoff_cap: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Durable storage locations
///
/// `staging_dir` must live on the same filesystem as `document_dir` so the
/// final rename is atomic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding fetched documents, one blob per identifier
    #[serde(default = "default_document_dir")]
    pub document_dir: PathBuf,

    /// Directory for in-progress staged writes
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Path of the ledger SQLite database
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            document_dir: default_document_dir(),
            staging_dir: default_staging_dir(),
            ledger_path: default_ledger_path(),
        }
    }
}

/// Main configuration for the crawler
///
/// Fields are organized into logical sub-configs:
/// - [`crawl`](CrawlConfig) — year range and form type filter
/// - [`index`](IndexConfig) — remote endpoint and User-Agent
/// - [`rate_limit`](RateLimitConfig) — per-host admission control
/// - [`retry`](RetryConfig) — backoff policy for document fetches
/// - [`storage`](StorageConfig) — document store and ledger locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Crawl scope settings
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Remote index endpoint settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Per-host rate limiting settings
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry and backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Storage locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Timeout for a single HTTP request (default: 30 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_ms_serde")]
    pub fetch_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig::default(),
            index: IndexConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

impl Config {
    /// Validate the configuration, failing fast on the first invalid setting
    ///
    /// Called by [`crate::Crawler::new`] before any component starts.
    pub fn validate(&self) -> Result<()> {
        if self.crawl.start_year < EARLIEST_INDEX_YEAR {
            return Err(config_error(
                format!(
                    "start_year {} predates the index (earliest: {})",
                    self.crawl.start_year, EARLIEST_INDEX_YEAR
                ),
                "crawl.start_year",
            ));
        }
        if self.crawl.start_year > self.crawl.end_year {
            return Err(config_error(
                format!(
                    "start_year {} exceeds end_year {}",
                    self.crawl.start_year, self.crawl.end_year
                ),
                "crawl.start_year",
            ));
        }
        if self.crawl.form_types.is_empty() {
            return Err(config_error(
                "form_types must not be empty".to_string(),
                "crawl.form_types",
            ));
        }
        if self.crawl.form_types.iter().any(|f| f.trim().is_empty()) {
            return Err(config_error(
                "form_types must not contain blank entries".to_string(),
                "crawl.form_types",
            ));
        }
        if self.index.user_agent.trim().is_empty() {
            return Err(config_error(
                "user_agent must not be empty (the archive rejects anonymous clients)".to_string(),
                "index.user_agent",
            ));
        }
        if url::Url::parse(&self.index.base_url).is_err() {
            return Err(config_error(
                format!("base_url {:?} is not a valid URL", self.index.base_url),
                "index.base_url",
            ));
        }
        if url::Url::parse(&self.index.archives_url).is_err() {
            return Err(config_error(
                format!(
                    "archives_url {:?} is not a valid URL",
                    self.index.archives_url
                ),
                "index.archives_url",
            ));
        }
        if self.rate_limit.max_concurrency_per_host == 0 {
            return Err(config_error(
                "max_concurrency_per_host must be at least 1".to_string(),
                "rate_limit.max_concurrency_per_host",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                format!(
                    "backoff_multiplier {} would shrink delays between retries",
                    self.retry.backoff_multiplier
                ),
                "retry.backoff_multiplier",
            ));
        }
        if self.retry.backoff_base > self.retry.backoff_cap {
            return Err(config_error(
                "backoff_base exceeds backoff_cap".to_string(),
                "retry.backoff_base",
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(config_error(
                "fetch_timeout must be non-zero".to_string(),
                "fetch_timeout",
            ));
        }
        Ok(())
    }
}

/// First year for which the quarterly full index exists
const EARLIEST_INDEX_YEAR: i32 = 1993;

fn config_error(message: String, key: &str) -> Error {
    Error::Config {
        message,
        key: Some(key.to_string()),
    }
}

fn default_year() -> i32 {
    use chrono::Datelike;
    chrono::Utc::now().year()
}

fn default_form_types() -> Vec<String> {
    vec!["10-K".to_string(), "10-Q".to_string(), "8-K".to_string()]
}

fn default_index_base_url() -> String {
    "https://www.sec.gov/Archives/edgar/full-index".to_string()
}

fn default_archives_url() -> String {
    "https://www.sec.gov/Archives".to_string()
}

fn default_user_agent() -> String {
    "edgar-fetch/0.1 (admin@edgar-fetch.dev)".to_string()
}

fn default_page_retry_attempts() -> u32 {
    3
}

fn default_min_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_max_concurrency() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_cap() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_document_dir() -> PathBuf {
    PathBuf::from("./documents")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./staging")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("./edgar-fetch.db")
}

fn default_true() -> bool {
    true
}

// Duration (de)serialization as integer milliseconds
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
