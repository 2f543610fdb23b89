//! Quarterly index traversal
//!
//! The index walker is the single sequential producer of the crawl: it pages
//! through the remote full index one year-quarter at a time, yielding
//! document descriptors for downstream deduplication and fetching.
//!
//! Traversal is restartable: a saved [`Cursor`] resumes at the right page
//! without re-fetching earlier ones. Pages may re-emit descriptors that were
//! already fetched on a previous run; deduplication is delegated downstream,
//! never assumed here.
//!
//! Index pages have their own small retry budget, separate from the
//! scheduler's per-document policy. Once that budget is exhausted the page
//! fails with [`Error::IndexUnavailable`], which halts traversal; the run
//! remains resumable from the persisted cursor.

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::fetch_with_retry;
use crate::types::{Cursor, DocumentDescriptor};
use chrono::Datelike;
use std::sync::Arc;

mod parse;

/// One page of index traversal
#[derive(Debug)]
pub struct IndexPage {
    /// Descriptors that matched the configured form types
    pub descriptors: Vec<DocumentDescriptor>,
    /// The next page to fetch, or `None` when traversal is complete
    pub next: Option<Cursor>,
}

/// Sequential pager over the quarterly full index
pub struct IndexWalker {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl IndexWalker {
    /// Create a walker over the configured year range
    #[must_use]
    pub fn new(client: reqwest::Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }

    /// The first page of the configured range, or `None` if the whole range
    /// lies in the future
    #[must_use]
    pub fn first_cursor(&self) -> Option<Cursor> {
        let first = Cursor::first(self.config.crawl.start_year);
        self.within_cutoff(first).then_some(first)
    }

    /// Fetch and parse the page at `cursor`
    ///
    /// A cursor pointing past the current quarter yields an empty terminal
    /// page: those index files do not exist yet. Quarters are published in
    /// order, so the first out-of-cutoff page ends the traversal.
    pub async fn next_page(&self, cursor: Cursor) -> Result<IndexPage> {
        if !self.within_cutoff(cursor) {
            return Ok(IndexPage {
                descriptors: Vec::new(),
                next: None,
            });
        }

        let url = self.page_url(cursor);
        let retry_config = self.page_retry_config();

        let descriptors = fetch_with_retry(&retry_config, || self.fetch_and_parse(&url, cursor))
            .await
            .map_err(|e| {
                tracing::error!(url = %url, error = %e, "Index page unreachable");
                Error::IndexUnavailable {
                    url: url.clone(),
                    attempts: retry_config.max_attempts + 1,
                }
            })?;

        tracing::info!(
            page = %cursor,
            descriptors = descriptors.len(),
            "Index page parsed"
        );

        Ok(IndexPage {
            descriptors,
            next: self.advance(cursor),
        })
    }

    async fn fetch_and_parse(&self, url: &str, cursor: Cursor) -> Result<Vec<DocumentDescriptor>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        parse::parse_master_index(
            &bytes,
            &self.config.crawl.form_types,
            &self.config.index.archives_url,
            cursor.year,
        )
    }

    fn page_url(&self, cursor: Cursor) -> String {
        format!(
            "{}/{}/QTR{}/master.zip",
            self.config.index.base_url.trim_end_matches('/'),
            cursor.year,
            cursor.quarter
        )
    }

    /// Index pages reuse the document backoff schedule with their own
    /// attempt budget.
    fn page_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.config.index.page_retry_attempts,
            ..self.config.retry.clone()
        }
    }

    fn advance(&self, cursor: Cursor) -> Option<Cursor> {
        let next = cursor.next(self.config.crawl.end_year)?;
        self.within_cutoff(next).then_some(next)
    }

    fn within_cutoff(&self, cursor: Cursor) -> bool {
        let now = chrono::Utc::now();
        let current_quarter = ((now.month() - 1) / 3 + 1) as u8;
        cursor.year < now.year()
            || (cursor.year == now.year() && cursor.quarter <= current_quarter)
    }
}
