//! Top-level crawler wiring and run loop
//!
//! The [`Crawler`] owns every component and drives the crawl: a single
//! sequential producer walks the index page by page, while a bounded worker
//! pool drains each page's descriptors through the scheduler. The cursor is
//! advanced and persisted only after a page's tasks have all reached a
//! terminal state, so an interrupted run never loses descriptors.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::IndexWalker;
use crate::ledger::Ledger;
use crate::limiter::RateLimiter;
use crate::scheduler::FetchScheduler;
use crate::sink::SinkWriter;
use crate::transform::FetchTransform;
use crate::types::{CrawlReport, Cursor, Event};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Incremental fetch engine over the quarterly full index
///
/// # Example
///
/// ```no_run
/// use edgar_fetch::{Config, Crawler};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut config = Config::default();
///     config.crawl.start_year = 2019;
///     config.crawl.end_year = 2020;
///
///     let crawler = Crawler::new(config).await?;
///     let report = crawler.run().await?;
///     println!("{report}");
///     Ok(())
/// }
/// ```
pub struct Crawler {
    config: Arc<Config>,
    ledger: Arc<Ledger>,
    scheduler: Arc<FetchScheduler>,
    walker: IndexWalker,
    cancel: CancellationToken,
    events: tokio::sync::broadcast::Sender<Event>,
}

impl Crawler {
    /// Create a crawler with an empty transform chain
    ///
    /// Validates the configuration, opens the ledger, prepares the storage
    /// directories, and builds the HTTP client. Fails fast: no component
    /// starts if any of these steps is rejected.
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_transforms(config, Vec::new()).await
    }

    /// Create a crawler with an explicit transform chain
    ///
    /// Transforms are applied in order to every fetched document before it
    /// is persisted.
    pub async fn with_transforms(
        config: Config,
        transforms: Vec<Arc<dyn FetchTransform>>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let client = reqwest::Client::builder()
            .user_agent(&config.index.user_agent)
            .timeout(config.fetch_timeout)
            .build()?;

        let ledger = Arc::new(Ledger::open(&config.storage.ledger_path).await?);

        let sink = Arc::new(SinkWriter::new(&config.storage));
        sink.init().await?;

        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let cancel = CancellationToken::new();
        let (events, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let scheduler = Arc::new(FetchScheduler::new(
            client.clone(),
            config.clone(),
            ledger.clone(),
            limiter,
            sink,
            transforms,
            cancel.clone(),
            events.clone(),
        ));

        let walker = IndexWalker::new(client, config.clone());

        Ok(Self {
            config,
            ledger,
            scheduler,
            walker,
            cancel,
            events,
        })
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Request cooperative cancellation
    ///
    /// The producer stops dispatching, in-flight fetches finish or abort
    /// within a grace period, and the cursor is persisted so the next run
    /// resumes without loss.
    pub fn cancel(&self) {
        tracing::info!("Cancellation requested");
        self.cancel.cancel();
    }

    /// Run the crawl to completion
    ///
    /// Returns the run report on success or cancellation. Fails with
    /// [`Error::IndexUnavailable`] when an index page stays unreachable; the
    /// run is then resumable from the persisted cursor.
    pub async fn run(&self) -> Result<CrawlReport> {
        let mut cursor = self.starting_cursor().await?;
        let mut workers: JoinSet<Result<()>> = JoinSet::new();
        let max_pending = self.config.rate_limit.max_concurrency_per_host.max(1) * 2;
        let mut halted: Option<Error> = None;

        tracing::info!(
            start_year = self.config.crawl.start_year,
            end_year = self.config.crawl.end_year,
            cursor = %cursor.map(|c| c.to_string()).unwrap_or_else(|| "none".into()),
            "Starting crawl"
        );

        'pages: while let Some(current) = cursor {
            if self.cancel.is_cancelled() {
                break;
            }

            let page = match self.walker.next_page(current).await {
                Ok(page) => page,
                Err(e) => {
                    if let Error::IndexUnavailable { url, .. } = &e {
                        self.emit(Event::IndexUnavailable { url: url.clone() });
                    }
                    halted = Some(e);
                    break;
                }
            };

            self.emit(Event::PageLoaded {
                year: current.year,
                quarter: current.quarter,
                descriptors: page.descriptors.len(),
            });

            for descriptor in page.descriptors {
                if self.cancel.is_cancelled() {
                    break 'pages;
                }
                while workers.len() >= max_pending {
                    if let Some(joined) = workers.join_next().await {
                        log_worker_result(joined);
                    }
                }
                let scheduler = self.scheduler.clone();
                workers.spawn(async move { scheduler.submit(descriptor).await });
            }

            // The cursor advances only once every task of this page has
            // reached a terminal state; a cancelled task is not terminal,
            // so cancellation leaves the cursor on the current page.
            while let Some(joined) = workers.join_next().await {
                log_worker_result(joined);
            }
            if self.cancel.is_cancelled() {
                break;
            }

            match page.next {
                Some(next) => {
                    self.ledger.save_cursor(&next).await?;
                    cursor = Some(next);
                }
                None => {
                    self.ledger.clear_cursor().await?;
                    cursor = None;
                }
            }
        }

        self.drain_workers(workers).await;

        if self.cancel.is_cancelled() {
            if let Some(current) = cursor {
                self.ledger.save_cursor(&current).await?;
                tracing::info!(cursor = %current, "Cursor persisted for resume");
            }
        }

        let report = self.scheduler.report();
        if let Some(e) = halted {
            tracing::error!(error = %e, %report, "Crawl halted");
            return Err(e);
        }

        tracing::info!(%report, "Crawl finished");
        self.emit(Event::Finished { report });
        Ok(report)
    }

    /// Resume from the persisted cursor when it still falls inside the
    /// configured range; otherwise start the range from its first page.
    async fn starting_cursor(&self) -> Result<Option<Cursor>> {
        match self.ledger.load_cursor().await? {
            Some(saved)
                if saved.year >= self.config.crawl.start_year
                    && saved.year <= self.config.crawl.end_year =>
            {
                tracing::info!(cursor = %saved, "Resuming from persisted cursor");
                Ok(Some(saved))
            }
            Some(saved) => {
                tracing::warn!(
                    cursor = %saved,
                    "Persisted cursor is outside the configured range, starting over"
                );
                self.ledger.clear_cursor().await?;
                Ok(self.walker.first_cursor())
            }
            None => Ok(self.walker.first_cursor()),
        }
    }

    /// Give in-flight tasks a grace period to settle, then abort the rest
    async fn drain_workers(&self, mut workers: JoinSet<Result<()>>) {
        if workers.is_empty() {
            return;
        }

        let grace = self.config.fetch_timeout * 2;
        let drained = timeout(grace, async {
            while let Some(joined) = workers.join_next().await {
                log_worker_result(joined);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = workers.len(),
                "Grace period elapsed, aborting remaining fetch tasks"
            );
            workers.abort_all();
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

fn log_worker_result(joined: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Fetch task failed"),
        Err(e) => tracing::error!(error = %e, "Fetch task panicked"),
    }
}
