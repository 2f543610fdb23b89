//! Fetch task scheduling and dispatch
//!
//! The scheduler turns deduplicated descriptors into fetch tasks and drives
//! them to a terminal state: success (content committed and recorded) or
//! exhaustion (retry budget spent, reported, run continues).
//!
//! Ordering guarantee: for a given identifier, at most one attempt chain is
//! in flight at any time. The in-flight set and the ledger membership check
//! together form the mutual-exclusion boundary that prevents two workers
//! from both observing "not yet fetched" and issuing duplicate fetches.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::{Ledger, RecordOutcome};
use crate::limiter::RateLimiter;
use crate::retry::{IsRetryable, backoff_delay};
use crate::sink::{SinkWriter, StoredBlob};
use crate::transform::{FetchTransform, apply_chain};
use crate::types::{CrawlReport, DocumentDescriptor, Event, FetchTask, LedgerEntry};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Dispatches rate-limited document fetches with retry and backoff
///
/// Shared by all workers; all internal state is either atomic counters or
/// mutex-guarded. The ledger and the rate limiter are the only state shared
/// beyond this struct.
pub struct FetchScheduler {
    client: reqwest::Client,
    config: Arc<Config>,
    ledger: Arc<Ledger>,
    limiter: Arc<RateLimiter>,
    sink: Arc<SinkWriter>,
    transforms: Vec<Arc<dyn FetchTransform>>,
    cancel: CancellationToken,
    events: broadcast::Sender<Event>,
    in_flight: Mutex<HashSet<String>>,
    fetched: AtomicU64,
    skipped: AtomicU64,
    exhausted: AtomicU64,
}

impl FetchScheduler {
    /// Create a scheduler over the shared components
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: reqwest::Client,
        config: Arc<Config>,
        ledger: Arc<Ledger>,
        limiter: Arc<RateLimiter>,
        sink: Arc<SinkWriter>,
        transforms: Vec<Arc<dyn FetchTransform>>,
        cancel: CancellationToken,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            client,
            config,
            ledger,
            limiter,
            sink,
            transforms,
            cancel,
            events,
            in_flight: Mutex::new(HashSet::new()),
            fetched: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    /// Snapshot of the run counters
    pub fn report(&self) -> CrawlReport {
        CrawlReport {
            fetched: self.fetched.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            exhausted: self.exhausted.load(Ordering::SeqCst),
        }
    }

    /// Drive one descriptor to a terminal state
    ///
    /// Skips (and counts) descriptors that are already recorded or already
    /// in flight. Per-descriptor failures are absorbed here: exhaustion is
    /// counted and reported, never returned as an error. Only ledger
    /// failures propagate, since a broken ledger invalidates the dedup
    /// guarantees of the whole run.
    pub async fn submit(&self, descriptor: DocumentDescriptor) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        if !self.mark_in_flight(&descriptor.identifier) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            self.emit(Event::DocumentSkipped {
                identifier: descriptor.identifier.clone(),
            });
            return Ok(());
        }

        let identifier = descriptor.identifier.clone();
        let result = self.process(descriptor).await;
        self.unmark_in_flight(&identifier);
        result
    }

    async fn process(&self, descriptor: DocumentDescriptor) -> Result<()> {
        if self.ledger.has(&descriptor.identifier).await? {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(identifier = %descriptor.identifier, "Already recorded, skipping");
            self.emit(Event::DocumentSkipped {
                identifier: descriptor.identifier.clone(),
            });
            return Ok(());
        }

        let host = host_of(&descriptor.source_url);
        let mut task = FetchTask::new(descriptor);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Not recorded, so a resumed run fetches it again
                    tracing::debug!(
                        identifier = %task.descriptor.identifier,
                        "Cancelled before attempt"
                    );
                    return Ok(());
                }
                _ = tokio::time::sleep_until(task.next_eligible) => {}
            }

            let permit = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!(
                        identifier = %task.descriptor.identifier,
                        "Cancelled while waiting for admission"
                    );
                    return Ok(());
                }
                permit = self.limiter.acquire(&host) => permit?,
            };
            let attempt = self.attempt(&task.descriptor).await;
            drop(permit);

            match attempt {
                Ok(blob) => {
                    return self.finish(&task, blob).await;
                }
                Err(e) if e.is_retryable() && task.attempt_count < self.config.retry.max_attempts => {
                    let delay = backoff_delay(&self.config.retry, task.attempt_count);
                    tracing::warn!(
                        identifier = %task.descriptor.identifier,
                        error = %e,
                        attempt = task.attempt_count + 1,
                        max_attempts = self.config.retry.max_attempts,
                        delay_ms = delay.as_millis(),
                        "Fetch attempt failed, rescheduling"
                    );
                    task.reschedule(delay);
                }
                Err(e) => {
                    let attempts = task.attempt_count + 1;
                    self.exhausted.fetch_add(1, Ordering::SeqCst);
                    tracing::error!(
                        identifier = %task.descriptor.identifier,
                        error = %e,
                        attempts = attempts,
                        "Giving up on document"
                    );
                    self.emit(Event::FetchExhausted {
                        identifier: task.descriptor.identifier.clone(),
                        attempts,
                        error: e.to_string(),
                    });
                    return Ok(());
                }
            }
        }
    }

    /// One fetch attempt: request, transform chain, atomic persist
    ///
    /// The sink write is inside the attempt so a failed local persist is
    /// retried like any other transient failure.
    async fn attempt(&self, descriptor: &DocumentDescriptor) -> Result<StoredBlob> {
        let bytes = self.fetch(descriptor).await?;
        let bytes = apply_chain(&self.transforms, bytes)?;
        self.sink.write(descriptor, &bytes).await
    }

    async fn fetch(&self, descriptor: &DocumentDescriptor) -> Result<Vec<u8>> {
        let response = self.client.get(&descriptor.source_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: descriptor.source_url.clone(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn finish(&self, task: &FetchTask, blob: StoredBlob) -> Result<()> {
        let entry = LedgerEntry {
            identifier: task.descriptor.identifier.clone(),
            fetched_at: chrono::Utc::now().timestamp(),
            content_hash: blob.content_hash.clone(),
        };

        match self.ledger.record(&entry).await? {
            RecordOutcome::Recorded => {}
            RecordOutcome::AlreadyRecorded => {
                // Possible after a crash between commit and record on a
                // previous run; the blob was rewritten with identical content
                tracing::debug!(
                    identifier = %entry.identifier,
                    "Ledger entry already present"
                );
            }
        }

        self.fetched.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            identifier = %entry.identifier,
            form_type = %task.descriptor.form_type,
            attempts = task.attempt_count + 1,
            "Document fetched"
        );
        self.emit(Event::DocumentFetched {
            identifier: entry.identifier,
            content_hash: blob.content_hash,
        });

        Ok(())
    }

    fn mark_in_flight(&self, identifier: &str) -> bool {
        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        in_flight.insert(identifier.to_string())
    }

    fn unmark_in_flight(&self, identifier: &str) {
        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        in_flight.remove(identifier);
    }

    fn emit(&self, event: Event) {
        // Nobody listening is fine; events are best-effort
        let _ = self.events.send(event);
    }
}

/// Host component of a URL, for rate limiter bucketing
///
/// Unparseable URLs share one bucket rather than bypassing the limiter.
fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
