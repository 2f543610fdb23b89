//! Per-host rate limiting using token bucket admission control
//!
//! The RateLimiter gates every outbound request: a token bucket per host
//! whose capacity is the configured concurrency ceiling, refilled by elapsed
//! wall time at one token per minimum inter-request interval.
//!
//! # Algorithm
//!
//! - Tokens represent request slots; the bucket holds at most
//!   `max_concurrency_per_host` of them
//! - A caller acquires a slot, then waits until the host's next issue time
//!   has passed; issue times are spaced `min_delay_per_host` apart
//! - Dropping the returned permit gives the slot back
//!
//! Queueing is FIFO-of-arrival on a best-effort basis (tokio semaphore
//! fairness). Starvation freedom holds for a single target host, the common
//! case for an archive crawl.

use crate::config::RateLimitConfig;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Per-host admission state
struct HostState {
    /// Concurrency slots for this host
    slots: Arc<Semaphore>,
    /// Earliest time the next request against this host may start
    next_issue: tokio::sync::Mutex<Instant>,
}

/// Admission token for one in-flight request
///
/// Holding the permit occupies one concurrency slot for its host; dropping
/// it returns the slot.
#[derive(Debug)]
pub struct RateLimitPermit {
    _slot: OwnedSemaphorePermit,
}

/// Per-host rate limiter shared across all fetch workers
///
/// Host state is created lazily on first acquisition, so the limiter does
/// not need to know the target hosts up front.
pub struct RateLimiter {
    hosts: Mutex<HashMap<String, Arc<HostState>>>,
    min_delay: Duration,
    max_concurrency: usize,
}

impl RateLimiter {
    /// Create a limiter with the configured interval and ceiling
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            min_delay: config.min_delay_per_host,
            max_concurrency: config.max_concurrency_per_host.max(1),
        }
    }

    /// Acquire permission to issue one request against `host`
    ///
    /// Suspends until a concurrency slot is free and the minimum
    /// inter-request interval for the host has elapsed. The returned permit
    /// must be held for the duration of the request.
    pub async fn acquire(&self, host: &str) -> Result<RateLimitPermit> {
        let state = self.host_state(host);

        let slot = state
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::ShuttingDown)?;

        // Reserve the next issue time while holding the lock, then sleep
        // outside it so waiting requests queue up behind spaced-out slots
        // instead of serializing on the lock for the whole delay.
        let wait_until = {
            let mut next_issue = state.next_issue.lock().await;
            let now = Instant::now();
            let scheduled = (*next_issue).max(now);
            *next_issue = scheduled + self.min_delay;
            scheduled
        };

        tokio::time::sleep_until(wait_until).await;

        Ok(RateLimitPermit { _slot: slot })
    }

    fn host_state(&self, host: &str) -> Arc<HostState> {
        let mut hosts = match self.hosts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(HostState {
                    slots: Arc::new(Semaphore::new(self.max_concurrency)),
                    next_issue: tokio::sync::Mutex::new(Instant::now()),
                })
            })
            .clone()
    }
}
