//! Fetch scheduler tests.

use crate::config::{Config, CrawlConfig, RateLimitConfig, RetryConfig};
use crate::error::Result;
use crate::ledger::Ledger;
use crate::limiter::RateLimiter;
use crate::scheduler::FetchScheduler;
use crate::sink::SinkWriter;
use crate::transform::FetchTransform;
use crate::types::{DocumentDescriptor, Event, LedgerEntry};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    scheduler: Arc<FetchScheduler>,
    ledger: Arc<Ledger>,
    sink: Arc<SinkWriter>,
    cancel: CancellationToken,
    events: broadcast::Receiver<Event>,
    _temp: TempDir,
}

fn fast_config(temp: &TempDir, max_attempts: u32) -> Config {
    let mut config = Config {
        crawl: CrawlConfig {
            start_year: 2019,
            end_year: 2019,
            ..Default::default()
        },
        rate_limit: RateLimitConfig {
            min_delay_per_host: Duration::ZERO,
            max_concurrency_per_host: 4,
        },
        retry: RetryConfig {
            max_attempts,
            backoff_base: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Default::default()
    };
    config.storage.document_dir = temp.path().join("documents");
    config.storage.staging_dir = temp.path().join("staging");
    config.storage.ledger_path = temp.path().join("ledger.db");
    config
}

async fn harness(max_attempts: u32) -> Harness {
    harness_with_transforms(max_attempts, Vec::new()).await
}

async fn harness_with_transforms(
    max_attempts: u32,
    transforms: Vec<Arc<dyn FetchTransform>>,
) -> Harness {
    let temp = TempDir::new().unwrap();
    let config = Arc::new(fast_config(&temp, max_attempts));

    let ledger = Arc::new(Ledger::open(&config.storage.ledger_path).await.unwrap());
    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let sink = Arc::new(SinkWriter::new(&config.storage));
    sink.init().await.unwrap();

    let cancel = CancellationToken::new();
    let (events_tx, events_rx) = broadcast::channel(64);

    let scheduler = Arc::new(FetchScheduler::new(
        reqwest::Client::new(),
        config,
        ledger.clone(),
        limiter,
        sink.clone(),
        transforms,
        cancel.clone(),
        events_tx,
    ));

    Harness {
        scheduler,
        ledger,
        sink,
        cancel,
        events: events_rx,
        _temp: temp,
    }
}

fn descriptor(server: &MockServer, identifier: &str) -> DocumentDescriptor {
    DocumentDescriptor {
        identifier: identifier.to_string(),
        year: 2019,
        form_type: "10-K".to_string(),
        source_url: format!("{}/Archives/edgar/data/1/{identifier}.txt", server.uri()),
    }
}

fn entry(identifier: &str) -> LedgerEntry {
    LedgerEntry {
        identifier: identifier.to_string(),
        fetched_at: 1_700_000_000,
        content_hash: "c".repeat(64),
    }
}

#[tokio::test]
async fn successful_fetch_commits_blob_and_records_ledger() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Archives/edgar/data/1/acc-1.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"filing body".to_vec()))
        .mount(&server)
        .await;

    let mut h = harness(3).await;
    h.scheduler.submit(descriptor(&server, "acc-1")).await.unwrap();

    let report = h.scheduler.report();
    assert_eq!((report.fetched, report.skipped, report.exhausted), (1, 0, 0));
    assert!(h.ledger.has("acc-1").await.unwrap());
    assert!(h.sink.contains("acc-1", 2019).await);

    let content = tokio::fs::read(h.sink.blob_path("acc-1", 2019)).await.unwrap();
    assert_eq!(content, b"filing body");

    assert!(matches!(
        h.events.recv().await.unwrap(),
        Event::DocumentFetched { .. }
    ));
}

#[tokio::test]
async fn transient_500_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Archives/edgar/data/1/acc-1.txt"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Archives/edgar/data/1/acc-1.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&server)
        .await;

    let h = harness(5).await;
    h.scheduler.submit(descriptor(&server, "acc-1")).await.unwrap();

    let report = h.scheduler.report();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.exhausted, 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn rate_limited_429_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Archives/edgar/data/1/acc-1.txt"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Archives/edgar/data/1/acc-1.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&server)
        .await;

    let h = harness(3).await;
    h.scheduler.submit(descriptor(&server, "acc-1")).await.unwrap();

    assert_eq!(h.scheduler.report().fetched, 1);
}

#[tokio::test]
async fn persistent_500_exhausts_budget_and_skips_ledger() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Archives/edgar/data/1/acc-1.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut h = harness(3).await;
    h.scheduler.submit(descriptor(&server, "acc-1")).await.unwrap();

    let report = h.scheduler.report();
    assert_eq!((report.fetched, report.exhausted), (0, 1));
    assert!(
        !h.ledger.has("acc-1").await.unwrap(),
        "exhausted documents must not be recorded"
    );
    assert!(!h.sink.contains("acc-1", 2019).await);
    // initial attempt + 3 retries
    assert_eq!(server.received_requests().await.unwrap().len(), 4);

    match h.events.recv().await.unwrap() {
        Event::FetchExhausted { identifier, attempts, .. } => {
            assert_eq!(identifier, "acc-1");
            assert_eq!(attempts, 4);
        }
        other => panic!("expected FetchExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn not_found_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Archives/edgar/data/1/acc-1.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let h = harness(5).await;
    h.scheduler.submit(descriptor(&server, "acc-1")).await.unwrap();

    assert_eq!(h.scheduler.report().exhausted, 1);
    assert_eq!(
        server.received_requests().await.unwrap().len(),
        1,
        "404 is terminal, no retries"
    );
}

#[tokio::test]
async fn recorded_identifier_is_skipped_without_any_request() {
    let server = MockServer::start().await;

    let mut h = harness(3).await;
    h.ledger.record(&entry("acc-1")).await.unwrap();

    h.scheduler.submit(descriptor(&server, "acc-1")).await.unwrap();

    let report = h.scheduler.report();
    assert_eq!((report.fetched, report.skipped), (0, 1));
    assert!(
        server.received_requests().await.unwrap().is_empty(),
        "dedup must happen before any network traffic"
    );
    assert!(matches!(
        h.events.recv().await.unwrap(),
        Event::DocumentSkipped { .. }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_workers_on_one_identifier_fetch_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Archives/edgar/data/1/acc-1.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"body".to_vec())
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(3).await;
    let mut handles = vec![];
    for _ in 0..8 {
        let scheduler = h.scheduler.clone();
        let d = descriptor(&server, "acc-1");
        handles.push(tokio::spawn(async move { scheduler.submit(d).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let report = h.scheduler.report();
    assert_eq!(report.fetched, 1, "exactly one fetch reaches the sink");
    assert_eq!(report.skipped, 7, "the racing submissions are skipped");
    assert!(h.ledger.has("acc-1").await.unwrap());
    server.verify().await;
}

#[tokio::test]
async fn transforms_shape_the_persisted_content() {
    struct Uppercase;
    impl FetchTransform for Uppercase {
        fn name(&self) -> &str {
            "uppercase"
        }
        fn apply(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
            Ok(bytes.to_ascii_uppercase())
        }
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Archives/edgar/data/1/acc-1.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"filing body".to_vec()))
        .mount(&server)
        .await;

    let h = harness_with_transforms(3, vec![Arc::new(Uppercase)]).await;
    h.scheduler.submit(descriptor(&server, "acc-1")).await.unwrap();

    let content = tokio::fs::read(h.sink.blob_path("acc-1", 2019)).await.unwrap();
    assert_eq!(content, b"FILING BODY");
}

#[tokio::test]
async fn cancelled_scheduler_accepts_nothing() {
    let server = MockServer::start().await;

    let h = harness(3).await;
    h.cancel.cancel();

    h.scheduler.submit(descriptor(&server, "acc-1")).await.unwrap();

    let report = h.scheduler.report();
    assert_eq!((report.fetched, report.skipped, report.exhausted), (0, 0, 0));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn distinct_identifiers_fetch_independently() {
    let server = MockServer::start().await;
    for id in ["acc-1", "acc-2", "acc-3"] {
        Mock::given(method("GET"))
            .and(path(format!("/Archives/edgar/data/1/{id}.txt")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(id.as_bytes().to_vec()))
            .mount(&server)
            .await;
    }

    let h = harness(3).await;
    for id in ["acc-1", "acc-2", "acc-3"] {
        h.scheduler.submit(descriptor(&server, id)).await.unwrap();
    }

    assert_eq!(h.scheduler.report().fetched, 3);
    assert_eq!(h.ledger.count().await.unwrap(), 3);
}
