//! Shared helpers for integration tests: a mock archive serving zipped
//! quarterly index pages and filing documents.

use edgar_fetch::config::{Config, CrawlConfig, RateLimitConfig, RetryConfig};
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Build a zip archive holding `content` as `master.idx`
pub fn zip_master_idx(content: &str) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        writer
            .start_file("master.idx", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    buf.into_inner()
}

/// A quarterly index page body with the standard preamble
pub fn index_body(rows: &[String]) -> Vec<u8> {
    let preamble = "Description: Master Index of EDGAR Dissemination Feed\n\
                    Last Data Received: test\n\
                    \n\
                    CIK|Company Name|Form Type|Date Filed|Filename\n\
                    --------------------------------------------\n";
    zip_master_idx(&format!("{preamble}{}\n", rows.join("\n")))
}

/// One index row pointing a 10-K filing at `/Archives/edgar/data/1/<id>.txt`
pub fn row(identifier: &str) -> String {
    format!("1|TEST CORP|10-K|2019-01-15|edgar/data/1/{identifier}.txt")
}

/// Mount the index page for one year-quarter
pub async fn mount_index_page(server: &MockServer, year: i32, quarter: u8, rows: &[String]) {
    Mock::given(method("GET"))
        .and(path(format!(
            "/Archives/edgar/full-index/{year}/QTR{quarter}/master.zip"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(index_body(rows)))
        .mount(server)
        .await;
}

/// Mount a document body at the path `row` points to
pub async fn mount_document(server: &MockServer, identifier: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/Archives/edgar/data/1/{identifier}.txt")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Mount a document that always fails with the given status
pub async fn mount_failing_document(server: &MockServer, identifier: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/Archives/edgar/data/1/{identifier}.txt")))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Configuration pointed at the mock archive with test-friendly timings
pub fn test_config(server: &MockServer, temp: &TempDir, start_year: i32, end_year: i32) -> Config {
    let mut config = Config {
        crawl: CrawlConfig {
            start_year,
            end_year,
            ..Default::default()
        },
        rate_limit: RateLimitConfig {
            min_delay_per_host: Duration::ZERO,
            max_concurrency_per_host: 2,
        },
        retry: RetryConfig {
            max_attempts: 2,
            backoff_base: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        fetch_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    config.index.base_url = format!("{}/Archives/edgar/full-index", server.uri());
    config.index.archives_url = format!("{}/Archives", server.uri());
    config.index.page_retry_attempts = 1;
    config.storage.document_dir = temp.path().join("documents");
    config.storage.staging_dir = temp.path().join("staging");
    config.storage.ledger_path = temp.path().join("ledger.db");
    config
}

/// Number of document requests (as opposed to index page requests) the
/// server has received
pub async fn document_request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().starts_with("/Archives/edgar/data/"))
        .count()
}
