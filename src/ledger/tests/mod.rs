//! Ledger persistence tests.

use crate::ledger::{Ledger, RecordOutcome};
use crate::types::{Cursor, LedgerEntry};
use tempfile::TempDir;

fn entry(identifier: &str) -> LedgerEntry {
    LedgerEntry {
        identifier: identifier.to_string(),
        fetched_at: 1_700_000_000,
        content_hash: "a".repeat(64),
    }
}

async fn open_ledger(temp: &TempDir) -> Ledger {
    Ledger::open(&temp.path().join("ledger.db")).await.unwrap()
}

#[tokio::test]
async fn has_is_false_for_unknown_identifier() {
    let temp = TempDir::new().unwrap();
    let ledger = open_ledger(&temp).await;

    assert!(!ledger.has("0000320193-20-000096").await.unwrap());
}

#[tokio::test]
async fn record_then_has_returns_true() {
    let temp = TempDir::new().unwrap();
    let ledger = open_ledger(&temp).await;

    let outcome = ledger.record(&entry("acc-1")).await.unwrap();

    assert_eq!(outcome, RecordOutcome::Recorded);
    assert!(ledger.has("acc-1").await.unwrap());
}

#[tokio::test]
async fn recording_twice_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let ledger = open_ledger(&temp).await;

    assert_eq!(
        ledger.record(&entry("acc-1")).await.unwrap(),
        RecordOutcome::Recorded
    );
    assert_eq!(
        ledger.record(&entry("acc-1")).await.unwrap(),
        RecordOutcome::AlreadyRecorded
    );
    assert_eq!(ledger.count().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_record_keeps_the_original_entry() {
    let temp = TempDir::new().unwrap();
    let ledger = open_ledger(&temp).await;

    ledger.record(&entry("acc-1")).await.unwrap();

    let mut second = entry("acc-1");
    second.content_hash = "b".repeat(64);
    second.fetched_at = 1_800_000_000;
    ledger.record(&second).await.unwrap();

    let stored = ledger.get("acc-1").await.unwrap().unwrap();
    assert_eq!(stored.content_hash, "a".repeat(64), "entries are never mutated");
    assert_eq!(stored.fetched_at, 1_700_000_000);
}

#[tokio::test]
async fn get_returns_none_for_unknown_identifier() {
    let temp = TempDir::new().unwrap();
    let ledger = open_ledger(&temp).await;

    assert!(ledger.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn entries_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ledger.db");

    let ledger = Ledger::open(&path).await.unwrap();
    ledger.record(&entry("acc-1")).await.unwrap();
    ledger.record(&entry("acc-2")).await.unwrap();
    ledger.close().await;

    let reopened = Ledger::open(&path).await.unwrap();
    assert!(reopened.has("acc-1").await.unwrap());
    assert!(reopened.has("acc-2").await.unwrap());
    assert_eq!(reopened.count().await.unwrap(), 2);
}

#[tokio::test]
async fn cursor_round_trips() {
    let temp = TempDir::new().unwrap();
    let ledger = open_ledger(&temp).await;

    assert!(ledger.load_cursor().await.unwrap().is_none());

    let cursor = Cursor {
        year: 2019,
        quarter: 3,
    };
    ledger.save_cursor(&cursor).await.unwrap();

    assert_eq!(ledger.load_cursor().await.unwrap(), Some(cursor));
}

#[tokio::test]
async fn saving_a_cursor_overwrites_the_previous_one() {
    let temp = TempDir::new().unwrap();
    let ledger = open_ledger(&temp).await;

    ledger
        .save_cursor(&Cursor { year: 2019, quarter: 1 })
        .await
        .unwrap();
    ledger
        .save_cursor(&Cursor { year: 2020, quarter: 2 })
        .await
        .unwrap();

    assert_eq!(
        ledger.load_cursor().await.unwrap(),
        Some(Cursor { year: 2020, quarter: 2 })
    );
}

#[tokio::test]
async fn clear_cursor_removes_the_saved_position() {
    let temp = TempDir::new().unwrap();
    let ledger = open_ledger(&temp).await;

    ledger
        .save_cursor(&Cursor { year: 2019, quarter: 4 })
        .await
        .unwrap();
    ledger.clear_cursor().await.unwrap();

    assert!(ledger.load_cursor().await.unwrap().is_none());
}

#[tokio::test]
async fn cursor_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("ledger.db");

    let ledger = Ledger::open(&path).await.unwrap();
    ledger
        .save_cursor(&Cursor { year: 2018, quarter: 2 })
        .await
        .unwrap();
    ledger.close().await;

    let reopened = Ledger::open(&path).await.unwrap();
    assert_eq!(
        reopened.load_cursor().await.unwrap(),
        Some(Cursor { year: 2018, quarter: 2 })
    );
}

#[tokio::test]
async fn open_creates_missing_parent_directories() {
    let temp = TempDir::new().unwrap();
    let nested = temp.path().join("state/nested/ledger.db");

    let ledger = Ledger::open(&nested).await.unwrap();
    ledger.record(&entry("acc-1")).await.unwrap();

    assert!(nested.exists());
}
