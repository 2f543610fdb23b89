//! Fetched-document membership and insertion.

use crate::error::DatabaseError;
use crate::types::LedgerEntry;
use crate::{Error, Result};

use super::{Ledger, RecordOutcome};

impl Ledger {
    /// Whether a document with this identifier has been fetched
    pub async fn has(&self, identifier: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM fetched_documents WHERE identifier = ?")
                .bind(identifier)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to check ledger membership: {}",
                        e
                    )))
                })?;

        Ok(count > 0)
    }

    /// Record a successful fetch
    ///
    /// Idempotent: if the identifier is already present the existing entry is
    /// kept untouched and [`RecordOutcome::AlreadyRecorded`] is returned.
    pub async fn record(&self, entry: &LedgerEntry) -> Result<RecordOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO fetched_documents (identifier, fetched_at, content_hash)
            VALUES (?, ?, ?)
            ON CONFLICT (identifier) DO NOTHING
            "#,
        )
        .bind(&entry.identifier)
        .bind(entry.fetched_at)
        .bind(&entry.content_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record ledger entry: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            Ok(RecordOutcome::AlreadyRecorded)
        } else {
            Ok(RecordOutcome::Recorded)
        }
    }

    /// Fetch the entry for an identifier, if recorded
    pub async fn get(&self, identifier: &str) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT identifier, fetched_at, content_hash
            FROM fetched_documents
            WHERE identifier = ?
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fetch ledger entry: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Number of recorded documents
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM fetched_documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count ledger entries: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
