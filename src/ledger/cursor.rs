//! Index walker position persistence.

use crate::error::DatabaseError;
use crate::types::Cursor;
use crate::{Error, Result};

use super::Ledger;

/// runtime_state key holding the serialized cursor
const CURSOR_KEY: &str = "index_cursor";

impl Ledger {
    /// Persist the walker position
    ///
    /// Saved after each fully-dispatched index page so an interrupted run
    /// resumes at the right page without loss.
    pub async fn save_cursor(&self, cursor: &Cursor) -> Result<()> {
        let value = serde_json::to_string(cursor)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(CURSOR_KEY)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to save cursor: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Load the persisted walker position, if any
    pub async fn load_cursor(&self) -> Result<Option<Cursor>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = ?")
                .bind(CURSOR_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to load cursor: {}",
                        e
                    )))
                })?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Remove the persisted cursor
    ///
    /// Called when a run completes the whole range, so the next run starts
    /// from the beginning of its configured range.
    pub async fn clear_cursor(&self) -> Result<()> {
        sqlx::query("DELETE FROM runtime_state WHERE key = ?")
            .bind(CURSOR_KEY)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear cursor: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
