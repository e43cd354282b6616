//! Database repository shared state, revision tracking and row helpers.
//!
//! The per-table CRUD operations live in the sibling modules as further `impl Repository` blocks.

use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool};
use tokio::sync::broadcast;

use crate::errors::AppError;
use crate::models::RevisionInfo;
use crate::realtime::{ChangeEvent, ChangeFeed, ChangeKind, Table};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
    feed: ChangeFeed,
}

impl Repository {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    /// Open a change receiver for one table.
    pub fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe(table)
    }

    #[cfg(test)]
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Bump the revision and announce a committed write.
    pub(super) async fn record_change(
        &self,
        table: Table,
        kind: ChangeKind,
        id: &str,
    ) -> Result<i64, AppError> {
        let revision_id = bump_revision(&self.pool).await?;
        self.publish(table, kind, id, revision_id);
        Ok(revision_id)
    }

    pub(super) fn publish(&self, table: Table, kind: ChangeKind, id: &str, revision_id: i64) {
        tracing::debug!(%table, ?kind, id, revision_id, "Row changed");
        self.feed.publish(ChangeEvent {
            table,
            kind,
            id: id.to_string(),
            revision_id,
        });
    }

    /// Announce rows removed by `ON DELETE CASCADE`. The event carries the parent id.
    pub(super) fn publish_cascade(&self, tables: &[Table], parent_id: &str, revision_id: i64) {
        for table in tables {
            self.publish(*table, ChangeKind::Delete, parent_id, revision_id);
        }
    }
}

/// Increment the revision ID and return the new value.
pub(super) async fn bump_revision<'e, E>(executor: E) -> Result<i64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let now = Utc::now().to_rfc3339();
    let row = sqlx::query(
        "UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1 RETURNING revision_id",
    )
    .bind(&now)
    .fetch_one(executor)
    .await?;
    Ok(row.get("revision_id"))
}

pub(super) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub(super) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(super) fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_else(|e| {
        tracing::warn!(value = s, error = %e, "Corrupt JSON array column, reading as empty");
        Vec::new()
    })
}

pub(super) fn not_found(kind: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{} {} not found", kind, id))
}
