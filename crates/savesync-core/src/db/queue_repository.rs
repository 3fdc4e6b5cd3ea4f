//! Pending sync queue repository

use crate::error::Result;
use crate::models::{QueueStatus, SyncPriority, SyncQueueEntry, SyncType};
use libsql::{params, Connection, Row};

const COLUMNS: &str = "id, game_id, sync_type, status, priority, retry_count, max_retries, \
    last_error, payload_json, created_at, updated_at";

/// Trait for queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Replace any non-running entry for `(game, type)` with a fresh `PENDING` one
    async fn enqueue(
        &self,
        game_id: i64,
        sync_type: SyncType,
        priority: SyncPriority,
        max_retries: i32,
        payload_json: &str,
        now: i64,
    ) -> Result<SyncQueueEntry>;

    async fn get(&self, id: i64) -> Result<Option<SyncQueueEntry>>;

    /// All pending entries, `priority ASC, created_at ASC`
    async fn pending_by_priority(&self) -> Result<Vec<SyncQueueEntry>>;

    /// Pending entries of a single priority tier, oldest first
    async fn pending_by_priority_tier(&self, priority: SyncPriority)
        -> Result<Vec<SyncQueueEntry>>;

    /// Next pending entry of one sync type in drain order
    async fn next_pending(&self, sync_type: SyncType) -> Result<Option<SyncQueueEntry>>;

    /// `PENDING → IN_PROGRESS`; false when another consumer got there first
    async fn mark_in_progress(&self, id: i64, now: i64) -> Result<bool>;

    /// `IN_PROGRESS → COMPLETED`
    async fn mark_completed(&self, id: i64, now: i64) -> Result<bool>;

    /// `→ FAILED`, bumping `retry_count` without passing `max_retries`
    async fn mark_failed(&self, id: i64, error: &str, now: i64) -> Result<bool>;

    /// `FAILED → PENDING` only while `retry_count < max_retries`
    async fn retry_if_eligible(&self, id: i64, now: i64) -> Result<bool>;

    /// Apply `retry_if_eligible` to every failed entry
    async fn retry_all_eligible(&self, now: i64) -> Result<u64>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn delete_by_game_and_type(&self, game_id: i64, sync_type: SyncType) -> Result<u64>;

    async fn delete_completed(&self) -> Result<u64>;

    async fn delete_exhausted_retries(&self) -> Result<u64>;

    async fn has_pending(&self, game_id: i64, sync_type: SyncType) -> Result<bool>;

    async fn count_by_status(&self, status: QueueStatus) -> Result<u64>;

    async fn count_pending_by_type(&self, sync_type: SyncType) -> Result<u64>;

    /// Failed entries that can still be retried
    async fn count_retryable(&self) -> Result<u64>;

    async fn list_by_status(&self, status: QueueStatus, limit: usize)
        -> Result<Vec<SyncQueueEntry>>;

    /// Entries left `IN_PROGRESS` by an interrupted drain go back to `PENDING`
    async fn reset_stale_in_progress(&self, now: i64) -> Result<u64>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_row(row: &Row) -> Result<SyncQueueEntry> {
        let sync_type: String = row.get(2)?;
        let status: String = row.get(3)?;
        Ok(SyncQueueEntry {
            id: row.get(0)?,
            game_id: row.get(1)?,
            sync_type: sync_type.parse()?,
            status: status.parse()?,
            priority: SyncPriority(row.get(4)?),
            retry_count: row.get(5)?,
            max_retries: row.get(6)?,
            last_error: row.get::<Option<String>>(7)?,
            payload_json: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    async fn query_entries(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<SyncQueueEntry>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_row(&row)?);
        }
        Ok(entries)
    }

    async fn scalar(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<u64> {
        let mut rows = self.conn.query(sql, params).await?;
        let value = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(u64::try_from(value).unwrap_or(0))
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn enqueue(
        &self,
        game_id: i64,
        sync_type: SyncType,
        priority: SyncPriority,
        max_retries: i32,
        payload_json: &str,
        now: i64,
    ) -> Result<SyncQueueEntry> {
        self.delete_by_game_and_type(game_id, sync_type).await?;
        self.conn
            .execute(
                "INSERT INTO pending_sync_queue
                    (game_id, sync_type, status, priority, retry_count, max_retries,
                     payload_json, created_at, updated_at)
                 VALUES (?, ?, 'PENDING', ?, 0, ?, ?, ?, ?)",
                params![
                    game_id,
                    sync_type.as_str(),
                    priority.0,
                    max_retries.max(0),
                    payload_json,
                    now,
                    now
                ],
            )
            .await?;

        Ok(SyncQueueEntry {
            id: self.conn.last_insert_rowid(),
            game_id,
            sync_type,
            status: QueueStatus::Pending,
            priority,
            retry_count: 0,
            max_retries: max_retries.max(0),
            last_error: None,
            payload_json: payload_json.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<SyncQueueEntry>> {
        let sql = format!("SELECT {COLUMNS} FROM pending_sync_queue WHERE id = ?");
        Ok(self.query_entries(&sql, [id]).await?.into_iter().next())
    }

    async fn pending_by_priority(&self) -> Result<Vec<SyncQueueEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM pending_sync_queue WHERE status = 'PENDING'
             ORDER BY priority ASC, created_at ASC, id ASC"
        );
        self.query_entries(&sql, ()).await
    }

    async fn pending_by_priority_tier(
        &self,
        priority: SyncPriority,
    ) -> Result<Vec<SyncQueueEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM pending_sync_queue WHERE status = 'PENDING' AND priority = ?
             ORDER BY created_at ASC, id ASC"
        );
        self.query_entries(&sql, [priority.0]).await
    }

    async fn next_pending(&self, sync_type: SyncType) -> Result<Option<SyncQueueEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM pending_sync_queue WHERE status = 'PENDING' AND sync_type = ?
             ORDER BY priority ASC, created_at ASC, id ASC LIMIT 1"
        );
        Ok(self
            .query_entries(&sql, [sync_type.as_str()])
            .await?
            .into_iter()
            .next())
    }

    async fn mark_in_progress(&self, id: i64, now: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE pending_sync_queue SET status = 'IN_PROGRESS', updated_at = ?
                 WHERE id = ? AND status = 'PENDING'",
                params![now, id],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn mark_completed(&self, id: i64, now: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE pending_sync_queue SET status = 'COMPLETED', last_error = NULL, updated_at = ?
                 WHERE id = ? AND status = 'IN_PROGRESS'",
                params![now, id],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn mark_failed(&self, id: i64, error: &str, now: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE pending_sync_queue
                 SET status = 'FAILED',
                     retry_count = MIN(retry_count + 1, max_retries),
                     last_error = ?,
                     updated_at = ?
                 WHERE id = ?",
                params![error, now, id],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn retry_if_eligible(&self, id: i64, now: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE pending_sync_queue SET status = 'PENDING', updated_at = ?1
                 WHERE id = ?2 AND status = 'FAILED' AND retry_count < max_retries
                   AND NOT EXISTS (
                       SELECT 1 FROM pending_sync_queue other
                       WHERE other.game_id = pending_sync_queue.game_id
                         AND other.sync_type = pending_sync_queue.sync_type
                         AND other.status = 'PENDING'
                   )",
                params![now, id],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn retry_all_eligible(&self, now: i64) -> Result<u64> {
        let candidates = self
            .query_entries(
                &format!(
                    "SELECT {COLUMNS} FROM pending_sync_queue
                     WHERE status = 'FAILED' AND retry_count < max_retries
                     ORDER BY priority ASC, created_at ASC"
                ),
                (),
            )
            .await?;

        let mut retried = 0;
        for entry in candidates {
            if self.retry_if_eligible(entry.id, now).await? {
                retried += 1;
            }
        }
        Ok(retried)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM pending_sync_queue WHERE id = ?", [id])
            .await?;
        Ok(changed > 0)
    }

    async fn delete_by_game_and_type(&self, game_id: i64, sync_type: SyncType) -> Result<u64> {
        Ok(self
            .conn
            .execute(
                "DELETE FROM pending_sync_queue
                 WHERE game_id = ? AND sync_type = ? AND status != 'IN_PROGRESS'",
                params![game_id, sync_type.as_str()],
            )
            .await?)
    }

    async fn delete_completed(&self) -> Result<u64> {
        Ok(self
            .conn
            .execute(
                "DELETE FROM pending_sync_queue WHERE status = 'COMPLETED'",
                (),
            )
            .await?)
    }

    async fn delete_exhausted_retries(&self) -> Result<u64> {
        Ok(self
            .conn
            .execute(
                "DELETE FROM pending_sync_queue
                 WHERE status = 'FAILED' AND retry_count >= max_retries",
                (),
            )
            .await?)
    }

    async fn has_pending(&self, game_id: i64, sync_type: SyncType) -> Result<bool> {
        let count = self
            .scalar(
                "SELECT COUNT(*) FROM pending_sync_queue
                 WHERE game_id = ? AND sync_type = ? AND status = 'PENDING'",
                params![game_id, sync_type.as_str()],
            )
            .await?;
        Ok(count > 0)
    }

    async fn count_by_status(&self, status: QueueStatus) -> Result<u64> {
        self.scalar(
            "SELECT COUNT(*) FROM pending_sync_queue WHERE status = ?",
            [status.as_str()],
        )
        .await
    }

    async fn count_pending_by_type(&self, sync_type: SyncType) -> Result<u64> {
        self.scalar(
            "SELECT COUNT(*) FROM pending_sync_queue WHERE status = 'PENDING' AND sync_type = ?",
            [sync_type.as_str()],
        )
        .await
    }

    async fn count_retryable(&self) -> Result<u64> {
        self.scalar(
            "SELECT COUNT(*) FROM pending_sync_queue
             WHERE status = 'FAILED' AND retry_count < max_retries",
            (),
        )
        .await
    }

    async fn list_by_status(
        &self,
        status: QueueStatus,
        limit: usize,
    ) -> Result<Vec<SyncQueueEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM pending_sync_queue WHERE status = ?
             ORDER BY priority ASC, created_at ASC, id ASC LIMIT ?"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_entries(&sql, params![status.as_str(), limit])
            .await
    }

    async fn reset_stale_in_progress(&self, now: i64) -> Result<u64> {
        Ok(self
            .conn
            .execute(
                "UPDATE pending_sync_queue SET status = 'PENDING', updated_at = ?
                 WHERE status = 'IN_PROGRESS'
                   AND NOT EXISTS (
                       SELECT 1 FROM pending_sync_queue other
                       WHERE other.game_id = pending_sync_queue.game_id
                         AND other.sync_type = pending_sync_queue.sync_type
                         AND other.status = 'PENDING'
                   )",
                [now],
            )
            .await?)
    }
}
