//! Sync status records and their transition history

use crate::error::Result;
use crate::models::{SyncStatus, SyncStatusChange, SyncStatusRecord};
use libsql::{params, Connection, Row};

const COLUMNS: &str = "game_id, emulator_id, channel_name, local_save_path, local_updated_at, \
    sync_status, last_sync_error, server_save_id, server_updated_at, last_synced_hash, last_synced_at";

const KEY_MATCH: &str =
    "game_id = ?1 AND emulator_id = ?2 AND (channel_name = ?3 OR (channel_name IS NULL AND ?3 IS NULL))";

/// Trait for sync status storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncStatusRepository {
    async fn get(
        &self,
        game_id: i64,
        emulator_id: &str,
        channel_name: Option<&str>,
    ) -> Result<Option<SyncStatusRecord>>;

    /// All records for a game across emulators and channels
    async fn list_by_game(&self, game_id: i64) -> Result<Vec<SyncStatusRecord>>;

    /// Records whose status matches, e.g. everything `SERVER_NEWER`
    async fn list_by_status(&self, status: SyncStatus) -> Result<Vec<SyncStatusRecord>>;

    /// Insert or replace the record for its key
    async fn upsert(&self, record: &SyncStatusRecord) -> Result<()>;

    async fn record_change(&self, change: &SyncStatusChange) -> Result<i64>;

    /// Most recent transitions for a game, newest first
    async fn history(&self, game_id: i64, limit: usize) -> Result<Vec<SyncStatusChange>>;
}

/// libSQL implementation of `SyncStatusRepository`
pub struct LibSqlSyncStatusRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStatusRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &Row) -> Result<SyncStatusRecord> {
        let status: String = row.get(5)?;
        Ok(SyncStatusRecord {
            game_id: row.get(0)?,
            emulator_id: row.get(1)?,
            channel_name: row.get::<Option<String>>(2)?,
            local_save_path: row.get::<Option<String>>(3)?,
            local_updated_at: row.get::<Option<i64>>(4)?,
            sync_status: status.parse()?,
            last_sync_error: row.get::<Option<String>>(6)?,
            server_save_id: row.get::<Option<String>>(7)?,
            server_updated_at: row.get::<Option<i64>>(8)?,
            last_synced_hash: row.get::<Option<String>>(9)?,
            last_synced_at: row.get::<Option<i64>>(10)?,
        })
    }

    fn parse_change(row: &Row) -> Result<SyncStatusChange> {
        let old_status = row
            .get::<Option<String>>(4)?
            .map(|value| value.parse::<SyncStatus>())
            .transpose()?;
        let new_status: String = row.get(5)?;
        Ok(SyncStatusChange {
            id: row.get(0)?,
            game_id: row.get(1)?,
            emulator_id: row.get(2)?,
            channel_name: row.get::<Option<String>>(3)?,
            old_status,
            new_status: new_status.parse()?,
            reason: row.get(6)?,
            changed_at: row.get(7)?,
        })
    }

    async fn query_records(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<SyncStatusRecord>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }
}

impl SyncStatusRepository for LibSqlSyncStatusRepository<'_> {
    async fn get(
        &self,
        game_id: i64,
        emulator_id: &str,
        channel_name: Option<&str>,
    ) -> Result<Option<SyncStatusRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM save_sync WHERE {KEY_MATCH}");
        Ok(self
            .query_records(&sql, params![game_id, emulator_id, channel_name])
            .await?
            .into_iter()
            .next())
    }

    async fn list_by_game(&self, game_id: i64) -> Result<Vec<SyncStatusRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM save_sync WHERE game_id = ? ORDER BY emulator_id, channel_name"
        );
        self.query_records(&sql, [game_id]).await
    }

    async fn list_by_status(&self, status: SyncStatus) -> Result<Vec<SyncStatusRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM save_sync WHERE sync_status = ? ORDER BY game_id");
        self.query_records(&sql, [status.as_str()]).await
    }

    async fn upsert(&self, record: &SyncStatusRecord) -> Result<()> {
        let delete = format!("DELETE FROM save_sync WHERE {KEY_MATCH}");
        self.conn
            .execute(
                &delete,
                params![
                    record.game_id,
                    record.emulator_id.clone(),
                    record.channel_name.clone()
                ],
            )
            .await?;

        self.conn
            .execute(
                "INSERT INTO save_sync (game_id, emulator_id, channel_name, local_save_path,
                    local_updated_at, sync_status, last_sync_error, server_save_id,
                    server_updated_at, last_synced_hash, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.game_id,
                    record.emulator_id.clone(),
                    record.channel_name.clone(),
                    record.local_save_path.clone(),
                    record.local_updated_at,
                    record.sync_status.as_str(),
                    record.last_sync_error.clone(),
                    record.server_save_id.clone(),
                    record.server_updated_at,
                    record.last_synced_hash.clone(),
                    record.last_synced_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn record_change(&self, change: &SyncStatusChange) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO sync_status_history
                    (game_id, emulator_id, channel_name, old_status, new_status, reason, changed_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    change.game_id,
                    change.emulator_id.clone(),
                    change.channel_name.clone(),
                    change.old_status.map(SyncStatus::as_str),
                    change.new_status.as_str(),
                    change.reason.clone(),
                    change.changed_at,
                ],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn history(&self, game_id: i64, limit: usize) -> Result<Vec<SyncStatusChange>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT id, game_id, emulator_id, channel_name, old_status, new_status, reason,
                        changed_at
                 FROM sync_status_history WHERE game_id = ?
                 ORDER BY changed_at DESC, id DESC LIMIT ?",
                params![game_id, limit],
            )
            .await?;

        let mut changes = Vec::new();
        while let Some(row) = rows.next().await? {
            changes.push(Self::parse_change(&row)?);
        }
        Ok(changes)
    }
}
