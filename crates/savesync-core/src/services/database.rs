//! Shared database service wrapper used by the cache, the queue and the resolver.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    Database, LibSqlQueueRepository, LibSqlSnapshotRepository, LibSqlSyncStatusRepository,
    QueueRepository, SnapshotRepository, SyncStatusRepository,
};
use crate::models::{
    QueueStatus, SnapshotEntry, SnapshotKind, SyncPriority, SyncQueueEntry, SyncStatus,
    SyncStatusChange, SyncStatusRecord, SyncType,
};
use crate::Result;

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(&db_path).await?;
        tracing::info!(path = %db_path.display(), "Opened savesync database");
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    // ---------------------------------------------------------------------
    // Snapshot cache
    // ---------------------------------------------------------------------

    pub async fn insert_snapshot(&self, entry: &SnapshotEntry) -> Result<SnapshotEntry> {
        let db = self.db.lock().await;
        let repo = LibSqlSnapshotRepository::new(db.connection(), entry.kind);
        repo.insert(entry).await
    }

    /// Insert a state, replacing any entry on the same slot key.
    pub async fn upsert_snapshot_slot(&self, entry: &SnapshotEntry) -> Result<SnapshotEntry> {
        let db = self.db.lock().await;
        let repo = LibSqlSnapshotRepository::new(db.connection(), entry.kind);
        repo.upsert_slot(entry).await
    }

    pub async fn get_snapshot(&self, kind: SnapshotKind, id: i64) -> Result<Option<SnapshotEntry>> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), kind).get(id).await
    }

    /// Snapshots for a game, newest first.
    pub async fn list_snapshots(&self, kind: SnapshotKind, game_id: i64) -> Result<Vec<SnapshotEntry>> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), kind)
            .list_by_game(game_id)
            .await
    }

    pub async fn find_snapshot_by_hash(
        &self,
        kind: SnapshotKind,
        game_id: i64,
        channel_name: Option<&str>,
        content_hash: &str,
    ) -> Result<Option<SnapshotEntry>> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), kind)
            .find_by_hash(game_id, channel_name, content_hash)
            .await
    }

    pub async fn get_state_slot(
        &self,
        game_id: i64,
        emulator_id: Option<&str>,
        slot_number: i32,
        channel_name: Option<&str>,
    ) -> Result<Option<SnapshotEntry>> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), SnapshotKind::State)
            .get_slot(game_id, emulator_id, slot_number, channel_name)
            .await
    }

    pub async fn set_snapshot_note(&self, kind: SnapshotKind, id: i64, note: Option<&str>) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), kind)
            .set_note(id, note)
            .await
    }

    pub async fn set_snapshot_locked(&self, kind: SnapshotKind, id: i64, locked: bool) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), kind)
            .set_locked(id, locked)
            .await
    }

    pub async fn bind_state_to_channel(&self, id: i64, channel_name: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), SnapshotKind::State)
            .bind_to_channel(id, channel_name)
            .await
    }

    pub async fn unbind_state_from_channel(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), SnapshotKind::State)
            .unbind_from_channel(id)
            .await
    }

    pub async fn delete_snapshot(&self, kind: SnapshotKind, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), kind).delete(id).await
    }

    pub async fn delete_snapshots_by_game(&self, kind: SnapshotKind, game_id: i64) -> Result<Vec<SnapshotEntry>> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), kind)
            .delete_by_game(game_id)
            .await
    }

    /// Delete the `count` oldest unlocked snapshots for a game.
    pub async fn evict_oldest_unlocked(
        &self,
        kind: SnapshotKind,
        game_id: i64,
        count: usize,
    ) -> Result<Vec<SnapshotEntry>> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), kind)
            .delete_oldest_unlocked(game_id, count)
            .await
    }

    pub async fn count_unlocked_snapshots(&self, kind: SnapshotKind, game_id: i64) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection(), kind)
            .count_unlocked(game_id)
            .await
    }

    // ---------------------------------------------------------------------
    // Sync queue
    // ---------------------------------------------------------------------

    pub async fn enqueue(
        &self,
        game_id: i64,
        sync_type: SyncType,
        priority: SyncPriority,
        max_retries: i32,
        payload_json: &str,
        now: i64,
    ) -> Result<SyncQueueEntry> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .enqueue(game_id, sync_type, priority, max_retries, payload_json, now)
            .await
    }

    pub async fn get_queue_entry(&self, id: i64) -> Result<Option<SyncQueueEntry>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).get(id).await
    }

    /// Claim the next pending entry of a type.
    ///
    /// Returns `None` when nothing is pending or another consumer won the
    /// `PENDING → IN_PROGRESS` update.
    pub async fn claim_next(&self, sync_type: SyncType, now: i64) -> Result<Option<SyncQueueEntry>> {
        let db = self.db.lock().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let Some(mut entry) = repo.next_pending(sync_type).await? else {
            return Ok(None);
        };
        if !repo.mark_in_progress(entry.id, now).await? {
            tracing::debug!(id = entry.id, "Queue entry claimed elsewhere");
            return Ok(None);
        }
        entry.status = QueueStatus::InProgress;
        entry.updated_at = now;
        Ok(Some(entry))
    }

    pub async fn pending_by_priority(&self) -> Result<Vec<SyncQueueEntry>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .pending_by_priority()
            .await
    }

    pub async fn pending_by_priority_tier(&self, priority: SyncPriority) -> Result<Vec<SyncQueueEntry>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .pending_by_priority_tier(priority)
            .await
    }

    pub async fn mark_completed(&self, id: i64, now: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .mark_completed(id, now)
            .await
    }

    pub async fn mark_failed(&self, id: i64, error: &str, now: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .mark_failed(id, error, now)
            .await
    }

    pub async fn retry_if_eligible(&self, id: i64, now: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .retry_if_eligible(id, now)
            .await
    }

    pub async fn retry_all_eligible(&self, now: i64) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .retry_all_eligible(now)
            .await
    }

    pub async fn delete_queue_entry(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).delete(id).await
    }

    pub async fn delete_completed(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .delete_completed()
            .await
    }

    pub async fn delete_exhausted_retries(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .delete_exhausted_retries()
            .await
    }

    pub async fn has_pending(&self, game_id: i64, sync_type: SyncType) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .has_pending(game_id, sync_type)
            .await
    }

    pub async fn count_by_status(&self, status: QueueStatus) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .count_by_status(status)
            .await
    }

    pub async fn count_pending_by_type(&self, sync_type: SyncType) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .count_pending_by_type(sync_type)
            .await
    }

    pub async fn count_retryable(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .count_retryable()
            .await
    }

    pub async fn list_queue_by_status(&self, status: QueueStatus, limit: usize) -> Result<Vec<SyncQueueEntry>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .list_by_status(status, limit)
            .await
    }

    pub async fn reset_stale_in_progress(&self, now: i64) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .reset_stale_in_progress(now)
            .await
    }

    // ---------------------------------------------------------------------
    // Sync status
    // ---------------------------------------------------------------------

    pub async fn get_sync_status(
        &self,
        game_id: i64,
        emulator_id: &str,
        channel_name: Option<&str>,
    ) -> Result<Option<SyncStatusRecord>> {
        let db = self.db.lock().await;
        LibSqlSyncStatusRepository::new(db.connection())
            .get(game_id, emulator_id, channel_name)
            .await
    }

    pub async fn list_sync_status(&self, game_id: i64) -> Result<Vec<SyncStatusRecord>> {
        let db = self.db.lock().await;
        LibSqlSyncStatusRepository::new(db.connection())
            .list_by_game(game_id)
            .await
    }

    pub async fn list_sync_status_by_status(&self, status: SyncStatus) -> Result<Vec<SyncStatusRecord>> {
        let db = self.db.lock().await;
        LibSqlSyncStatusRepository::new(db.connection())
            .list_by_status(status)
            .await
    }

    /// Store a record and, when given, the transition that produced it.
    pub async fn save_sync_status(
        &self,
        record: &SyncStatusRecord,
        change: Option<&SyncStatusChange>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncStatusRepository::new(db.connection());
        repo.upsert(record).await?;
        if let Some(change) = change {
            repo.record_change(change).await?;
        }
        Ok(())
    }

    pub async fn sync_status_history(&self, game_id: i64, limit: usize) -> Result<Vec<SyncStatusChange>> {
        let db = self.db.lock().await;
        LibSqlSyncStatusRepository::new(db.connection())
            .history(game_id, limit)
            .await
    }

    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute_batch(sql).await?;
        Ok(())
    }
}
