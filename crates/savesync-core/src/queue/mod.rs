//! Durable, retryable sync queue
//!
//! Entries move `PENDING → IN_PROGRESS → COMPLETED | FAILED`. A failed entry
//! goes back to `PENDING` only while `retry_count < max_retries`; past that
//! it waits for an exhausted-retry cleanup or an explicit re-enqueue.

mod processor;
mod worker;

use std::sync::Arc;

use serde::Serialize;

pub use processor::SaveSyncProcessor;
pub use worker::{DrainReport, SyncProcessor, SyncWorker};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::models::{
    QueueStatus, SaveFilePayload, SaveStatePayload, SyncPriority, SyncQueueEntry, SyncType,
};
use crate::services::DatabaseService;

/// Queue counters for progress indicators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    /// Failed entries still under their retry budget
    pub retryable: u64,
    pub pending_save_files: u64,
    pub pending_save_states: u64,
}

/// Rows removed by [`SyncQueue::cleanup`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub completed: u64,
    pub exhausted: u64,
}

#[derive(Clone)]
pub struct SyncQueue {
    db: DatabaseService,
    clock: Arc<dyn Clock>,
    max_retries: i32,
}

impl SyncQueue {
    pub fn new(db: DatabaseService, clock: Arc<dyn Clock>, max_retries: i32) -> Self {
        Self {
            db,
            clock,
            max_retries: max_retries.max(0),
        }
    }

    async fn enqueue(&self, game_id: i64, sync_type: SyncType, payload_json: &str) -> Result<SyncQueueEntry> {
        let entry = self
            .db
            .enqueue(
                game_id,
                sync_type,
                sync_type.default_priority(),
                self.max_retries,
                payload_json,
                self.clock.now_millis(),
            )
            .await?;
        tracing::info!(id = entry.id, game_id, sync_type = %sync_type, "Queued sync");
        Ok(entry)
    }

    /// Queue a save-file transfer, replacing any waiting entry for the game
    pub async fn enqueue_save_file(&self, game_id: i64, payload: &SaveFilePayload) -> Result<SyncQueueEntry> {
        if payload.emulator_id.trim().is_empty() {
            return Err(Error::InvalidInput("emulator id is required".to_string()));
        }
        self.enqueue(game_id, SyncType::SaveFile, &serde_json::to_string(payload)?)
            .await
    }

    pub async fn enqueue_save_state(&self, game_id: i64, payload: &SaveStatePayload) -> Result<SyncQueueEntry> {
        if payload.local_path.trim().is_empty() {
            return Err(Error::InvalidInput("state path is required".to_string()));
        }
        self.enqueue(game_id, SyncType::SaveState, &serde_json::to_string(payload)?)
            .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<SyncQueueEntry>> {
        self.db.get_queue_entry(id).await
    }

    pub async fn has_pending(&self, game_id: i64, sync_type: SyncType) -> Result<bool> {
        self.db.has_pending(game_id, sync_type).await
    }

    pub async fn counts(&self) -> Result<QueueCounts> {
        Ok(QueueCounts {
            pending: self.db.count_by_status(QueueStatus::Pending).await?,
            in_progress: self.db.count_by_status(QueueStatus::InProgress).await?,
            completed: self.db.count_by_status(QueueStatus::Completed).await?,
            failed: self.db.count_by_status(QueueStatus::Failed).await?,
            retryable: self.db.count_retryable().await?,
            pending_save_files: self.db.count_pending_by_type(SyncType::SaveFile).await?,
            pending_save_states: self.db.count_pending_by_type(SyncType::SaveState).await?,
        })
    }

    pub async fn list(&self, status: QueueStatus, limit: usize) -> Result<Vec<SyncQueueEntry>> {
        self.db.list_queue_by_status(status, limit).await
    }

    /// Everything pending, in drain order
    pub async fn pending(&self) -> Result<Vec<SyncQueueEntry>> {
        self.db.pending_by_priority().await
    }

    /// One priority tier, in drain order
    pub async fn pending_tier(&self, priority: SyncPriority) -> Result<Vec<SyncQueueEntry>> {
        self.db.pending_by_priority_tier(priority).await
    }

    /// Explicitly re-queue one failed entry.
    ///
    /// Fails with [`Error::RetryExhausted`] once the entry has used its budget.
    pub async fn retry(&self, id: i64) -> Result<SyncQueueEntry> {
        let entry = self
            .db
            .get_queue_entry(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("queue entry {id}")))?;
        if entry.is_exhausted() {
            return Err(Error::RetryExhausted(format!(
                "entry {id} failed {} of {} attempts",
                entry.retry_count, entry.max_retries
            )));
        }
        if entry.status != QueueStatus::Failed {
            return Err(Error::InvalidInput(format!(
                "entry {id} is {} and cannot be retried",
                entry.status
            )));
        }
        if !self.db.retry_if_eligible(id, self.clock.now_millis()).await? {
            return Err(Error::RetryExhausted(format!("entry {id}")));
        }
        self.db
            .get_queue_entry(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("queue entry {id}")))
    }

    /// Move every eligible failed entry back to pending
    pub async fn retry_all(&self) -> Result<u64> {
        let retried = self.db.retry_all_eligible(self.clock.now_millis()).await?;
        if retried > 0 {
            tracing::info!(retried, "Re-queued failed syncs");
        }
        Ok(retried)
    }

    pub async fn cancel(&self, id: i64) -> Result<bool> {
        self.db.delete_queue_entry(id).await
    }

    /// Bulk-remove completed entries and entries past their retry budget
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        let report = CleanupReport {
            completed: self.db.delete_completed().await?,
            exhausted: self.db.delete_exhausted_retries().await?,
        };
        tracing::info!(
            completed = report.completed,
            exhausted = report.exhausted,
            "Cleaned up sync queue"
        );
        Ok(report)
    }

    /// Return entries left `IN_PROGRESS` by an interrupted run to pending
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let reset = self.db.reset_stale_in_progress(self.clock.now_millis()).await?;
        if reset > 0 {
            tracing::warn!(reset, "Recovered interrupted syncs");
        }
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use pretty_assertions::assert_eq;

    async fn queue(max_retries: i32) -> (SyncQueue, DatabaseService) {
        let db = DatabaseService::open_in_memory().await.unwrap();
        let queue = SyncQueue::new(db.clone(), Arc::new(FixedClock::new(100)), max_retries);
        (queue, db)
    }

    fn save_payload() -> SaveFilePayload {
        SaveFilePayload {
            emulator_id: "retroarch".to_string(),
            platform_slug: "snes".to_string(),
            ..SaveFilePayload::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_replaces_waiting_entry() {
        let (queue, _db) = queue(3).await;
        queue.enqueue_save_file(42, &save_payload()).await.unwrap();
        let second = queue.enqueue_save_file(42, &save_payload()).await.unwrap();

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
        assert_eq!(pending[0].priority, SyncPriority::SAVE_FILE);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn three_failures_exhaust_the_budget() {
        let (queue, db) = queue(3).await;
        let entry = queue.enqueue_save_file(42, &save_payload()).await.unwrap();

        for attempt in 1..=3 {
            let claimed = db.claim_next(SyncType::SaveFile, 200).await.unwrap().unwrap();
            assert_eq!(claimed.id, entry.id);
            db.mark_failed(entry.id, "timeout", 300).await.unwrap();
            if attempt < 3 {
                assert_eq!(queue.retry(entry.id).await.unwrap().status, QueueStatus::Pending);
            }
        }
        // A fourth failure report keeps the count clamped
        db.mark_failed(entry.id, "timeout", 400).await.unwrap();
        let failed = queue.get(entry.id).await.unwrap().unwrap();
        assert_eq!(failed.retry_count, 3);
        assert!(failed.is_exhausted());

        let error = queue.retry(entry.id).await.unwrap_err();
        assert!(matches!(error, Error::RetryExhausted(_)));
        assert_eq!(queue.retry_all().await.unwrap(), 0);

        let report = queue.cleanup().await.unwrap();
        assert_eq!(report, CleanupReport { completed: 0, exhausted: 1 });
        assert_eq!(queue.get(entry.id).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn counts_track_each_state() {
        let (queue, db) = queue(3).await;
        queue.enqueue_save_file(1, &save_payload()).await.unwrap();
        queue
            .enqueue_save_state(
                2,
                &SaveStatePayload {
                    emulator_id: "retroarch".to_string(),
                    local_path: "/sdcard/states/game.state".to_string(),
                    ..SaveStatePayload::default()
                },
            )
            .await
            .unwrap();
        queue.enqueue_save_file(3, &save_payload()).await.unwrap();
        let claimed = db.claim_next(SyncType::SaveFile, 150).await.unwrap().unwrap();
        db.mark_completed(claimed.id, 160).await.unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.pending_save_states, 1);
        assert_eq!(counts.pending_save_files, 1);
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.in_progress, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_rejects_missing_and_pending_entries() {
        let (queue, _db) = queue(3).await;
        assert!(matches!(queue.retry(99).await.unwrap_err(), Error::NotFound(_)));
        let entry = queue.enqueue_save_file(5, &save_payload()).await.unwrap();
        assert!(matches!(
            queue.retry(entry.id).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interrupted_entries_are_recovered() {
        let (queue, db) = queue(3).await;
        let entry = queue.enqueue_save_file(8, &save_payload()).await.unwrap();
        db.claim_next(SyncType::SaveFile, 150).await.unwrap().unwrap();
        assert_eq!(queue.recover_interrupted().await.unwrap(), 1);
        assert_eq!(
            queue.get(entry.id).await.unwrap().unwrap().status,
            QueueStatus::Pending
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tiers_split_by_priority_and_cancel_removes() {
        let (queue, _db) = queue(3).await;
        let file = queue.enqueue_save_file(1, &save_payload()).await.unwrap();
        queue
            .enqueue_save_state(
                1,
                &SaveStatePayload {
                    emulator_id: "retroarch".to_string(),
                    local_path: "/sdcard/states/game.state1".to_string(),
                    slot_number: 1,
                    ..SaveStatePayload::default()
                },
            )
            .await
            .unwrap();

        let files = queue.pending_tier(SyncPriority::SAVE_FILE).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].sync_type, SyncType::SaveFile);
        assert_eq!(queue.pending_tier(SyncPriority::SAVE_STATE).await.unwrap().len(), 1);

        assert!(queue.cancel(file.id).await.unwrap());
        assert!(!queue.cancel(file.id).await.unwrap());
        assert!(!queue.has_pending(1, SyncType::SaveFile).await.unwrap());
        assert!(queue.has_pending(1, SyncType::SaveState).await.unwrap());
    }
}
