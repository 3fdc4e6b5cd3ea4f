//! Single-consumer drain loop per sync type

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::models::{SyncQueueEntry, SyncType};
use crate::services::DatabaseService;

/// Carries out one claimed queue entry
#[allow(async_fn_in_trait)]
pub trait SyncProcessor {
    async fn process(&self, entry: &SyncQueueEntry) -> Result<()>;
}

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub sync_type: SyncType,
    pub completed: usize,
    pub failed: usize,
    /// Failures that used the last retry
    pub exhausted: usize,
}

impl DrainReport {
    const fn new(sync_type: SyncType) -> Self {
        Self {
            sync_type,
            completed: 0,
            failed: 0,
            exhausted: 0,
        }
    }
}

/// Removes the type from the active set when a drain ends
struct ActiveDrain {
    active: Arc<Mutex<HashSet<SyncType>>>,
    sync_type: SyncType,
}

impl Drop for ActiveDrain {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.sync_type);
    }
}

pub struct SyncWorker<P> {
    db: DatabaseService,
    clock: Arc<dyn Clock>,
    processor: P,
    active: Arc<Mutex<HashSet<SyncType>>>,
}

impl<P: SyncProcessor> SyncWorker<P> {
    pub fn new(db: DatabaseService, clock: Arc<dyn Clock>, processor: P) -> Self {
        Self {
            db,
            clock,
            processor,
            active: Arc::default(),
        }
    }

    pub const fn processor(&self) -> &P {
        &self.processor
    }

    fn begin(&self, sync_type: SyncType) -> Result<ActiveDrain> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(sync_type) {
            return Err(Error::DuplicateInProgress(format!(
                "{sync_type} queue is already draining"
            )));
        }
        Ok(ActiveDrain {
            active: self.active.clone(),
            sync_type,
        })
    }

    /// Process pending entries of one type until none are left.
    ///
    /// Entries are claimed one at a time and finished before the next claim.
    /// Failed entries are not retried within the same pass.
    pub async fn drain(&self, sync_type: SyncType) -> Result<DrainReport> {
        let _active = self.begin(sync_type)?;
        let mut report = DrainReport::new(sync_type);

        while let Some(entry) = self.db.claim_next(sync_type, self.clock.now_millis()).await? {
            tracing::debug!(id = entry.id, game_id = entry.game_id, %sync_type, "Processing sync");
            match self.processor.process(&entry).await {
                Ok(()) => {
                    self.db.mark_completed(entry.id, self.clock.now_millis()).await?;
                    report.completed += 1;
                    tracing::info!(id = entry.id, game_id = entry.game_id, "Sync completed");
                }
                Err(error) => {
                    let message = error.to_string();
                    self.db
                        .mark_failed(entry.id, &message, self.clock.now_millis())
                        .await?;
                    report.failed += 1;
                    if entry.retry_count + 1 >= entry.max_retries {
                        report.exhausted += 1;
                        tracing::warn!(id = entry.id, game_id = entry.game_id, error = %message, "Sync failed permanently");
                    } else {
                        tracing::warn!(
                            id = entry.id,
                            game_id = entry.game_id,
                            attempt = entry.retry_count + 1,
                            error = %message,
                            "Sync failed"
                        );
                    }
                }
            }
        }
        Ok(report)
    }

    /// Re-queue eligible failures, then drain every type concurrently
    pub async fn drain_all(&self) -> Result<Vec<DrainReport>> {
        self.db.retry_all_eligible(self.clock.now_millis()).await?;
        let (files, states) = tokio::join!(
            self.drain(SyncType::SaveFile),
            self.drain(SyncType::SaveState)
        );
        Ok(vec![files?, states?])
    }
}
