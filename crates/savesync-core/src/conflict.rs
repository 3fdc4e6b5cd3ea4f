//! Local versus remote classification for one save lineage
//!
//! A lineage is `(game, emulator, channel)`. The resolver compares what is on
//! the device now and what the server holds now against the values recorded
//! at the last successful sync, then stores the resulting [`SyncStatus`].
//! Every transition is written to the history table with a reason.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::hash_local_save;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::fs::newest_file_time;
use crate::handlers::HandlerEnv;
use crate::models::{ConflictResolution, SyncDirection, SyncStatus, SyncStatusChange, SyncStatusRecord};
use crate::remote::RemoteSaveInfo;
use crate::services::DatabaseService;

/// What is on the device right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalState {
    pub path: PathBuf,
    /// Unix ms; newest file for folder saves
    pub modified_at: Option<i64>,
    pub content_hash: Option<String>,
}

/// Lineage key
#[derive(Debug, Clone, Copy)]
pub struct Lineage<'a> {
    pub game_id: i64,
    pub emulator_id: &'a str,
    pub channel_name: Option<&'a str>,
}

impl<'a> Lineage<'a> {
    pub const fn new(game_id: i64, emulator_id: &'a str, channel_name: Option<&'a str>) -> Self {
        Self {
            game_id,
            emulator_id,
            channel_name,
        }
    }
}

/// Classify a lineage from its last sync record and both sides' current state.
///
/// Hashes win over timestamps whenever both sides of a comparison have one.
pub fn classify(
    record: Option<&SyncStatusRecord>,
    local: Option<&LocalState>,
    remote: Option<&RemoteSaveInfo>,
) -> (SyncStatus, String) {
    let (local, remote) = match (local, remote) {
        (None, None) => return (SyncStatus::InSync, "no local or remote save".to_string()),
        (Some(_), None) => return (SyncStatus::LocalNewer, "no remote copy".to_string()),
        (None, Some(_)) => return (SyncStatus::ServerNewer, "no local copy".to_string()),
        (Some(local), Some(remote)) => (local, remote),
    };

    if let (Some(local_hash), Some(remote_hash)) = (&local.content_hash, &remote.content_hash) {
        if local_hash == remote_hash {
            return (SyncStatus::InSync, "local and remote content match".to_string());
        }
    }

    let Some(record) = record.filter(|record| record.last_synced_at.is_some()) else {
        return match local.modified_at {
            Some(modified) if modified > remote.updated_at => (
                SyncStatus::LocalNewer,
                "never synced, local save is newer".to_string(),
            ),
            Some(modified) if modified == remote.updated_at => {
                (SyncStatus::InSync, "never synced, timestamps match".to_string())
            }
            _ => (
                SyncStatus::ServerNewer,
                "never synced, remote save is newer".to_string(),
            ),
        };
    };

    let local_changed = match (&local.content_hash, &record.last_synced_hash) {
        (Some(hash), Some(synced)) => hash != synced,
        _ => match (local.modified_at, record.local_updated_at) {
            (Some(modified), Some(synced)) => modified > synced,
            _ => true,
        },
    };
    let remote_changed = match (&remote.content_hash, &record.last_synced_hash) {
        (Some(hash), Some(synced)) => hash != synced,
        _ => {
            record.server_save_id.as_deref() != Some(remote.save_id.as_str())
                || record
                    .server_updated_at
                    .is_none_or(|synced| remote.updated_at > synced)
        }
    };

    match (local_changed, remote_changed) {
        (true, true) => (
            SyncStatus::Conflict,
            "local and remote both changed since last sync".to_string(),
        ),
        (true, false) => (SyncStatus::LocalNewer, "local changed since last sync".to_string()),
        (false, true) => (SyncStatus::ServerNewer, "remote changed since last sync".to_string()),
        (false, false) => (SyncStatus::InSync, "unchanged since last sync".to_string()),
    }
}

#[derive(Clone)]
pub struct ConflictResolver {
    db: DatabaseService,
    env: HandlerEnv,
    clock: Arc<dyn Clock>,
}

impl ConflictResolver {
    pub fn new(db: DatabaseService, env: HandlerEnv, clock: Arc<dyn Clock>) -> Self {
        Self { db, env, clock }
    }

    /// Read modification time and content hash of a save, `None` if absent
    pub async fn observe_local(&self, path: &Path) -> Result<Option<LocalState>> {
        let fs = self.env.fs.clone();
        if !fs.exists(path) {
            return Ok(None);
        }
        let modified_at = if fs.is_directory(path) {
            newest_file_time(fs.as_ref(), path)
        } else {
            fs.last_modified(path)
        };
        let content_hash = hash_local_save(&self.env, path).await?;
        Ok(Some(LocalState {
            path: path.to_path_buf(),
            modified_at,
            content_hash: Some(content_hash),
        }))
    }

    pub async fn status(&self, lineage: Lineage<'_>) -> Result<Option<SyncStatusRecord>> {
        self.db
            .get_sync_status(lineage.game_id, lineage.emulator_id, lineage.channel_name)
            .await
    }

    pub async fn status_for_game(&self, game_id: i64) -> Result<Vec<SyncStatusRecord>> {
        self.db.list_sync_status(game_id).await
    }

    pub async fn conflicts(&self) -> Result<Vec<SyncStatusRecord>> {
        self.db.list_sync_status_by_status(SyncStatus::Conflict).await
    }

    pub async fn history(&self, game_id: i64, limit: usize) -> Result<Vec<SyncStatusChange>> {
        self.db.sync_status_history(game_id, limit).await
    }

    async fn load(&self, lineage: Lineage<'_>) -> Result<(Option<SyncStatus>, SyncStatusRecord)> {
        let existing = self.status(lineage).await?;
        let old = existing.as_ref().map(|record| record.sync_status);
        let record = existing.unwrap_or_else(|| {
            SyncStatusRecord::new(
                lineage.game_id,
                lineage.emulator_id,
                lineage.channel_name.map(str::to_string),
            )
        });
        Ok((old, record))
    }

    /// Persist `record`, logging a history row when the status moved
    async fn store(&self, old: Option<SyncStatus>, record: &SyncStatusRecord, reason: &str) -> Result<()> {
        if old == Some(record.sync_status) {
            return self.db.save_sync_status(record, None).await;
        }
        let change = SyncStatusChange {
            id: 0,
            game_id: record.game_id,
            emulator_id: record.emulator_id.clone(),
            channel_name: record.channel_name.clone(),
            old_status: old,
            new_status: record.sync_status,
            reason: reason.to_string(),
            changed_at: self.clock.now_millis(),
        };
        tracing::info!(
            game_id = record.game_id,
            emulator_id = %record.emulator_id,
            old = ?old,
            new = %record.sync_status,
            reason,
            "Sync status changed"
        );
        self.db.save_sync_status(record, Some(&change)).await
    }

    /// Classify and store the lineage's status
    pub async fn evaluate(
        &self,
        lineage: Lineage<'_>,
        local: Option<&LocalState>,
        remote: Option<&RemoteSaveInfo>,
    ) -> Result<SyncStatusRecord> {
        let (old, mut record) = self.load(lineage).await?;
        let (status, reason) = classify(Some(&record).filter(|_| old.is_some()), local, remote);
        record.sync_status = status;
        if let Some(local) = local {
            record.local_save_path = Some(local.path.to_string_lossy().into_owned());
        }
        self.store(old, &record, &reason).await?;
        Ok(record)
    }

    /// Record a completed transfer as the new common point
    pub async fn mark_synced(
        &self,
        lineage: Lineage<'_>,
        local: &LocalState,
        remote: &RemoteSaveInfo,
        reason: &str,
    ) -> Result<SyncStatusRecord> {
        let (old, mut record) = self.load(lineage).await?;
        record.sync_status = SyncStatus::InSync;
        record.local_save_path = Some(local.path.to_string_lossy().into_owned());
        record.local_updated_at = local.modified_at;
        record.server_save_id = Some(remote.save_id.clone());
        record.server_updated_at = Some(remote.updated_at);
        record.last_synced_hash = local
            .content_hash
            .clone()
            .or_else(|| remote.content_hash.clone());
        record.last_synced_at = Some(self.clock.now_millis());
        record.last_sync_error = None;
        self.store(old, &record, reason).await?;
        Ok(record)
    }

    /// Keep the status, remember the failure
    pub async fn record_error(&self, lineage: Lineage<'_>, error: &str) -> Result<()> {
        let (old, mut record) = self.load(lineage).await?;
        record.last_sync_error = Some(error.to_string());
        self.store(old, &record, error).await
    }

    /// Apply a caller's decision to a conflicted lineage.
    ///
    /// Returns the transfer the caller should now run, `None` for [`ConflictResolution::Skip`].
    pub async fn resolve(
        &self,
        lineage: Lineage<'_>,
        resolution: ConflictResolution,
    ) -> Result<Option<SyncDirection>> {
        let (old, mut record) = self.load(lineage).await?;
        if old != Some(SyncStatus::Conflict) {
            return Err(Error::InvalidInput(format!(
                "game {} has no conflict to resolve",
                lineage.game_id
            )));
        }
        let (status, direction, reason) = match resolution {
            ConflictResolution::KeepLocal => (
                SyncStatus::LocalNewer,
                Some(SyncDirection::Upload),
                "conflict resolved: keep local",
            ),
            ConflictResolution::KeepServer => (
                SyncStatus::ServerNewer,
                Some(SyncDirection::Download),
                "conflict resolved: keep server",
            ),
            ConflictResolution::Skip => (SyncStatus::Conflict, None, "conflict skipped"),
        };
        record.sync_status = status;
        self.store(old, &record, reason).await?;
        Ok(direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::handlers::tests::device;
    use pretty_assertions::assert_eq;

    fn local(modified_at: i64, hash: &str) -> LocalState {
        LocalState {
            path: PathBuf::from("/sdcard/saves/game.srm"),
            modified_at: Some(modified_at),
            content_hash: Some(hash.to_string()),
        }
    }

    fn remote(save_id: &str, updated_at: i64, hash: &str) -> RemoteSaveInfo {
        RemoteSaveInfo {
            save_id: save_id.to_string(),
            game_id: 1,
            emulator_id: "retroarch".to_string(),
            channel_name: None,
            slot_number: None,
            file_name: "game.srm".to_string(),
            updated_at,
            content_hash: Some(hash.to_string()),
            size_bytes: 4,
        }
    }

    fn synced(hash: &str) -> SyncStatusRecord {
        let mut record = SyncStatusRecord::new(1, "retroarch", None);
        record.server_save_id = Some("s1".to_string());
        record.server_updated_at = Some(100);
        record.local_updated_at = Some(100);
        record.last_synced_hash = Some(hash.to_string());
        record.last_synced_at = Some(100);
        record
    }

    #[test]
    fn one_sided_lineages() {
        let l = local(10, "a");
        let r = remote("s1", 10, "b");
        assert_eq!(classify(None, None, None).0, SyncStatus::InSync);
        assert_eq!(classify(None, Some(&l), None).0, SyncStatus::LocalNewer);
        assert_eq!(classify(None, None, Some(&r)).0, SyncStatus::ServerNewer);
    }

    #[test]
    fn never_synced_uses_timestamps_unless_hashes_match() {
        assert_eq!(
            classify(None, Some(&local(200, "a")), Some(&remote("s1", 100, "b"))).0,
            SyncStatus::LocalNewer
        );
        assert_eq!(
            classify(None, Some(&local(50, "a")), Some(&remote("s1", 100, "b"))).0,
            SyncStatus::ServerNewer
        );
        assert_eq!(
            classify(None, Some(&local(50, "same")), Some(&remote("s1", 100, "same"))).0,
            SyncStatus::InSync
        );
    }

    #[test]
    fn changes_since_last_sync() {
        let record = synced("h0");
        let cases = [
            (local(100, "h0"), remote("s1", 100, "h0"), SyncStatus::InSync),
            (local(300, "h1"), remote("s1", 100, "h0"), SyncStatus::LocalNewer),
            (local(100, "h0"), remote("s2", 300, "h2"), SyncStatus::ServerNewer),
            (local(300, "h1"), remote("s2", 300, "h2"), SyncStatus::Conflict),
        ];
        for (l, r, expected) in cases {
            assert_eq!(classify(Some(&record), Some(&l), Some(&r)).0, expected);
        }
    }

    #[test]
    fn timestamps_decide_without_hashes() {
        let mut record = synced("h0");
        record.last_synced_hash = None;
        let mut l = local(100, "h0");
        l.content_hash = None;
        let mut r = remote("s1", 100, "h0");
        r.content_hash = None;
        assert_eq!(classify(Some(&record), Some(&l), Some(&r)).0, SyncStatus::InSync);

        l.modified_at = Some(500);
        r.save_id = "s9".to_string();
        assert_eq!(classify(Some(&record), Some(&l), Some(&r)).0, SyncStatus::Conflict);
    }

    async fn resolver() -> (ConflictResolver, Arc<FixedClock>) {
        let device = device();
        let clock = Arc::new(FixedClock::new(1_000));
        let db = DatabaseService::open_in_memory().await.unwrap();
        (ConflictResolver::new(db, device.env.clone(), clock.clone()), clock)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transitions_are_recorded() {
        let (resolver, clock) = resolver().await;
        let lineage = Lineage::new(1, "retroarch", None);

        let first = resolver
            .evaluate(lineage, Some(&local(200, "h1")), None)
            .await
            .unwrap();
        assert_eq!(first.sync_status, SyncStatus::LocalNewer);

        // Same status again: no new history row
        resolver
            .evaluate(lineage, Some(&local(200, "h1")), None)
            .await
            .unwrap();

        clock.advance(10);
        resolver
            .mark_synced(lineage, &local(200, "h1"), &remote("s1", 1_010, "h1"), "uploaded")
            .await
            .unwrap();

        let history = resolver.history(1, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        let statuses: Vec<_> = history.iter().map(|c| (c.old_status, c.new_status)).collect();
        assert!(statuses.contains(&(None, SyncStatus::LocalNewer)));
        assert!(statuses.contains(&(Some(SyncStatus::LocalNewer), SyncStatus::InSync)));

        let record = resolver.status(lineage).await.unwrap().unwrap();
        assert_eq!(record.last_synced_hash.as_deref(), Some("h1"));
        assert_eq!(record.server_save_id.as_deref(), Some("s1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conflict_needs_explicit_resolution() {
        let (resolver, _clock) = resolver().await;
        let lineage = Lineage::new(1, "retroarch", None);
        resolver
            .mark_synced(lineage, &local(100, "h0"), &remote("s1", 100, "h0"), "initial")
            .await
            .unwrap();

        let record = resolver
            .evaluate(lineage, Some(&local(300, "h1")), Some(&remote("s2", 300, "h2")))
            .await
            .unwrap();
        assert_eq!(record.sync_status, SyncStatus::Conflict);
        assert_eq!(resolver.conflicts().await.unwrap().len(), 1);

        assert_eq!(
            resolver.resolve(lineage, ConflictResolution::Skip).await.unwrap(),
            None
        );
        assert_eq!(
            resolver
                .resolve(lineage, ConflictResolution::KeepServer)
                .await
                .unwrap(),
            Some(SyncDirection::Download)
        );
        let error = resolver
            .resolve(lineage, ConflictResolution::KeepLocal)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn observe_local_hashes_files() {
        let device = device();
        let db = DatabaseService::open_in_memory().await.unwrap();
        let resolver = ConflictResolver::new(db, device.env.clone(), Arc::new(FixedClock::new(0)));
        let save = device.ext().join("saves/game.srm");
        assert_eq!(resolver.observe_local(&save).await.unwrap(), None);

        device.env.fs.write_bytes(&save, b"abcd").unwrap();
        let state = resolver.observe_local(&save).await.unwrap().unwrap();
        assert_eq!(
            state.content_hash.as_deref(),
            Some(crate::archive::hash_bytes(b"abcd").as_str())
        );
        assert!(state.modified_at.is_some());
    }
}
