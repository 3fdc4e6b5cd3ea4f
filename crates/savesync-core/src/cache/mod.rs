//! Snapshot cache: content-addressed local history of saves and states
//!
//! Every capture is hashed first. If the same `(game, channel)` already holds
//! an entry with that hash the capture is a no-op. Otherwise the bytes are
//! copied under `cache_dir/{saves|states}/{game_id}/...`, a row is written and
//! the per-game cap of unlocked entries is enforced. Locked entries (noted or
//! channel-bound) are never evicted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::handlers::{HandlerEnv, Staging};
use crate::models::{CaptureOutcome, SnapshotEntry, SnapshotKind};
use crate::services::DatabaseService;
use crate::util::normalize_text_option;

/// File name of a zipped folder capture
const FOLDER_BUNDLE: &str = "save.zip";

/// What to capture and under which key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub kind: SnapshotKind,
    pub game_id: i64,
    pub emulator_id: Option<String>,
    pub channel_name: Option<String>,
    pub slot_number: Option<i32>,
    pub core_id: Option<String>,
    pub note: Option<String>,
    pub is_hardcore: bool,
}

impl CaptureRequest {
    pub const fn save(game_id: i64) -> Self {
        Self {
            kind: SnapshotKind::Save,
            game_id,
            emulator_id: None,
            channel_name: None,
            slot_number: None,
            core_id: None,
            note: None,
            is_hardcore: false,
        }
    }

    pub fn state(game_id: i64, slot_number: i32) -> Self {
        Self {
            kind: SnapshotKind::State,
            slot_number: Some(slot_number),
            ..Self::save(game_id)
        }
    }

    #[must_use]
    pub fn with_emulator(mut self, emulator_id: impl Into<String>) -> Self {
        self.emulator_id = Some(emulator_id.into());
        self
    }

    /// Blank names mean the default channel
    #[must_use]
    pub fn with_channel(mut self, channel_name: Option<String>) -> Self {
        self.channel_name = normalize_text_option(channel_name);
        self
    }

    #[must_use]
    pub fn with_core(mut self, core_id: impl Into<String>) -> Self {
        self.core_id = Some(core_id.into());
        self
    }

    /// A note locks the entry
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn hardcore(mut self) -> Self {
        self.is_hardcore = true;
        self
    }
}

type CaptureKey = (i64, Option<String>);

/// Hashed copy of a save, ready to move into the cache
struct StagedCapture {
    _staging: Staging,
    artifact: PathBuf,
    file_name: String,
    content_hash: String,
}

#[derive(Clone)]
pub struct SnapshotCache {
    db: DatabaseService,
    env: HandlerEnv,
    clock: Arc<dyn Clock>,
    cache_dir: PathBuf,
    snapshot_cap: usize,
    locks: Arc<std::sync::Mutex<HashMap<CaptureKey, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SnapshotCache {
    pub fn new(
        db: DatabaseService,
        env: HandlerEnv,
        clock: Arc<dyn Clock>,
        cache_dir: impl Into<PathBuf>,
        snapshot_cap: usize,
    ) -> Self {
        Self {
            db,
            env,
            clock,
            cache_dir: cache_dir.into(),
            snapshot_cap: snapshot_cap.max(1),
            locks: Arc::default(),
        }
    }

    /// Absolute location of an entry's cached bytes
    pub fn cached_file(&self, entry: &SnapshotEntry) -> PathBuf {
        self.cache_dir.join(&entry.cache_path)
    }

    fn key_lock(&self, key: CaptureKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    }

    /// Forget the key's lock once no capture holds or waits on it
    fn release_key(&self, key: &CaptureKey) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    /// Capture the save or state at `source`.
    ///
    /// Identical content already cached for the same game and channel yields
    /// [`CaptureOutcome::Duplicate`] and writes nothing.
    pub async fn capture(&self, source: &Path, request: CaptureRequest) -> Result<CaptureOutcome> {
        if request.kind == SnapshotKind::State && request.slot_number.is_none() {
            return Err(Error::InvalidInput("save state captures need a slot number".to_string()));
        }
        if !self.env.fs.exists(source) {
            return Err(Error::NotFound(source.display().to_string()));
        }

        let key = (request.game_id, request.channel_name.clone());
        let lock = self.key_lock(key.clone());
        let outcome = {
            let _guard = lock.lock().await;
            self.capture_locked(source, request).await
        };
        drop(lock);
        self.release_key(&key);
        outcome
    }

    async fn capture_locked(&self, source: &Path, request: CaptureRequest) -> Result<CaptureOutcome> {
        let staged = stage(self.env.clone(), source.to_path_buf()).await?;
        if let Some(existing) = self
            .db
            .find_snapshot_by_hash(
                request.kind,
                request.game_id,
                request.channel_name.as_deref(),
                &staged.content_hash,
            )
            .await?
        {
            tracing::debug!(
                game_id = request.game_id,
                existing_id = existing.id,
                hash = %staged.content_hash,
                "Duplicate snapshot skipped"
            );
            return Ok(CaptureOutcome::Duplicate {
                existing_id: existing.id,
            });
        }

        let captured_at = self.clock.now_millis();
        let relative = PathBuf::from(request.kind.dir_name())
            .join(request.game_id.to_string())
            .join(format!("{captured_at}_{}", uuid::Uuid::now_v7().simple()))
            .join(&staged.file_name);
        let cached = self.cache_dir.join(&relative);
        let size_bytes = store_artifact(staged.artifact.clone(), cached.clone(), request.is_hardcore).await?;

        let mut entry = SnapshotEntry::new(
            request.kind,
            request.game_id,
            staged.content_hash.clone(),
            relative.to_string_lossy().into_owned(),
            captured_at,
        );
        entry.emulator_id = request.emulator_id.clone();
        entry.channel_name = request.channel_name.clone();
        entry.slot_number = request.slot_number;
        entry.size_bytes = size_bytes;
        entry.core_id = request.core_id.clone();
        entry.is_hardcore = request.is_hardcore;
        entry.is_locked = request.note.is_some();
        entry.note = request.note.clone();

        let stored = match (request.kind, request.slot_number) {
            (SnapshotKind::State, Some(slot)) => {
                let replaced = self
                    .db
                    .get_state_slot(
                        request.game_id,
                        request.emulator_id.as_deref(),
                        slot,
                        request.channel_name.as_deref(),
                    )
                    .await?;
                let stored = self.db.upsert_snapshot_slot(&entry).await?;
                if let Some(replaced) = replaced {
                    self.remove_cached_file(&replaced).await;
                }
                stored
            }
            _ => self.db.insert_snapshot(&entry).await?,
        };
        tracing::debug!(
            id = stored.id,
            game_id = stored.game_id,
            size_bytes,
            path = %cached.display(),
            "Snapshot cached"
        );

        let evicted = self.enforce_cap(request.kind, request.game_id).await?;
        Ok(CaptureOutcome::Stored {
            entry: stored,
            evicted: evicted.len(),
        })
    }

    /// Evict down to `snapshot_cap` unlocked entries
    pub async fn enforce_cap(&self, kind: SnapshotKind, game_id: i64) -> Result<Vec<SnapshotEntry>> {
        let unlocked = self.db.count_unlocked_snapshots(kind, game_id).await?;
        if unlocked <= self.snapshot_cap {
            return Ok(Vec::new());
        }
        self.evict(kind, game_id, unlocked - self.snapshot_cap).await
    }

    /// Delete the `count` oldest unlocked entries and their files
    pub async fn evict(&self, kind: SnapshotKind, game_id: i64, count: usize) -> Result<Vec<SnapshotEntry>> {
        let evicted = self.db.evict_oldest_unlocked(kind, game_id, count).await?;
        for entry in &evicted {
            self.remove_cached_file(entry).await;
        }
        if !evicted.is_empty() {
            tracing::info!(game_id, kind = ?kind, count = evicted.len(), "Evicted snapshots");
        }
        Ok(evicted)
    }

    pub async fn list(&self, kind: SnapshotKind, game_id: i64) -> Result<Vec<SnapshotEntry>> {
        self.db.list_snapshots(kind, game_id).await
    }

    pub async fn get(&self, kind: SnapshotKind, id: i64) -> Result<Option<SnapshotEntry>> {
        self.db.get_snapshot(kind, id).await
    }

    async fn require(&self, kind: SnapshotKind, id: i64) -> Result<SnapshotEntry> {
        self.db
            .get_snapshot(kind, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("snapshot {id}")))
    }

    /// Attach a note (locks) or clear it (unlocks)
    pub async fn set_note(&self, kind: SnapshotKind, id: i64, note: Option<String>) -> Result<()> {
        let note = normalize_text_option(note);
        if !self.db.set_snapshot_note(kind, id, note.as_deref()).await? {
            return Err(Error::NotFound(format!("snapshot {id}")));
        }
        Ok(())
    }

    pub async fn set_locked(&self, kind: SnapshotKind, id: i64, locked: bool) -> Result<()> {
        if !self.db.set_snapshot_locked(kind, id, locked).await? {
            return Err(Error::NotFound(format!("snapshot {id}")));
        }
        Ok(())
    }

    /// Move a state onto a named channel and lock it
    pub async fn bind(&self, id: i64, channel_name: &str) -> Result<()> {
        let channel_name = channel_name.trim();
        if channel_name.is_empty() {
            return Err(Error::InvalidInput("channel name cannot be empty".to_string()));
        }
        if !self.db.bind_state_to_channel(id, channel_name).await? {
            return Err(Error::NotFound(format!("snapshot {id}")));
        }
        Ok(())
    }

    /// Return a state to the default channel and unlock it
    pub async fn unbind(&self, id: i64) -> Result<()> {
        if !self.db.unbind_state_from_channel(id).await? {
            return Err(Error::NotFound(format!("snapshot {id}")));
        }
        Ok(())
    }

    /// Write a cached snapshot back to `dest`, replacing what is there
    pub async fn restore(&self, kind: SnapshotKind, id: i64, dest: &Path) -> Result<SnapshotEntry> {
        let entry = self.require(kind, id).await?;
        let cached = self.cached_file(&entry);
        if !cached.exists() {
            return Err(Error::NotFound(cached.display().to_string()));
        }
        let env = self.env.clone();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || restore_blocking(&env, &cached, &dest)).await??;
        tracing::info!(id, game_id = entry.game_id, "Snapshot restored");
        Ok(entry)
    }

    pub async fn delete(&self, kind: SnapshotKind, id: i64) -> Result<bool> {
        let Some(entry) = self.db.get_snapshot(kind, id).await? else {
            return Ok(false);
        };
        let deleted = self.db.delete_snapshot(kind, id).await?;
        if deleted {
            self.remove_cached_file(&entry).await;
        }
        Ok(deleted)
    }

    /// Drop every save and state snapshot for a game
    pub async fn delete_game(&self, game_id: i64) -> Result<usize> {
        let mut removed = 0;
        for kind in [SnapshotKind::Save, SnapshotKind::State] {
            let entries = self.db.delete_snapshots_by_game(kind, game_id).await?;
            for entry in &entries {
                self.remove_cached_file(entry).await;
            }
            removed += entries.len();
        }
        tracing::info!(game_id, removed, "Deleted cached snapshots for game");
        Ok(removed)
    }

    async fn remove_cached_file(&self, entry: &SnapshotEntry) {
        let cached = self.cached_file(entry);
        let cache_dir = self.cache_dir.clone();
        let removal = tokio::task::spawn_blocking(move || {
            if let Err(error) = std::fs::remove_file(&cached) {
                tracing::warn!(path = %cached.display(), %error, "Failed to remove cached snapshot");
            }
            // Capture dirs hold exactly one file
            if let Some(dir) = cached.parent().filter(|dir| dir.starts_with(&cache_dir) && *dir != cache_dir) {
                if let Err(error) = std::fs::remove_dir(dir) {
                    tracing::debug!(path = %dir.display(), %error, "Capture dir left in place");
                }
            }
        })
        .await;
        if let Err(error) = removal {
            tracing::warn!(%error, "Cached snapshot removal task failed");
        }
    }
}

/// Copy a staged artifact into the cache, returning its stored size
async fn store_artifact(artifact: PathBuf, cached: PathBuf, hardcore: bool) -> Result<i64> {
    tokio::task::spawn_blocking(move || -> Result<i64> {
        if let Some(parent) = cached.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&artifact, &cached)?;
        if hardcore {
            archive::append_hardcore_trailer(&cached)?;
        }
        Ok(i64::try_from(std::fs::metadata(&cached)?.len()).unwrap_or(i64::MAX))
    })
    .await?
}

/// Copy and hash the save at `source` off the async runtime
async fn stage(env: HandlerEnv, source: PathBuf) -> Result<StagedCapture> {
    tokio::task::spawn_blocking(move || -> Result<StagedCapture> {
        if env.fs.is_directory(&source) {
            let staging = env.stage_folder(&source)?;
            let name = source
                .file_name()
                .ok_or_else(|| Error::InvalidInput(format!("no folder name: {}", source.display())))?;
            let root = staging.path().join(name);
            let content_hash = archive::hash_folder(&root)?;
            let artifact = staging.path().join(FOLDER_BUNDLE);
            archive::zip_folder(&root, &artifact)?;
            Ok(StagedCapture {
                _staging: staging,
                artifact,
                file_name: FOLDER_BUNDLE.to_string(),
                content_hash,
            })
        } else {
            let staging = Staging::new(env.temp_path("capture", ""))?;
            let file_name = crate::fs::file_name(&source);
            let artifact = staging.path().join(&file_name);
            std::fs::write(&artifact, env.fs.read_bytes(&source)?)?;
            let content_hash = archive::hash_file(&artifact)?;
            Ok(StagedCapture {
                _staging: staging,
                artifact,
                file_name,
                content_hash,
            })
        }
    })
    .await?
}

/// Content hash of an on-device save, the same digest a capture records
pub async fn hash_local_save(env: &HandlerEnv, source: &Path) -> Result<String> {
    if !env.fs.exists(source) {
        return Err(Error::NotFound(source.display().to_string()));
    }
    Ok(stage(env.clone(), source.to_path_buf()).await?.content_hash)
}

fn restore_blocking(env: &HandlerEnv, cached: &Path, dest: &Path) -> Result<()> {
    let staging = Staging::new(env.temp_path("snapshot_restore", ""))?;
    if crate::fs::file_name(cached) == FOLDER_BUNDLE {
        archive::unzip_single_folder(cached, staging.path())?;
        if env.fs.exists(dest) {
            env.fs.delete(dest)?;
        }
        env.install_tree(staging.path(), dest)?;
        return Ok(());
    }

    let copy = staging.path().join("snapshot");
    std::fs::copy(cached, &copy)?;
    archive::strip_hardcore_trailer(&copy)?;
    if let Some(parent) = dest.parent() {
        env.fs.mkdirs(parent)?;
    }
    env.fs.write_bytes(dest, &std::fs::read(&copy)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::handlers::tests::{device, Device};
    use pretty_assertions::assert_eq;

    struct Harness {
        device: Device,
        clock: Arc<FixedClock>,
        cache: SnapshotCache,
    }

    async fn harness(cap: usize) -> Harness {
        let device = device();
        let clock = Arc::new(FixedClock::new(1_000));
        let db = DatabaseService::open_in_memory().await.unwrap();
        let cache = SnapshotCache::new(
            db,
            device.env.clone(),
            clock.clone(),
            device.root.path().join("cache"),
            cap,
        );
        Harness { device, clock, cache }
    }

    fn stored_id(outcome: &CaptureOutcome) -> i64 {
        match outcome {
            CaptureOutcome::Stored { entry, .. } => entry.id,
            CaptureOutcome::Duplicate { .. } => panic!("expected a stored capture"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn identical_bytes_are_cached_once() {
        let h = harness(10).await;
        let save = h.device.ext().join("saves/game.srm");
        h.device.env.fs.write_bytes(&save, &[0xAB; 128]).unwrap();

        let first = h.cache.capture(&save, CaptureRequest::save(42)).await.unwrap();
        h.clock.advance(1_000);
        let second = h.cache.capture(&save, CaptureRequest::save(42)).await.unwrap();

        assert_eq!(
            second,
            CaptureOutcome::Duplicate {
                existing_id: stored_id(&first)
            }
        );
        assert_eq!(h.cache.list(SnapshotKind::Save, 42).await.unwrap().len(), 1);

        // Another channel is its own dedup key
        let third = h
            .cache
            .capture(&save, CaptureRequest::save(42).with_channel(Some("speedrun".into())))
            .await
            .unwrap();
        assert!(matches!(third, CaptureOutcome::Stored { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cap_evicts_oldest_unlocked_only() {
        let h = harness(2).await;
        let save = h.device.ext().join("saves/game.srm");
        let fs = h.device.env.fs.clone();

        fs.write_bytes(&save, b"v0").unwrap();
        let locked = stored_id(
            &h.cache
                .capture(&save, CaptureRequest::save(7).with_note("before boss"))
                .await
                .unwrap(),
        );
        let mut ids = Vec::new();
        for version in 1..=3u8 {
            h.clock.advance(10);
            fs.write_bytes(&save, &[version]).unwrap();
            ids.push(stored_id(&h.cache.capture(&save, CaptureRequest::save(7)).await.unwrap()));
        }

        let remaining: Vec<i64> = h
            .cache
            .list(SnapshotKind::Save, 7)
            .await
            .unwrap()
            .iter()
            .map(|entry| entry.id)
            .collect();
        assert!(remaining.contains(&locked));
        assert!(!remaining.contains(&ids[0]));
        assert_eq!(remaining.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn explicit_evict_leaves_locked_entries() {
        let h = harness(10).await;
        let save = h.device.ext().join("saves/game.srm");
        let fs = h.device.env.fs.clone();
        for version in 0..4u8 {
            h.clock.advance(10);
            fs.write_bytes(&save, &[version]).unwrap();
            h.cache.capture(&save, CaptureRequest::save(9)).await.unwrap();
        }
        let entries = h.cache.list(SnapshotKind::Save, 9).await.unwrap();
        let oldest = entries.last().unwrap().id;
        h.cache.set_locked(SnapshotKind::Save, oldest, true).await.unwrap();

        let evicted = h.cache.evict(SnapshotKind::Save, 9, 10).await.unwrap();
        assert_eq!(evicted.len(), 3);
        let left = h.cache.list(SnapshotKind::Save, 9).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, oldest);
        assert!(h.cache.cached_file(&left[0]).exists());
        assert!(!h.cache.cached_file(&evicted[0]).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn folder_capture_restores_tree() {
        let h = harness(10).await;
        let fs = h.device.env.fs.clone();
        let folder = h.device.ext().join("switch/0100ABCD00000000");
        fs.write_bytes(&folder.join("main"), b"m").unwrap();
        fs.write_bytes(&folder.join("sub/extra"), b"e").unwrap();

        let id = stored_id(&h.cache.capture(&folder, CaptureRequest::save(5)).await.unwrap());
        fs.write_bytes(&folder.join("main"), b"changed").unwrap();
        fs.write_bytes(&folder.join("junk"), b"j").unwrap();

        h.cache.restore(SnapshotKind::Save, id, &folder).await.unwrap();
        assert_eq!(fs.read_bytes(&folder.join("main")).unwrap(), b"m");
        assert_eq!(fs.read_bytes(&folder.join("sub/extra")).unwrap(), b"e");
        assert!(!fs.exists(&folder.join("junk")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn hardcore_trailer_is_stripped_on_restore() {
        let h = harness(10).await;
        let fs = h.device.env.fs.clone();
        let save = h.device.ext().join("saves/hc.srm");
        fs.write_bytes(&save, b"hardcore save").unwrap();

        let outcome = h
            .cache
            .capture(&save, CaptureRequest::save(8).hardcore())
            .await
            .unwrap();
        let CaptureOutcome::Stored { entry, .. } = outcome else {
            panic!("expected stored");
        };
        assert!(entry.is_hardcore);
        assert!(archive::has_hardcore_trailer(
            &std::fs::read(h.cache.cached_file(&entry)).unwrap()
        ));

        let dest = h.device.ext().join("restored/hc.srm");
        h.cache.restore(SnapshotKind::Save, entry.id, &dest).await.unwrap();
        assert_eq!(fs.read_bytes(&dest).unwrap(), b"hardcore save");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn state_slots_replace_and_bind() {
        let h = harness(10).await;
        let fs = h.device.env.fs.clone();
        let state = h.device.ext().join("states/game.state1");

        fs.write_bytes(&state, b"one").unwrap();
        let first = h
            .cache
            .capture(&state, CaptureRequest::state(3, 1).with_emulator("retroarch"))
            .await
            .unwrap();
        let CaptureOutcome::Stored { entry: first, .. } = first else {
            panic!("expected stored");
        };
        h.clock.advance(5);
        fs.write_bytes(&state, b"two").unwrap();
        let second = stored_id(
            &h.cache
                .capture(&state, CaptureRequest::state(3, 1).with_emulator("retroarch"))
                .await
                .unwrap(),
        );

        let states = h.cache.list(SnapshotKind::State, 3).await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].id, second);
        assert!(!h.cache.cached_file(&first).exists());

        h.cache.bind(second, "any%").await.unwrap();
        let bound = h.cache.get(SnapshotKind::State, second).await.unwrap().unwrap();
        assert_eq!(bound.channel_name.as_deref(), Some("any%"));
        assert!(bound.is_locked);

        h.cache.unbind(second).await.unwrap();
        let unbound = h.cache.get(SnapshotKind::State, second).await.unwrap().unwrap();
        assert_eq!(unbound.channel_name, None);
        assert!(!unbound.is_locked);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_captures_release_their_key_locks() {
        let h = harness(10).await;
        let fs = h.device.env.fs.clone();
        let first = h.device.ext().join("saves/first.srm");
        let second = h.device.ext().join("saves/second.srm");
        fs.write_bytes(&first, b"first").unwrap();
        fs.write_bytes(&second, b"second").unwrap();

        let (a, b, c) = tokio::join!(
            h.cache.capture(&first, CaptureRequest::save(5)),
            h.cache.capture(&first, CaptureRequest::save(5)),
            h.cache.capture(&second, CaptureRequest::save(6)),
        );
        let stored = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|outcome| matches!(outcome, CaptureOutcome::Stored { .. }))
            .count();
        assert_eq!(stored, 1);
        assert!(matches!(c.unwrap(), CaptureOutcome::Stored { .. }));
        assert!(h.cache.locks.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bind_into_occupied_slot_is_rejected() {
        let h = harness(10).await;
        let fs = h.device.env.fs.clone();
        let state = h.device.ext().join("states/game.state2");
        let request = || CaptureRequest::state(3, 2).with_emulator("retroarch");

        fs.write_bytes(&state, b"bound").unwrap();
        let bound = stored_id(&h.cache.capture(&state, request()).await.unwrap());
        h.cache.bind(bound, "any%").await.unwrap();
        h.clock.advance(5);
        fs.write_bytes(&state, b"default").unwrap();
        let default = stored_id(&h.cache.capture(&state, request()).await.unwrap());

        let error = h.cache.bind(default, "any%").await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
        let error = h.cache.unbind(bound).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
        assert_eq!(h.cache.list(SnapshotKind::State, 3).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_source_and_slotless_state_are_rejected() {
        let h = harness(10).await;
        let missing = h.device.ext().join("nothing.srm");
        let error = h.cache.capture(&missing, CaptureRequest::save(1)).await.unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));

        let mut request = CaptureRequest::state(1, 0);
        request.slot_number = None;
        let error = h.cache.capture(&missing, request).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_game_removes_rows_and_files() {
        let h = harness(10).await;
        let fs = h.device.env.fs.clone();
        let save = h.device.ext().join("saves/a.srm");
        fs.write_bytes(&save, b"a").unwrap();
        let outcome = h.cache.capture(&save, CaptureRequest::save(11)).await.unwrap();
        let CaptureOutcome::Stored { entry, .. } = outcome else {
            panic!("expected stored");
        };

        assert_eq!(h.cache.delete_game(11).await.unwrap(), 1);
        assert!(!h.cache.cached_file(&entry).exists());
        assert!(h.cache.list(SnapshotKind::Save, 11).await.unwrap().is_empty());
    }
}
