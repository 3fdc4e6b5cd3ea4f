//! Queue processor that moves saves between the device and the remote

use std::path::{Path, PathBuf};

use crate::cache::{CaptureRequest, SnapshotCache};
use crate::conflict::{ConflictResolver, Lineage, LocalState};
use crate::error::{Error, Result};
use crate::handlers::{HandlerEnv, PlatformHandler, SaveHandler};
use crate::models::{
    CaptureOutcome, SaveContext, SaveFilePayload, SaveStatePayload, SyncDirection, SyncQueueEntry,
    SyncStatus, SyncType,
};
use crate::remote::{RemoteSaves, UploadRequest};

use super::SyncProcessor;

/// Wires handlers, the remote, the snapshot cache and the conflict resolver
pub struct SaveSyncProcessor<R> {
    env: HandlerEnv,
    remote: R,
    cache: SnapshotCache,
    resolver: ConflictResolver,
}

impl<R: RemoteSaves> SaveSyncProcessor<R> {
    pub const fn new(env: HandlerEnv, remote: R, cache: SnapshotCache, resolver: ConflictResolver) -> Self {
        Self {
            env,
            remote,
            cache,
            resolver,
        }
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    async fn process_save_file(&self, game_id: i64, payload: &SaveFilePayload) -> Result<()> {
        let context = save_context(game_id, payload);
        let handler = PlatformHandler::for_platform(&payload.platform_slug, self.env.clone());
        let lineage = Lineage::new(game_id, &payload.emulator_id, payload.channel_name.as_deref());

        let result = self.sync_save_file(&handler, &context, lineage, payload).await;
        if let Err(error) = &result {
            if let Err(record_error) = self.resolver.record_error(lineage, &error.to_string()).await {
                tracing::warn!(game_id, error = %record_error, "Failed to record sync error");
            }
        }
        result
    }

    async fn sync_save_file(
        &self,
        handler: &PlatformHandler,
        context: &SaveContext,
        lineage: Lineage<'_>,
        payload: &SaveFilePayload,
    ) -> Result<()> {
        let local_path = match &context.local_save_path {
            Some(path) if self.env.fs.exists(path) => Some(path.clone()),
            _ => handler.discover(context).await,
        };
        let local = match &local_path {
            Some(path) => self.resolver.observe_local(path).await?,
            None => None,
        };
        if let Some(save_id) = payload
            .server_save_id
            .as_deref()
            .filter(|_| payload.direction == SyncDirection::Download)
        {
            // Explicit download of a known remote save
            return self.download(handler, context, lineage, local.as_ref(), save_id).await;
        }
        let remote = self
            .remote
            .latest(lineage.game_id, lineage.emulator_id, lineage.channel_name)
            .await?;

        let record = self
            .resolver
            .evaluate(lineage, local.as_ref(), remote.as_ref())
            .await?;
        if payload.resolution.is_some() && record.sync_status != SyncStatus::Conflict {
            return Err(Error::InvalidInput(format!(
                "game {} has a conflict resolution but its status is {}",
                lineage.game_id, record.sync_status
            )));
        }
        let direction = match record.sync_status {
            SyncStatus::InSync => {
                tracing::debug!(game_id = lineage.game_id, "Save already in sync");
                return Ok(());
            }
            SyncStatus::LocalNewer => SyncDirection::Upload,
            SyncStatus::ServerNewer => SyncDirection::Download,
            SyncStatus::Conflict => {
                let Some(resolution) = payload.resolution else {
                    return Err(Error::Conflict(format!(
                        "game {} changed locally and remotely",
                        lineage.game_id
                    )));
                };
                match self.resolver.resolve(lineage, resolution).await? {
                    Some(direction) => direction,
                    None => return Ok(()),
                }
            }
        };
        if direction != payload.direction {
            // The classified status decides, the request only triggered the sync
            tracing::info!(
                game_id = lineage.game_id,
                requested = ?payload.direction,
                status = %record.sync_status,
                "Syncing in the direction of the current status"
            );
        }

        match direction {
            SyncDirection::Upload => {
                let (Some(path), Some(local)) = (local_path, local) else {
                    return Err(Error::NotFound(format!("no local save for game {}", lineage.game_id)));
                };
                self.upload(handler, context, lineage, &path, &local).await
            }
            SyncDirection::Download => {
                let Some(remote) = remote else {
                    return Err(Error::NotFound(format!("no remote save for game {}", lineage.game_id)));
                };
                self.download(handler, context, lineage, local.as_ref(), &remote.save_id)
                    .await
            }
        }
    }

    /// Keep a local snapshot of what is about to be replaced or sent
    async fn snapshot(&self, path: &Path, lineage: Lineage<'_>) -> Result<()> {
        let request = CaptureRequest::save(lineage.game_id)
            .with_emulator(lineage.emulator_id)
            .with_channel(lineage.channel_name.map(str::to_string));
        if let CaptureOutcome::Stored { entry, evicted } = self.cache.capture(path, request).await? {
            tracing::debug!(id = entry.id, evicted, "Captured save before transfer");
        }
        Ok(())
    }

    async fn upload(
        &self,
        handler: &PlatformHandler,
        context: &SaveContext,
        lineage: Lineage<'_>,
        path: &Path,
        local: &LocalState,
    ) -> Result<()> {
        self.snapshot(path, lineage).await?;
        let prepared = handler
            .prepare_for_upload(path, context)
            .await
            .ok_or_else(|| Error::NotFound(format!("nothing to upload at {}", path.display())))?;

        let uploaded = self
            .remote
            .upload(
                &prepared.file,
                UploadRequest {
                    game_id: lineage.game_id,
                    emulator_id: lineage.emulator_id,
                    channel_name: lineage.channel_name,
                    slot_number: None,
                    content_hash: local.content_hash.as_deref(),
                },
            )
            .await;
        if prepared.is_temporary {
            remove_temp(prepared.file).await;
        }
        let uploaded = uploaded?;
        self.resolver
            .mark_synced(lineage, local, &uploaded, "uploaded local save")
            .await?;
        Ok(())
    }

    async fn download(
        &self,
        handler: &PlatformHandler,
        context: &SaveContext,
        lineage: Lineage<'_>,
        local: Option<&LocalState>,
        save_id: &str,
    ) -> Result<()> {
        if let Some(local) = local {
            self.snapshot(&local.path, lineage).await?;
        }
        let mut context = context.clone();
        if context.local_save_path.is_none() {
            context.local_save_path = local.map(|local| local.path.clone());
        }

        let temp = self.env.temp_path("download", "bin");
        let downloaded = match self.remote.download(save_id, &temp).await {
            Ok(info) => Ok((info, handler.extract_download(&temp, &context).await)),
            Err(error) => Err(error),
        };
        remove_temp(temp).await;
        let (info, extracted) = downloaded?;
        if !extracted.success {
            return Err(Error::PathResolution(
                extracted.error.unwrap_or_else(|| "extraction failed".to_string()),
            ));
        }
        let target = extracted
            .target_path
            .ok_or_else(|| Error::PathResolution("extraction reported no target".to_string()))?;

        let local = self
            .resolver
            .observe_local(&target)
            .await?
            .ok_or_else(|| Error::NotFound(target.display().to_string()))?;
        self.resolver
            .mark_synced(lineage, &local, &info, "downloaded remote save")
            .await?;
        Ok(())
    }

    async fn process_save_state(&self, game_id: i64, payload: &SaveStatePayload) -> Result<()> {
        let path = PathBuf::from(&payload.local_path);
        match payload.direction {
            SyncDirection::Upload => {
                if !self.env.fs.exists(&path) {
                    return Err(Error::NotFound(payload.local_path.clone()));
                }
                let mut request = CaptureRequest::state(game_id, payload.slot_number)
                    .with_emulator(payload.emulator_id.as_str())
                    .with_channel(payload.channel_name.clone());
                if let Some(core) = &payload.core_id {
                    request = request.with_core(core.as_str());
                }
                let content_hash = match self.cache.capture(&path, request).await? {
                    CaptureOutcome::Stored { entry, .. } => entry.content_hash,
                    CaptureOutcome::Duplicate { existing_id } => self
                        .cache
                        .get(crate::models::SnapshotKind::State, existing_id)
                        .await?
                        .map(|entry| entry.content_hash)
                        .unwrap_or_default(),
                };
                let uploaded = self
                    .remote
                    .upload(
                        &path,
                        UploadRequest {
                            game_id,
                            emulator_id: &payload.emulator_id,
                            channel_name: payload.channel_name.as_deref(),
                            slot_number: Some(payload.slot_number),
                            content_hash: Some(content_hash.as_str()).filter(|hash| !hash.is_empty()),
                        },
                    )
                    .await?;
                tracing::info!(game_id, slot = payload.slot_number, save_id = %uploaded.save_id, "Uploaded save state");
                Ok(())
            }
            SyncDirection::Download => {
                let save_id = payload.server_save_id.as_deref().ok_or_else(|| {
                    Error::NotFound(format!("no remote state for game {game_id} slot {}", payload.slot_number))
                })?;
                let temp = self.env.temp_path("state", "bin");
                let downloaded = self.remote.download(save_id, &temp).await;
                let written = match downloaded {
                    Ok(_) => {
                        let fs = self.env.fs.clone();
                        let (source, dest) = (temp.clone(), path.clone());
                        tokio::task::spawn_blocking(move || -> Result<()> {
                            let bytes = fs.read_bytes(&source)?;
                            fs.write_bytes(&dest, &bytes)?;
                            Ok(())
                        })
                        .await
                        .map_err(Error::from)
                        .and_then(|written| written)
                    }
                    Err(error) => Err(error),
                };
                remove_temp(temp).await;
                written?;
                let mut request = CaptureRequest::state(game_id, payload.slot_number)
                    .with_emulator(payload.emulator_id.as_str())
                    .with_channel(payload.channel_name.clone());
                if let Some(core) = &payload.core_id {
                    request = request.with_core(core.as_str());
                }
                self.cache.capture(&path, request).await?;
                Ok(())
            }
        }
    }
}

/// Delete a transfer temp file off the runtime, logging failures
async fn remove_temp(path: PathBuf) {
    let result = tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err((path, error)),
    })
    .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err((path, error))) => {
            tracing::warn!(path = %path.display(), %error, "Failed to remove temp file");
        }
        Err(error) => tracing::warn!(%error, "Temp file cleanup task failed"),
    }
}

fn save_context(game_id: i64, payload: &SaveFilePayload) -> SaveContext {
    SaveContext {
        game_id,
        game_title: payload.game_title.clone().unwrap_or_default(),
        platform_slug: payload.platform_slug.clone(),
        emulator_id: payload.emulator_id.clone(),
        emulator_package: payload.emulator_package.clone(),
        rom_path: payload.rom_path.as_ref().map(PathBuf::from),
        title_id: payload.title_id.clone(),
        local_save_path: payload.local_save_path.as_ref().map(PathBuf::from),
    }
}

impl<R: RemoteSaves> SyncProcessor for SaveSyncProcessor<R> {
    async fn process(&self, entry: &SyncQueueEntry) -> Result<()> {
        match entry.sync_type {
            SyncType::SaveFile => {
                let payload: SaveFilePayload = serde_json::from_str(&entry.payload_json)?;
                self.process_save_file(entry.game_id, &payload).await
            }
            SyncType::SaveState => {
                let payload: SaveStatePayload = serde_json::from_str(&entry.payload_json)?;
                self.process_save_state(entry.game_id, &payload).await
            }
        }
    }
}
