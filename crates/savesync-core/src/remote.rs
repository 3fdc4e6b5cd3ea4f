//! Remote save repository collaborator
//!
//! The engine only needs three calls from the server: look up the newest save
//! for a lineage, upload a file, and download one by id. [`DirectoryRemote`]
//! implements them over a plain directory so the engine can run end to end
//! without a server (shared folders, tests).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{Error, Result};

/// Server-side metadata for one uploaded save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSaveInfo {
    /// Opaque server identifier
    pub save_id: String,
    pub game_id: i64,
    pub emulator_id: String,
    pub channel_name: Option<String>,
    /// State slot, `None` for save files
    pub slot_number: Option<i32>,
    pub file_name: String,
    /// Unix ms
    pub updated_at: i64,
    pub content_hash: Option<String>,
    pub size_bytes: u64,
}

/// Identity attached to an upload
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub game_id: i64,
    pub emulator_id: &'a str,
    pub channel_name: Option<&'a str>,
    pub slot_number: Option<i32>,
    pub content_hash: Option<&'a str>,
}

/// Upload, download and lookup against the save server
#[allow(async_fn_in_trait)]
pub trait RemoteSaves {
    /// Newest save file (not state) for a lineage
    async fn latest(
        &self,
        game_id: i64,
        emulator_id: &str,
        channel_name: Option<&str>,
    ) -> Result<Option<RemoteSaveInfo>>;

    async fn upload(&self, file: &Path, request: UploadRequest<'_>) -> Result<RemoteSaveInfo>;

    /// Write the save's bytes to `dest`
    async fn download(&self, save_id: &str, dest: &Path) -> Result<RemoteSaveInfo>;
}

/// Remote backed by a local directory of `{id}.bin` + `{id}.json` pairs
#[derive(Clone)]
pub struct DirectoryRemote {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl DirectoryRemote {
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
        }
    }

    fn data_path(&self, save_id: &str) -> PathBuf {
        self.root.join(format!("{save_id}.bin"))
    }

    fn meta_path(&self, save_id: &str) -> PathBuf {
        self.root.join(format!("{save_id}.json"))
    }

    async fn read_meta(&self, save_id: &str) -> Result<Option<RemoteSaveInfo>> {
        match tokio::fs::read_to_string(self.meta_path(save_id)).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn all(&self) -> Result<Vec<RemoteSaveInfo>> {
        let mut saves = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(saves),
            Err(error) => return Err(error.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Some(info) = self.read_meta(id).await? {
                saves.push(info);
            }
        }
        Ok(saves)
    }
}

impl RemoteSaves for DirectoryRemote {
    async fn latest(
        &self,
        game_id: i64,
        emulator_id: &str,
        channel_name: Option<&str>,
    ) -> Result<Option<RemoteSaveInfo>> {
        let latest = self
            .all()
            .await?
            .into_iter()
            .filter(|save| {
                save.game_id == game_id
                    && save.emulator_id == emulator_id
                    && save.channel_name.as_deref() == channel_name
                    && save.slot_number.is_none()
            })
            .max_by_key(|save| save.updated_at);
        Ok(latest)
    }

    async fn upload(&self, file: &Path, request: UploadRequest<'_>) -> Result<RemoteSaveInfo> {
        tokio::fs::create_dir_all(&self.root).await?;
        let save_id = uuid::Uuid::now_v7().simple().to_string();
        let size_bytes = tokio::fs::copy(file, self.data_path(&save_id)).await?;
        let info = RemoteSaveInfo {
            save_id: save_id.clone(),
            game_id: request.game_id,
            emulator_id: request.emulator_id.to_string(),
            channel_name: request.channel_name.map(str::to_string),
            slot_number: request.slot_number,
            file_name: file
                .file_name()
                .map_or_else(|| "save.bin".to_string(), |name| name.to_string_lossy().into_owned()),
            updated_at: self.clock.now_millis(),
            content_hash: request.content_hash.map(str::to_string),
            size_bytes,
        };
        tokio::fs::write(self.meta_path(&save_id), serde_json::to_vec_pretty(&info)?).await?;
        tracing::info!(save_id, game_id = info.game_id, size_bytes, "Uploaded save");
        Ok(info)
    }

    async fn download(&self, save_id: &str, dest: &Path) -> Result<RemoteSaveInfo> {
        let Some(info) = self.read_meta(save_id).await? else {
            return Err(Error::NotFound(format!("remote save {save_id}")));
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(self.data_path(save_id), dest).await?;
        tracing::debug!(save_id, dest = %dest.display(), "Downloaded save");
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn latest_picks_newest_in_lineage() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(1_000));
        let remote = DirectoryRemote::new(tmp.path().join("remote"), clock.clone());
        let file = tmp.path().join("game.srm");
        std::fs::write(&file, b"v1").unwrap();

        let request = UploadRequest {
            game_id: 1,
            emulator_id: "retroarch",
            channel_name: None,
            slot_number: None,
            content_hash: Some("h1"),
        };
        remote.upload(&file, request).await.unwrap();
        clock.advance(10);
        let second = remote.upload(&file, request).await.unwrap();
        remote
            .upload(&file, UploadRequest { channel_name: Some("alt"), ..request })
            .await
            .unwrap();

        let latest = remote.latest(1, "retroarch", None).await.unwrap().unwrap();
        assert_eq!(latest.save_id, second.save_id);
        assert_eq!(latest.updated_at, 1_010);
        assert_eq!(remote.latest(2, "retroarch", None).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn download_writes_bytes_and_rejects_unknown_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = DirectoryRemote::new(tmp.path().join("remote"), Arc::new(FixedClock::new(5)));
        let file = tmp.path().join("a.sav");
        std::fs::write(&file, b"bytes").unwrap();
        let info = remote
            .upload(
                &file,
                UploadRequest {
                    game_id: 3,
                    emulator_id: "melonds",
                    channel_name: None,
                    slot_number: None,
                    content_hash: None,
                },
            )
            .await
            .unwrap();

        let dest = tmp.path().join("out/a.sav");
        remote.download(&info.save_id, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"bytes");

        let error = remote.download("missing", &dest).await.unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }
}
