//! Per-game sync status model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Relationship between the local save and the last known remote copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    LocalNewer,
    ServerNewer,
    InSync,
    Conflict,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalNewer => "LOCAL_NEWER",
            Self::ServerNewer => "SERVER_NEWER",
            Self::InSync => "IN_SYNC",
            Self::Conflict => "CONFLICT",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCAL_NEWER" => Ok(Self::LocalNewer),
            "SERVER_NEWER" => Ok(Self::ServerNewer),
            "IN_SYNC" => Ok(Self::InSync),
            "CONFLICT" => Ok(Self::Conflict),
            other => Err(Error::InvalidInput(format!("unknown sync status: {other}"))),
        }
    }
}

/// Caller decision for a [`SyncStatus::Conflict`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictResolution {
    KeepLocal,
    KeepServer,
    Skip,
}

/// Sync bookkeeping for one `(game, emulator, channel)` save lineage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusRecord {
    pub game_id: i64,
    pub emulator_id: String,
    pub channel_name: Option<String>,
    pub local_save_path: Option<String>,
    /// Local modification time at last sync (Unix ms)
    pub local_updated_at: Option<i64>,
    pub sync_status: SyncStatus,
    pub last_sync_error: Option<String>,
    pub server_save_id: Option<String>,
    /// Remote timestamp at last sync (Unix ms)
    pub server_updated_at: Option<i64>,
    /// Content hash both sides agreed on at last sync
    pub last_synced_hash: Option<String>,
    pub last_synced_at: Option<i64>,
}

impl SyncStatusRecord {
    pub fn new(game_id: i64, emulator_id: impl Into<String>, channel_name: Option<String>) -> Self {
        Self {
            game_id,
            emulator_id: emulator_id.into(),
            channel_name,
            local_save_path: None,
            local_updated_at: None,
            sync_status: SyncStatus::InSync,
            last_sync_error: None,
            server_save_id: None,
            server_updated_at: None,
            last_synced_hash: None,
            last_synced_at: None,
        }
    }
}

/// One recorded status transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusChange {
    pub id: i64,
    pub game_id: i64,
    pub emulator_id: String,
    pub channel_name: Option<String>,
    /// `None` when the record did not exist before
    pub old_status: Option<SyncStatus>,
    pub new_status: SyncStatus,
    pub reason: String,
    /// Unix ms
    pub changed_at: i64,
}
