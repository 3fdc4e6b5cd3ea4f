//! Pending sync queue models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ConflictResolution;
use crate::error::Error;

/// Kind of work a queue entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncType {
    SaveFile,
    SaveState,
}

impl SyncType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SaveFile => "SAVE_FILE",
            Self::SaveState => "SAVE_STATE",
        }
    }

    /// Default priority tier for this type
    pub const fn default_priority(self) -> SyncPriority {
        match self {
            Self::SaveFile => SyncPriority::SAVE_FILE,
            Self::SaveState => SyncPriority::SAVE_STATE,
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SAVE_FILE" => Ok(Self::SaveFile),
            "SAVE_STATE" => Ok(Self::SaveState),
            other => Err(Error::InvalidInput(format!("unknown sync type: {other}"))),
        }
    }
}

/// Queue entry lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl QueueStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("unknown queue status: {other}"))),
        }
    }
}

/// Priority value; lower values drain first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncPriority(pub i32);

impl SyncPriority {
    pub const SAVE_FILE: Self = Self(1);
    pub const SAVE_STATE: Self = Self(2);
}

/// Transfer direction carried in queue payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncDirection {
    #[default]
    Upload,
    Download,
}

/// A unit of durable, retryable sync work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub id: i64,
    pub game_id: i64,
    pub sync_type: SyncType,
    pub status: QueueStatus,
    pub priority: SyncPriority,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    /// Type-specific JSON payload
    pub payload_json: String,
    /// Unix ms
    pub created_at: i64,
    /// Unix ms
    pub updated_at: i64,
}

impl SyncQueueEntry {
    /// Whether `retry_if_eligible` would accept this entry
    pub const fn can_retry(&self) -> bool {
        matches!(self.status, QueueStatus::Failed) && self.retry_count < self.max_retries
    }

    /// Whether exhausted-retry cleanup would remove this entry
    pub const fn is_exhausted(&self) -> bool {
        matches!(self.status, QueueStatus::Failed) && self.retry_count >= self.max_retries
    }
}

/// Payload for [`SyncType::SaveFile`] entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveFilePayload {
    pub emulator_id: String,
    pub platform_slug: String,
    pub channel_name: Option<String>,
    pub direction: SyncDirection,
    pub rom_path: Option<String>,
    pub title_id: Option<String>,
    pub emulator_package: Option<String>,
    pub game_title: Option<String>,
    /// Path remembered from an earlier sync
    pub local_save_path: Option<String>,
    /// Remote save to download (download direction)
    pub server_save_id: Option<String>,
    /// Caller's decision when the lineage is in conflict
    pub resolution: Option<ConflictResolution>,
}

/// Payload for [`SyncType::SaveState`] entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveStatePayload {
    pub emulator_id: String,
    pub slot_number: i32,
    pub channel_name: Option<String>,
    pub direction: SyncDirection,
    pub local_path: String,
    pub core_id: Option<String>,
    pub server_save_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sync_type_parses_storage_names() {
        assert_eq!("SAVE_FILE".parse::<SyncType>().unwrap(), SyncType::SaveFile);
        assert_eq!(SyncType::SaveState.to_string(), "SAVE_STATE");
        assert!("RATING".parse::<SyncType>().is_err());
    }

    #[test]
    fn save_files_outrank_states() {
        assert!(SyncType::SaveFile.default_priority() < SyncType::SaveState.default_priority());
    }

    #[test]
    fn payload_tolerates_missing_fields() {
        let payload: SaveFilePayload =
            serde_json::from_str(r#"{"emulator_id":"dolphin","platform_slug":"ngc"}"#).unwrap();
        assert_eq!(payload.direction, SyncDirection::Upload);
        assert_eq!(payload.channel_name, None);
    }

    #[test]
    fn retry_predicates_are_complementary() {
        let mut entry = SyncQueueEntry {
            id: 1,
            game_id: 42,
            sync_type: SyncType::SaveFile,
            status: QueueStatus::Failed,
            priority: SyncPriority::SAVE_FILE,
            retry_count: 2,
            max_retries: 3,
            last_error: None,
            payload_json: "{}".to_string(),
            created_at: 0,
            updated_at: 0,
        };
        assert!(entry.can_retry());
        assert!(!entry.is_exhausted());

        entry.retry_count = 3;
        assert!(!entry.can_retry());
        assert!(entry.is_exhausted());
    }
}
