//! Snapshot cache models

use serde::{Deserialize, Serialize};

/// Which cache table a snapshot lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Unslotted save-file capture
    Save,
    /// Slotted save-state capture
    State,
}

impl SnapshotKind {
    pub(crate) const fn table(self) -> &'static str {
        match self {
            Self::Save => "save_cache",
            Self::State => "state_cache",
        }
    }

    /// Directory name used under the cache root
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Save => "saves",
            Self::State => "states",
        }
    }
}

/// One cached save or state capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Row identifier
    pub id: i64,
    /// Save or state
    pub kind: SnapshotKind,
    /// Owning game
    pub game_id: i64,
    /// Emulator that produced the capture
    pub emulator_id: Option<String>,
    /// Channel lineage; `None` is the default channel
    pub channel_name: Option<String>,
    /// Save-state slot (states only)
    pub slot_number: Option<i32>,
    /// Content digest (hex)
    pub content_hash: String,
    /// Capture timestamp (Unix ms)
    pub captured_at: i64,
    /// Size of the cached artifact
    pub size_bytes: i64,
    /// Locked entries are never evicted
    pub is_locked: bool,
    /// Optional user note
    pub note: Option<String>,
    /// Where the cached bytes live
    pub cache_path: String,
    /// Libretro core that produced a state
    pub core_id: Option<String>,
    /// Captured under hardcore achievement rules
    pub is_hardcore: bool,
}

impl SnapshotEntry {
    /// Build an unsaved entry; `id` is assigned on insert.
    pub fn new(
        kind: SnapshotKind,
        game_id: i64,
        content_hash: impl Into<String>,
        cache_path: impl Into<String>,
        captured_at: i64,
    ) -> Self {
        Self {
            id: 0,
            kind,
            game_id,
            emulator_id: None,
            channel_name: None,
            slot_number: None,
            content_hash: content_hash.into(),
            captured_at,
            size_bytes: 0,
            is_locked: false,
            note: None,
            cache_path: cache_path.into(),
            core_id: None,
            is_hardcore: false,
        }
    }
}

/// Result of a capture attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaptureOutcome {
    /// A new entry was written
    Stored {
        entry: SnapshotEntry,
        evicted: usize,
    },
    /// Identical content already cached for this game and channel
    Duplicate { existing_id: i64 },
}
